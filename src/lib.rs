pub mod cli;
pub mod core;
pub mod providers;
pub mod service;

use crate::core::config::AppConfig;
use crate::core::currency::{ConversionApi, Priority};
use crate::core::settings::{SettingsApi, SettingsUpdate};
use crate::providers::RestApiClient;
use crate::service::{BatchItem, CurrencyConversionService};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Convert {
        amount: f64,
        from: String,
        to: Option<String>,
        priority: Priority,
    },
    Batch(Vec<BatchItem>),
    Rates {
        base: Option<String>,
        targets: Vec<String>,
    },
    Currencies,
    SettingsShow,
    SettingsSet(SettingsUpdate),
    Stats {
        pairs: Vec<(String, String)>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("subtrack-fx starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let client = Arc::new(RestApiClient::from_config(&config.api)?);
    let api: Arc<dyn ConversionApi> = Arc::clone(&client) as Arc<dyn ConversionApi>;
    let settings_api: Arc<dyn SettingsApi> = client;
    let service = CurrencyConversionService::new(api, settings_api, &config.conversion);

    if let Err(e) = service.load_settings().await {
        warn!(error = %e, "Could not load currency settings, using defaults");
    }

    let result = match command {
        AppCommand::Convert {
            amount,
            from,
            to,
            priority,
        } => cli::convert::convert(&service, amount, &from, to.as_deref(), priority).await,
        AppCommand::Batch(items) => cli::convert::batch(&service, &items).await,
        AppCommand::Rates { base, targets } => {
            cli::convert::rates(&service, base.as_deref(), &targets).await
        }
        AppCommand::Currencies => cli::convert::currencies(&service).await,
        AppCommand::SettingsShow => {
            cli::settings::show(&service.settings());
            Ok(())
        }
        AppCommand::SettingsSet(update) => cli::settings::set(&service, update).await,
        AppCommand::Stats { pairs } => cli::stats::run(&service, &pairs).await,
    };

    service.dispose().await;
    result
}
