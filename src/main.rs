use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use subtrack_fx::cli::convert::{parse_batch_item, parse_pair};
use subtrack_fx::core::currency::Priority;
use subtrack_fx::core::log::init_logging;
use subtrack_fx::core::settings::SettingsUpdate;
use subtrack_fx::service::BatchItem;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Convert a single amount
    Convert {
        amount: f64,
        /// Source currency code
        from: String,
        /// Target currency code (defaults to the preferred display currency)
        #[arg(short, long)]
        to: Option<String>,
        /// Request priority: high, normal or low
        #[arg(short, long, default_value = "normal")]
        priority: Priority,
    },
    /// Convert several AMOUNT:CURRENCY items into the display currency
    Batch {
        #[arg(required = true, value_parser = parse_batch_item)]
        items: Vec<BatchItem>,
    },
    /// Show exchange rates from a base currency
    Rates {
        /// Base currency (defaults to the preferred display currency)
        #[arg(short, long)]
        base: Option<String>,
        /// Target currency codes
        targets: Vec<String>,
    },
    /// List supported currencies
    Currencies,
    /// Show or change currency preferences
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Show cache statistics, optionally preloading FROM:TO pairs first
    Stats {
        #[arg(value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Display current preferences
    Show,
    /// Update one or more preferences
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        auto_convert: Option<bool>,
        /// Preferred display currency
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        show_original: Option<bool>,
        #[arg(long)]
        show_rates: Option<bool>,
        /// Refresh interval in minutes (15-1440)
        #[arg(long)]
        refresh_interval: Option<u32>,
    },
}

impl From<Commands> for subtrack_fx::AppCommand {
    fn from(cmd: Commands) -> subtrack_fx::AppCommand {
        use subtrack_fx::AppCommand;
        match cmd {
            Commands::Convert {
                amount,
                from,
                to,
                priority,
            } => AppCommand::Convert {
                amount,
                from,
                to,
                priority,
            },
            Commands::Batch { items } => AppCommand::Batch(items),
            Commands::Rates { base, targets } => AppCommand::Rates { base, targets },
            Commands::Currencies => AppCommand::Currencies,
            Commands::Settings { action: None }
            | Commands::Settings {
                action: Some(SettingsAction::Show),
            } => AppCommand::SettingsShow,
            Commands::Settings {
                action:
                    Some(SettingsAction::Set {
                        enabled,
                        auto_convert,
                        currency,
                        show_original,
                        show_rates,
                        refresh_interval,
                    }),
            } => AppCommand::SettingsSet(SettingsUpdate {
                enable_currency_conversion: enabled,
                auto_convert_currencies: auto_convert,
                preferred_display_currency: currency.map(|c| c.to_uppercase()),
                show_original_currency: show_original,
                show_conversion_rates: show_rates,
                currency_refresh_interval: refresh_interval,
            }),
            Commands::Stats { pairs } => AppCommand::Stats { pairs },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => subtrack_fx::cli::setup::setup(),
        Some(cmd) => subtrack_fx::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
