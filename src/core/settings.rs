//! User currency preferences and their persistence

use crate::core::error::ConversionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Allowed refresh interval, in minutes.
pub const REFRESH_INTERVAL_RANGE: RangeInclusive<u32> = 15..=1440;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrencySettings {
    pub enable_currency_conversion: bool,
    pub auto_convert_currencies: bool,
    pub preferred_display_currency: String,
    pub show_original_currency: bool,
    pub show_conversion_rates: bool,
    pub currency_refresh_interval: u32,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            enable_currency_conversion: true,
            auto_convert_currencies: true,
            preferred_display_currency: "USD".to_string(),
            show_original_currency: true,
            show_conversion_rates: false,
            currency_refresh_interval: 60,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub enable_currency_conversion: Option<bool>,
    pub auto_convert_currencies: Option<bool>,
    pub preferred_display_currency: Option<String>,
    pub show_original_currency: Option<bool>,
    pub show_conversion_rates: Option<bool>,
    pub currency_refresh_interval: Option<u32>,
}

impl SettingsUpdate {
    pub fn validate(&self) -> Result<(), ConversionError> {
        if let Some(interval) = self.currency_refresh_interval {
            if !REFRESH_INTERVAL_RANGE.contains(&interval) {
                return Err(ConversionError::invalid(format!(
                    "Refresh interval must be between {} and {} minutes, got {interval}",
                    REFRESH_INTERVAL_RANGE.start(),
                    REFRESH_INTERVAL_RANGE.end()
                )));
            }
        }
        if let Some(currency) = &self.preferred_display_currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConversionError::invalid(format!(
                    "Invalid currency code: {currency}"
                )));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, settings: &CurrencySettings) -> CurrencySettings {
        let mut next = settings.clone();
        if let Some(v) = self.enable_currency_conversion {
            next.enable_currency_conversion = v;
        }
        if let Some(v) = self.auto_convert_currencies {
            next.auto_convert_currencies = v;
        }
        if let Some(v) = &self.preferred_display_currency {
            next.preferred_display_currency = v.to_uppercase();
        }
        if let Some(v) = self.show_original_currency {
            next.show_original_currency = v;
        }
        if let Some(v) = self.show_conversion_rates {
            next.show_conversion_rates = v;
        }
        if let Some(v) = self.currency_refresh_interval {
            next.currency_refresh_interval = v;
        }
        next
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Lifecycle of the last settings mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveState {
    Idle,
    Saving { previous: CurrencySettings },
    Committed,
    RolledBack {
        previous: CurrencySettings,
        reason: String,
    },
}

/// Settings endpoints of the backend.
#[async_trait]
pub trait SettingsApi: Send + Sync {
    async fn fetch_settings(&self) -> Result<CurrencySettings, ConversionError>;
    async fn save_settings(&self, settings: &CurrencySettings) -> Result<(), ConversionError>;
}

struct SettingsState {
    settings: CurrencySettings,
    save_state: SaveState,
    loading: bool,
}

pub struct SettingsStore {
    api: Arc<dyn SettingsApi>,
    state: RwLock<SettingsState>,
}

impl SettingsStore {
    pub fn new(api: Arc<dyn SettingsApi>) -> Self {
        Self {
            api,
            state: RwLock::new(SettingsState {
                settings: CurrencySettings::default(),
                save_state: SaveState::Idle,
                loading: false,
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SettingsState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SettingsState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> CurrencySettings {
        self.read().settings.clone()
    }

    pub fn loading(&self) -> bool {
        self.read().loading
    }

    pub fn save_state(&self) -> SaveState {
        self.read().save_state.clone()
    }

    /// Fetches settings from the backend. Missing fields fall back to the
    /// defaults; on failure the current settings are kept.
    pub async fn load(&self) -> Result<CurrencySettings, ConversionError> {
        self.write().loading = true;
        let result = self.api.fetch_settings().await;
        let mut state = self.write();
        state.loading = false;
        match result {
            Ok(settings) => {
                debug!(?settings, "Loaded currency settings");
                state.settings = settings.clone();
                Ok(settings)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load currency settings, using defaults");
                Err(e)
            }
        }
    }

    /// Applies `update` locally, persists it, and restores the previous value
    /// if persisting fails.
    pub async fn update(&self, update: SettingsUpdate) -> Result<CurrencySettings, ConversionError> {
        update.validate()?;

        let next = {
            let mut state = self.write();
            let previous = state.settings.clone();
            let next = update.apply_to(&previous);
            state.settings = next.clone();
            state.save_state = SaveState::Saving { previous };
            next
        };

        match self.api.save_settings(&next).await {
            Ok(()) => {
                let mut state = self.write();
                state.save_state = SaveState::Committed;
                info!("Currency settings saved");
                Ok(next)
            }
            Err(e) => {
                let mut state = self.write();
                if let SaveState::Saving { previous } = &state.save_state {
                    let previous = previous.clone();
                    state.settings = previous.clone();
                    state.save_state = SaveState::RolledBack {
                        previous,
                        reason: e.to_string(),
                    };
                }
                warn!(error = %e, "Failed to save currency settings, rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockSettingsApi {
        stored: Mutex<Option<CurrencySettings>>,
        payload: &'static str,
        fail_save: bool,
    }

    #[async_trait]
    impl SettingsApi for MockSettingsApi {
        async fn fetch_settings(&self) -> Result<CurrencySettings, ConversionError> {
            Ok(serde_json::from_str(self.payload)?)
        }

        async fn save_settings(&self, settings: &CurrencySettings) -> Result<(), ConversionError> {
            if self.fail_save {
                return Err(ConversionError::from_status(500, ""));
            }
            *self.stored.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    fn store(payload: &'static str, fail_save: bool) -> (SettingsStore, Arc<MockSettingsApi>) {
        let api = Arc::new(MockSettingsApi {
            stored: Mutex::new(None),
            payload,
            fail_save,
        });
        (SettingsStore::new(api.clone()), api)
    }

    #[tokio::test]
    async fn test_load_merges_with_defaults() {
        let (store, _) = store(r#"{"preferredDisplayCurrency": "EUR"}"#, false);
        let settings = store.load().await.unwrap();
        assert_eq!(settings.preferred_display_currency, "EUR");
        assert!(settings.enable_currency_conversion);
        assert_eq!(settings.currency_refresh_interval, 60);
        assert!(!store.loading());
    }

    #[tokio::test]
    async fn test_load_failure_keeps_defaults() {
        let (store, _) = store("{broken", false);
        assert!(store.load().await.is_err());
        assert_eq!(store.current(), CurrencySettings::default());
    }

    #[tokio::test]
    async fn test_update_commits() {
        let (store, api) = store("{}", false);
        let update = SettingsUpdate {
            preferred_display_currency: Some("gbp".to_string()),
            currency_refresh_interval: Some(30),
            ..Default::default()
        };
        let saved = store.update(update).await.unwrap();
        assert_eq!(saved.preferred_display_currency, "GBP");
        assert_eq!(store.save_state(), SaveState::Committed);
        assert_eq!(api.stored.lock().unwrap().as_ref(), Some(&saved));
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_failure() {
        let (store, _) = store("{}", true);
        let update = SettingsUpdate {
            enable_currency_conversion: Some(false),
            ..Default::default()
        };
        assert!(store.update(update).await.is_err());
        assert!(store.current().enable_currency_conversion);
        match store.save_state() {
            SaveState::RolledBack { previous, reason } => {
                assert_eq!(previous, CurrencySettings::default());
                assert!(reason.contains("500"));
            }
            other => panic!("Expected rollback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_interval_bounds() {
        let (store, _) = store("{}", false);
        for interval in [14, 1441] {
            let update = SettingsUpdate {
                currency_refresh_interval: Some(interval),
                ..Default::default()
            };
            let err = store.update(update).await.unwrap_err();
            assert!(matches!(err, ConversionError::InvalidRequest { .. }));
        }
        assert_eq!(store.save_state(), SaveState::Idle);

        for interval in [15, 1440] {
            let update = SettingsUpdate {
                currency_refresh_interval: Some(interval),
                ..Default::default()
            };
            assert!(store.update(update).await.is_ok());
        }
    }
}
