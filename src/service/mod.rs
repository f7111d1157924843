//! Conversion service: settings gate, cache, deduplication, debounce and
//! batching behind one session-scoped object.

pub mod batch;

pub use batch::{BatchCoalescer, BatchItem};

use crate::core::cache::ConversionCache;
use crate::core::config::{ConversionConfig, DebounceConfig};
use crate::core::currency::{
    ConversionApi, ConversionKey, ConvertedAmount, Currency, ExchangeRates, Priority,
    fallback_currencies,
};
use crate::core::dedup::Deduplicator;
use crate::core::error::{ConversionError, RetryError};
use crate::core::error_handler::ErrorHandler;
use crate::core::frequency::FrequencyTracker;
use crate::core::scheduler::DebounceScheduler;
use crate::core::settings::{CurrencySettings, SettingsApi, SettingsStore, SettingsUpdate};
use chrono::Utc;
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, instrument, warn};

/// Snapshot of the cache and request bookkeeping, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_hits: u64,
    pub pending_requests: usize,
    pub scheduled_timers: usize,
    pub tracked_pairs: usize,
    pub frequent_pairs: usize,
    pub top_pairs: Vec<(String, u64)>,
}

struct Inner {
    api: Arc<dyn ConversionApi>,
    settings: SettingsStore,
    frequency: Arc<FrequencyTracker>,
    cache: Arc<ConversionCache>,
    pending: Deduplicator<ConversionKey, Option<ConvertedAmount>>,
    timers: DebounceScheduler<ConversionKey>,
    batch: BatchCoalescer,
    errors: ErrorHandler,
    debounce: DebounceConfig,
}

impl Inner {
    fn debounce_delay(&self, priority: Priority, pair: &str) -> Duration {
        let ms = match priority {
            Priority::High => self.debounce.high_priority_ms,
            Priority::Low => self.debounce.low_priority_ms,
            Priority::Normal if self.frequency.is_frequent(pair) => self.debounce.fast_path_ms,
            Priority::Normal => self.debounce.default_ms,
        };
        Duration::from_millis(ms)
    }

    async fn fetch(&self, key: &ConversionKey) -> Result<ConvertedAmount, ConversionError> {
        let request = key.request();
        debug!(%key, "Requesting conversion");
        let response = self.api.convert(&request).await?;
        if response.converted_amount == 0.0 {
            debug!(%key, "Conversion returned a zero amount");
        }
        Ok(ConvertedAmount::from_response(&request, &response))
    }

    /// Body of a new pending request. A request for the same key may have
    /// settled between the caller's cache miss and registration; its cached
    /// result is reused instead of fetching again.
    async fn resolve(
        self: Arc<Self>,
        key: ConversionKey,
        delay: Duration,
    ) -> Option<ConvertedAmount> {
        if let Some(entry) = self.cache.get(&key).await {
            debug!(%key, "Resolved from a request that settled meanwhile");
            return entry.result;
        }

        let (tx, rx) = oneshot::channel();
        let fetch_inner = Arc::clone(&self);
        let fetch_key = key.clone();
        self.timers
            .schedule(key, delay, async move {
                let result = fetch_inner.fetch_and_cache(fetch_key).await;
                let _ = tx.send(result);
            })
            .await;
        rx.await.unwrap_or(None)
    }

    /// Failures are remembered as `None` so a broken pair is not retried
    /// until its negative entry expires.
    async fn fetch_and_cache(&self, key: ConversionKey) -> Option<ConvertedAmount> {
        match self.fetch(&key).await {
            Ok(converted) => {
                self.cache.set(key, Some(converted.clone())).await;
                Some(converted)
            }
            Err(e) => {
                self.errors.handle_error(&e);
                self.cache.set(key, None).await;
                None
            }
        }
    }
}

/// Session-scoped currency conversion client.
///
/// Must be created inside a Tokio runtime: construction starts the periodic
/// cache sweep. Call [`dispose`](Self::dispose) when the session ends.
pub struct CurrencyConversionService {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CurrencyConversionService {
    pub fn new(
        api: Arc<dyn ConversionApi>,
        settings_api: Arc<dyn SettingsApi>,
        config: &ConversionConfig,
    ) -> Self {
        let frequency = Arc::new(FrequencyTracker::new(config.cache.frequency_threshold));
        let cache = Arc::new(ConversionCache::new(
            config.cache.clone(),
            Arc::clone(&frequency),
        ));
        let batch = BatchCoalescer::new(
            Arc::clone(&api),
            Arc::clone(&cache),
            config.debounce.batch_window(),
        );

        let period = config.cache.sweep_interval();
        let sweep_cache = Arc::clone(&cache);
        let sweeper = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                sweep_cache.sweep().await;
            }
        });

        let inner = Inner {
            api,
            settings: SettingsStore::new(settings_api),
            frequency,
            cache,
            pending: Deduplicator::new(),
            timers: DebounceScheduler::new(),
            batch,
            errors: ErrorHandler::new(&config.retry),
            debounce: config.debounce.clone(),
        };

        Self {
            inner: Arc::new(inner),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn settings(&self) -> CurrencySettings {
        self.inner.settings.current()
    }

    pub fn loading(&self) -> bool {
        self.inner.settings.loading()
    }

    /// User-facing message of the latest failure, if any.
    pub fn error(&self) -> Option<String> {
        self.inner.errors.message()
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.inner.errors
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.inner.settings
    }

    pub fn is_conversion_enabled(&self) -> bool {
        self.settings().enable_currency_conversion
    }

    pub fn should_auto_convert(&self) -> bool {
        let settings = self.settings();
        settings.enable_currency_conversion && settings.auto_convert_currencies
    }

    pub fn preferred_currency(&self) -> String {
        self.settings().preferred_display_currency
    }

    pub async fn load_settings(&self) -> Result<CurrencySettings, ConversionError> {
        self.inner.settings.load().await.inspect_err(|e| {
            self.inner.errors.handle_error(e);
        })
    }

    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<CurrencySettings, ConversionError> {
        self.inner.settings.update(update).await.inspect_err(|e| {
            self.inner.errors.handle_error(e);
        })
    }

    /// Converts `amount` into `to` (or the preferred display currency).
    ///
    /// Returns `None` when conversion is disabled, not needed, or failed; a
    /// caller should then show the original amount.
    #[instrument(skip(self))]
    pub async fn convert_amount(
        &self,
        amount: f64,
        from: &str,
        to: Option<&str>,
        priority: Priority,
    ) -> Option<ConvertedAmount> {
        let settings = self.settings();
        if !settings.enable_currency_conversion {
            debug!("Currency conversion disabled");
            return None;
        }
        let target = to.unwrap_or(&settings.preferred_display_currency);
        if from.eq_ignore_ascii_case(target) {
            return None;
        }

        let key = ConversionKey::new(amount, from, target);
        let pair = key.pair();
        // Looked up before counting, so this attempt cannot extend its own TTL
        let cached = self.inner.cache.get(&key).await;
        self.inner.frequency.record_usage(&pair);
        if let Some(entry) = cached {
            return entry.result;
        }

        let delay = self.inner.debounce_delay(priority, &pair);
        let inner = Arc::clone(&self.inner);
        let job_key = key.clone();
        let (request, joined) = self
            .inner
            .pending
            .get_or_create(key.clone(), move || inner.resolve(job_key, delay))
            .await;

        if joined {
            self.inner.timers.reschedule(&key, delay).await;
        }
        request.await
    }

    /// Converts several amounts into the preferred display currency. Cached
    /// amounts resolve immediately; the rest join the current batch window.
    ///
    /// Amounts already in the display currency are skipped, and amounts that
    /// could not be converted are left out of the result.
    pub async fn batch_convert(&self, conversions: &[BatchItem]) -> Vec<ConvertedAmount> {
        enum Slot {
            Ready(Option<ConvertedAmount>),
            Queued(usize),
        }

        let settings = self.settings();
        if !settings.enable_currency_conversion {
            return Vec::new();
        }
        let target = settings.preferred_display_currency;

        let mut slots = Vec::with_capacity(conversions.len());
        let mut misses = Vec::new();
        for item in conversions {
            if item.from_currency.eq_ignore_ascii_case(&target) {
                continue;
            }
            let key = ConversionKey::new(item.amount, &item.from_currency, &target);
            let cached = self.inner.cache.get(&key).await;
            self.inner.frequency.record_usage(&key.pair());
            match cached {
                Some(entry) => slots.push(Slot::Ready(entry.result)),
                None => {
                    slots.push(Slot::Queued(misses.len()));
                    misses.push(key.request());
                }
            }
        }

        let fetched = match self.inner.batch.enqueue(misses).await {
            Ok(results) => results,
            Err(e) => {
                self.inner.errors.handle_error(&e);
                Vec::new()
            }
        };

        slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Ready(result) => result,
                Slot::Queued(i) => fetched.get(i).cloned().flatten(),
            })
            .collect()
    }

    /// Caller-initiated retry of a single conversion, bypassing any cached
    /// failure. Subject to the error handler's backoff and retry limit.
    pub async fn retry_conversion(
        &self,
        amount: f64,
        from: &str,
        to: Option<&str>,
    ) -> Result<ConvertedAmount, RetryError> {
        let target = to
            .map(str::to_string)
            .unwrap_or_else(|| self.preferred_currency());
        if from.eq_ignore_ascii_case(&target) {
            return Err(ConversionError::invalid("Source and target currency are the same").into());
        }
        let key = ConversionKey::new(amount, from, &target);
        let inner = &self.inner;
        inner
            .errors
            .retry(|| async move {
                inner.cache.remove(&key).await;
                let converted = inner.fetch(&key).await?;
                inner.cache.set(key, Some(converted.clone())).await;
                Ok(converted)
            })
            .await
    }

    /// Warms the cache with low-priority conversions of one unit for each
    /// pair. Returns how many pairs produced a rate.
    pub async fn preload_currency_pairs(&self, pairs: &[(String, String)]) -> usize {
        let conversions = pairs
            .iter()
            .map(|(from, to)| self.convert_amount(1.0, from, Some(to.as_str()), Priority::Low));
        let loaded = join_all(conversions)
            .await
            .into_iter()
            .filter(Option::is_some)
            .count();
        info!(requested = pairs.len(), loaded, "Preloaded currency pairs");
        loaded
    }

    pub async fn exchange_rates(
        &self,
        base: Option<&str>,
        targets: &[String],
    ) -> Result<ExchangeRates, ConversionError> {
        let base = base
            .map(str::to_uppercase)
            .unwrap_or_else(|| self.preferred_currency());
        let result = match self.inner.api.rates(&base, targets).await {
            Ok(response) if response.success => Ok(ExchangeRates {
                base_currency: response.base_currency,
                rates: response.rates,
                timestamp: response.timestamp.unwrap_or_else(Utc::now),
            }),
            Ok(_) => Err(ConversionError::unknown(format!(
                "Exchange rate lookup for {base} was unsuccessful"
            ))),
            Err(e) => Err(e),
        };
        result.inspect_err(|e| {
            self.inner.errors.handle_error(e);
        })
    }

    pub async fn supported_currencies(&self) -> Vec<Currency> {
        match self.inner.api.supported_currencies().await {
            Ok(currencies) if !currencies.is_empty() => currencies,
            Ok(_) => fallback_currencies(),
            Err(e) => {
                warn!(error = %e, "Falling back to built-in currency list");
                fallback_currencies()
            }
        }
    }

    /// Drops every cached result and resets the usage counters.
    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
        self.inner.frequency.clear();
        info!("Conversion cache cleared");
    }

    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.cache.len().await,
            total_hits: self.inner.cache.total_hits().await,
            pending_requests: self.inner.pending.len().await,
            scheduled_timers: self.inner.timers.len().await,
            tracked_pairs: self.inner.frequency.tracked_pairs(),
            frequent_pairs: self.inner.frequency.frequent_pairs(),
            top_pairs: self.inner.frequency.top_pairs(5),
        }
    }

    /// Tears the session down: stops the sweep, cancels timers and the queued
    /// batch, and forgets pending requests. Requests already on the wire
    /// still complete.
    pub async fn dispose(&self) {
        self.abort_sweeper();
        self.inner.timers.cancel_all().await;
        self.inner.batch.cancel().await;
        self.inner.pending.clear().await;
        info!("Conversion service disposed");
    }

    fn abort_sweeper(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for CurrencyConversionService {
    fn drop(&mut self) {
        self.abort_sweeper();
    }
}
