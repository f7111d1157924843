use crate::core::config::CacheConfig;
use crate::core::currency::{ConversionKey, ConvertedAmount};
use crate::core::frequency::FrequencyTracker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A resolved conversion. `result` is `None` for a remembered failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedConversion {
    pub result: Option<ConvertedAmount>,
    pub timestamp: Instant,
    pub hit_count: u64,
}

/// In-memory conversion results with per-entry TTL and a size bound.
///
/// The TTL of an entry is decided at lookup time: remembered failures use the
/// negative TTL, pairs the [`FrequencyTracker`] considers frequent use the
/// extended TTL, everything else the base TTL.
pub struct ConversionCache {
    inner: Mutex<HashMap<ConversionKey, CachedConversion>>,
    frequency: Arc<FrequencyTracker>,
    config: CacheConfig,
}

impl ConversionCache {
    pub fn new(config: CacheConfig, frequency: Arc<FrequencyTracker>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            frequency,
            config,
        }
    }

    fn ttl_for(&self, key: &ConversionKey, entry: &CachedConversion) -> Duration {
        if entry.result.is_none() {
            self.config.negative_ttl()
        } else if self.frequency.is_frequent(&key.pair()) {
            self.config.frequent_ttl()
        } else {
            self.config.ttl()
        }
    }

    fn is_expired(&self, key: &ConversionKey, entry: &CachedConversion, now: Instant) -> bool {
        now.duration_since(entry.timestamp) > self.ttl_for(key, entry)
    }

    /// Returns the live entry for `key` and counts the hit. Expired entries are
    /// dropped and reported as a miss.
    pub async fn get(&self, key: &ConversionKey) -> Option<CachedConversion> {
        let mut cache = self.inner.lock().await;
        let now = Instant::now();
        let expired = match cache.get(key) {
            Some(entry) => self.is_expired(key, entry, now),
            None => {
                debug!(%key, "Cache MISS");
                return None;
            }
        };
        if expired {
            cache.remove(key);
            debug!(%key, "Cache entry expired");
            return None;
        }
        let entry = cache.get_mut(key)?;
        entry.hit_count += 1;
        debug!(%key, hits = entry.hit_count, "Cache HIT");
        Some(entry.clone())
    }

    pub async fn set(&self, key: ConversionKey, result: Option<ConvertedAmount>) {
        let mut cache = self.inner.lock().await;
        debug!(%key, negative = result.is_none(), "Cache PUT");
        cache.insert(
            key,
            CachedConversion {
                result,
                timestamp: Instant::now(),
                hit_count: 0,
            },
        );

        if cache.len() > self.config.max_entries {
            let overflow = cache.len() - self.config.max_entries;
            let mut by_age: Vec<(ConversionKey, Instant)> = cache
                .iter()
                .map(|(k, v)| (k.clone(), v.timestamp))
                .collect();
            by_age.sort_by_key(|(_, timestamp)| *timestamp);
            for (old_key, _) in by_age.into_iter().take(overflow) {
                cache.remove(&old_key);
            }
            debug!(evicted = overflow, "Cache over capacity, evicted oldest entries");
        }
    }

    pub async fn remove(&self, key: &ConversionKey) -> bool {
        let mut cache = self.inner.lock().await;
        debug!(%key, "Cache REMOVE");
        cache.remove(key).is_some()
    }

    /// Drops every expired entry; returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut cache = self.inner.lock().await;
        let now = Instant::now();
        let before = cache.len();
        let expired: Vec<ConversionKey> = cache
            .iter()
            .filter(|(k, v)| self.is_expired(k, v, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            cache.remove(key);
        }
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "Cache sweep");
        }
        removed
    }

    pub async fn clear(&self) {
        let mut cache = self.inner.lock().await;
        cache.clear();
        debug!("Cache CLEAR");
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn total_hits(&self) -> u64 {
        self.inner
            .lock()
            .await
            .values()
            .map(|entry| entry.hit_count)
            .sum()
    }
}
