use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Counts how often each currency pair is requested. Only ever a heuristic:
/// frequent pairs get a longer cache TTL and a shorter debounce.
pub struct FrequencyTracker {
    counts: RwLock<HashMap<String, u64>>,
    threshold: u64,
}

impl FrequencyTracker {
    pub fn new(threshold: u64) -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
            threshold,
        }
    }

    /// Returns the updated count.
    pub fn record_usage(&self, pair: &str) -> u64 {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(pair.to_string()).or_insert(0);
        *count += 1;
        debug!(pair, count = *count, "Recorded pair usage");
        *count
    }

    pub fn frequency(&self, pair: &str) -> u64 {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        counts.get(pair).copied().unwrap_or(0)
    }

    pub fn is_frequent(&self, pair: &str) -> bool {
        self.frequency(pair) >= self.threshold
    }

    /// Highest-usage pairs first; ties are ordered by pair name.
    pub fn top_pairs(&self, n: usize) -> Vec<(String, u64)> {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        let mut pairs: Vec<(String, u64)> =
            counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pairs.truncate(n);
        pairs
    }

    pub fn tracked_pairs(&self) -> usize {
        self.counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn frequent_pairs(&self) -> usize {
        self.counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|count| **count >= self.threshold)
            .count()
    }

    pub fn clear(&self) {
        self.counts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Frequency counters cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_marks_pair_frequent() {
        let tracker = FrequencyTracker::new(2);
        assert!(!tracker.is_frequent("EUR-USD"));

        assert_eq!(tracker.record_usage("EUR-USD"), 1);
        assert!(!tracker.is_frequent("EUR-USD"));

        assert_eq!(tracker.record_usage("EUR-USD"), 2);
        assert!(tracker.is_frequent("EUR-USD"));
        assert_eq!(tracker.frequent_pairs(), 1);
    }

    #[test]
    fn test_top_pairs_sorted_descending() {
        let tracker = FrequencyTracker::new(2);
        for _ in 0..3 {
            tracker.record_usage("GBP-USD");
        }
        tracker.record_usage("EUR-USD");
        for _ in 0..5 {
            tracker.record_usage("JPY-USD");
        }

        let top = tracker.top_pairs(2);
        assert_eq!(
            top,
            vec![("JPY-USD".to_string(), 5), ("GBP-USD".to_string(), 3)]
        );
        assert_eq!(tracker.top_pairs(10).len(), 3);
    }

    #[test]
    fn test_clear_resets_counts() {
        let tracker = FrequencyTracker::new(2);
        tracker.record_usage("EUR-USD");
        tracker.record_usage("EUR-USD");
        tracker.clear();
        assert_eq!(tracker.frequency("EUR-USD"), 0);
        assert_eq!(tracker.tracked_pairs(), 0);
    }
}
