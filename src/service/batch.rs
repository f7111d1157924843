use crate::core::cache::ConversionCache;
use crate::core::currency::{ConversionApi, ConversionKey, ConversionRequest, ConvertedAmount};
use crate::core::error::ConversionError;
use crate::core::scheduler::DebounceScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

const BATCH_TIMER: &str = "batch";

/// A single amount to convert into the preferred display currency.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub amount: f64,
    pub from_currency: String,
}

impl BatchItem {
    pub fn new(amount: f64, from_currency: &str) -> Self {
        Self {
            amount,
            from_currency: from_currency.to_string(),
        }
    }
}

/// Per-caller outcome, positionally aligned with the requests it enqueued.
pub type BatchOutcome = Result<Vec<Option<ConvertedAmount>>, ConversionError>;

struct BatchWaiter {
    start: usize,
    len: usize,
    tx: oneshot::Sender<BatchOutcome>,
}

#[derive(Default)]
struct BatchQueue {
    requests: Vec<ConversionRequest>,
    waiters: Vec<BatchWaiter>,
}

/// Merges every `enqueue` call made within the batch window into a single
/// `convert_batch` round trip.
pub struct BatchCoalescer {
    api: Arc<dyn ConversionApi>,
    cache: Arc<ConversionCache>,
    queue: Arc<Mutex<BatchQueue>>,
    timer: DebounceScheduler<&'static str>,
    window: Duration,
}

impl BatchCoalescer {
    pub fn new(api: Arc<dyn ConversionApi>, cache: Arc<ConversionCache>, window: Duration) -> Self {
        Self {
            api,
            cache,
            queue: Arc::new(Mutex::new(BatchQueue::default())),
            timer: DebounceScheduler::new(),
            window,
        }
    }

    /// Queues `requests` and waits for the batch they end up in. A failed
    /// batch fails every caller with the same error.
    pub async fn enqueue(&self, requests: Vec<ConversionRequest>) -> BatchOutcome {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.queue.lock().await;
            let start = queue.requests.len();
            let len = requests.len();
            queue.requests.extend(requests);
            queue.waiters.push(BatchWaiter { start, len, tx });
            debug!(
                queued = queue.requests.len(),
                callers = queue.waiters.len(),
                "Queued batch conversions"
            );
        }

        self.timer
            .schedule(
                BATCH_TIMER,
                self.window,
                flush(
                    Arc::clone(&self.api),
                    Arc::clone(&self.cache),
                    Arc::clone(&self.queue),
                ),
            )
            .await;

        rx.await
            .unwrap_or_else(|_| Err(ConversionError::unknown("Batch conversion was cancelled")))
    }

    /// Drops the queued batch; its callers observe a cancellation error.
    pub async fn cancel(&self) {
        self.timer.cancel_all().await;
        let dropped = std::mem::take(&mut *self.queue.lock().await);
        if !dropped.waiters.is_empty() {
            debug!(callers = dropped.waiters.len(), "Dropped queued batch");
        }
    }

    pub async fn queued(&self) -> usize {
        self.queue.lock().await.requests.len()
    }
}

async fn flush(
    api: Arc<dyn ConversionApi>,
    cache: Arc<ConversionCache>,
    queue: Arc<Mutex<BatchQueue>>,
) {
    let batch = std::mem::take(&mut *queue.lock().await);
    if batch.requests.is_empty() {
        return;
    }
    info!(
        conversions = batch.requests.len(),
        callers = batch.waiters.len(),
        "Sending coalesced batch"
    );

    match api.convert_batch(&batch.requests).await {
        Ok(response) => {
            if response.results.len() != batch.requests.len() {
                warn!(
                    expected = batch.requests.len(),
                    received = response.results.len(),
                    "Batch response size mismatch"
                );
            }
            let converted: Vec<Option<ConvertedAmount>> = batch
                .requests
                .iter()
                .enumerate()
                .map(|(i, request)| {
                    response
                        .results
                        .get(i)
                        .and_then(|item| ConvertedAmount::from_batch_item(request, item))
                })
                .collect();

            for (request, result) in batch.requests.iter().zip(&converted) {
                if let Some(amount) = result {
                    let key = ConversionKey::new(
                        request.amount,
                        &request.from_currency,
                        &request.to_currency,
                    );
                    cache.set(key, Some(amount.clone())).await;
                }
            }

            for waiter in batch.waiters {
                let slice = converted[waiter.start..waiter.start + waiter.len].to_vec();
                let _ = waiter.tx.send(Ok(slice));
            }
        }
        Err(e) => {
            warn!(error = %e, "Batch conversion failed");
            for waiter in batch.waiters {
                let _ = waiter.tx.send(Err(e.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CacheConfig;
    use crate::core::frequency::FrequencyTracker;
    use crate::providers::mock::MockConversionApi;
    use std::sync::atomic::Ordering;

    fn request(amount: f64, from: &str) -> ConversionRequest {
        ConversionRequest {
            amount,
            from_currency: from.to_string(),
            to_currency: "USD".to_string(),
        }
    }

    fn coalescer(api: Arc<MockConversionApi>) -> (BatchCoalescer, Arc<ConversionCache>) {
        let cache = Arc::new(ConversionCache::new(
            CacheConfig::default(),
            Arc::new(FrequencyTracker::new(2)),
        ));
        (
            BatchCoalescer::new(api, Arc::clone(&cache), Duration::from_millis(200)),
            cache,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_within_window_share_one_request() {
        let api = Arc::new(MockConversionApi::new());
        let (batch, cache) = coalescer(Arc::clone(&api));

        let (a, b) = tokio::join!(
            batch.enqueue(vec![request(10.0, "EUR"), request(20.0, "EUR")]),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                batch.enqueue(vec![request(5.0, "GBP")]).await
            }
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(api.batch_calls().len(), 1);
        assert_eq!(api.batch_calls()[0].len(), 3);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].as_ref().unwrap().original_amount, 10.0);
        assert_eq!(a[1].as_ref().unwrap().original_amount, 20.0);
        assert_eq!(b[0].as_ref().unwrap().original_currency, "GBP");
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_rejects_every_caller() {
        let api = Arc::new(MockConversionApi::new());
        api.fail_batch.store(true, Ordering::SeqCst);
        let (batch, cache) = coalescer(Arc::clone(&api));

        let (a, b) = tokio::join!(
            batch.enqueue(vec![request(10.0, "EUR")]),
            batch.enqueue(vec![request(5.0, "GBP")])
        );
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(api.batch_calls().len(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pair_yields_gap() {
        let api = Arc::new(MockConversionApi::new());
        let (batch, _) = coalescer(Arc::clone(&api));

        let results = batch
            .enqueue(vec![request(1.0, "XXX"), request(1.0, "EUR")])
            .await
            .unwrap();
        assert!(results[0].is_none());
        assert!(results[1].is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_waiters() {
        let api = Arc::new(MockConversionApi::new());
        let (batch, _) = coalescer(Arc::clone(&api));

        let (result, _) = tokio::join!(batch.enqueue(vec![request(1.0, "EUR")]), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            batch.cancel().await;
        });
        assert!(result.is_err());
        assert!(api.batch_calls().is_empty());
        assert_eq!(batch.queued().await, 0);
    }
}
