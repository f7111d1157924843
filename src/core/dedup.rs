use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// A request future that any number of callers can await.
pub type SharedRequest<V> = Shared<BoxFuture<'static, V>>;

struct PendingRequest<V: Clone> {
    id: u64,
    future: SharedRequest<V>,
}

/// Keeps at most one in-flight request per key.
///
/// Every registered request is driven to completion on its own task, so it
/// settles (and leaves the pending map) even if all callers stop waiting.
pub struct Deduplicator<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pending: Arc<Mutex<HashMap<K, PendingRequest<V>>>>,
    next_id: AtomicU64,
}

impl<K, V> Deduplicator<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Returns the pending request for `key`, creating it with `factory` when
    /// none exists. The flag is `true` when an existing request was joined.
    pub async fn get_or_create<F, Fut>(&self, key: K, factory: F) -> (SharedRequest<V>, bool)
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = V> + Send + 'static,
    {
        let future = {
            let mut pending = self.pending.lock().await;
            if let Some(existing) = pending.get(&key) {
                debug!(%key, "Joining pending request");
                return (existing.future.clone(), true);
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let request = factory();
            let registry = Arc::clone(&self.pending);
            let cleanup_key = key.clone();
            let future = async move {
                let value = request.await;
                let mut pending = registry.lock().await;
                if pending.get(&cleanup_key).is_some_and(|p| p.id == id) {
                    pending.remove(&cleanup_key);
                    debug!(key = %cleanup_key, "Pending request settled");
                }
                value
            }
            .boxed()
            .shared();

            debug!(%key, "Registered pending request");
            pending.insert(
                key,
                PendingRequest {
                    id,
                    future: future.clone(),
                },
            );
            future
        };

        tokio::spawn(future.clone());
        (future, false)
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.pending.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Forgets every pending request. Callers already holding a request keep
    /// awaiting it.
    pub async fn clear(&self) {
        self.pending.lock().await.clear();
    }
}

impl<K, V> Default for Deduplicator<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_request() {
        let dedup = Deduplicator::<String, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..5).map(|_| {
            let calls = Arc::clone(&calls);
            let dedup = &dedup;
            async move {
                let (request, _) = dedup
                    .get_or_create("EUR-USD".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await;
                request.await
            }
        });

        let results = join_all(callers).await;
        assert_eq!(results, vec![42; 5]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_joined_flag_and_cleanup_after_settle() {
        let dedup = Deduplicator::<String, u32>::new();
        let (first, joined) = dedup
            .get_or_create("k".to_string(), || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                1
            })
            .await;
        assert!(!joined);

        let (second, joined) = dedup.get_or_create("k".to_string(), || async { 2 }).await;
        assert!(joined);
        assert!(dedup.contains(&"k".to_string()).await);

        assert_eq!(first.await, 1);
        assert_eq!(second.await, 1);
        assert!(dedup.is_empty().await);

        let (third, joined) = dedup.get_or_create("k".to_string(), || async { 3 }).await;
        assert!(!joined);
        assert_eq!(third.await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_settles_without_callers() {
        let dedup = Deduplicator::<String, u32>::new();
        let (request, _) = dedup
            .get_or_create("k".to_string(), || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await;
        drop(request);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dedup.len().await, 0);
    }
}
