use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

struct Timer {
    id: u64,
    deadline: Instant,
    job: BoxFuture<'static, ()>,
    handle: Option<JoinHandle<()>>,
}

/// Keyed trailing-edge debounce.
///
/// While a timer for a key is waiting, scheduling the key again replaces its
/// job and pushes its deadline back, so only the latest call runs. Once a
/// timer fires its job is detached from the scheduler and can no longer be
/// replaced or cancelled.
pub struct DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    timers: Arc<Mutex<HashMap<K, Timer>>>,
    next_id: AtomicU64,
}

impl<K> DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn schedule<F>(&self, key: K, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut timers = self.timers.lock().await;
        if let Some(timer) = timers.get_mut(&key) {
            debug!(%key, ?delay, "Replacing debounced job");
            timer.deadline = deadline;
            timer.job = job.boxed();
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(run_timer(Arc::clone(&self.timers), key.clone(), id));
        debug!(%key, ?delay, "Scheduled debounced job");
        timers.insert(
            key,
            Timer {
                id,
                deadline,
                job: job.boxed(),
                handle: Some(handle),
            },
        );
    }

    /// Pushes back the deadline of a waiting timer and keeps its job. Returns
    /// `false` when nothing is waiting for `key`.
    pub async fn reschedule(&self, key: &K, delay: Duration) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.get_mut(key) {
            Some(timer) => {
                timer.deadline = Instant::now() + delay;
                debug!(%key, ?delay, "Rescheduled debounced job");
                true
            }
            None => false,
        }
    }

    pub async fn cancel(&self, key: &K) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.remove(key) {
            Some(mut timer) => {
                if let Some(handle) = timer.handle.take() {
                    handle.abort();
                }
                debug!(%key, "Cancelled debounced job");
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, mut timer) in timers.drain() {
            if let Some(handle) = timer.handle.take() {
                handle.abort();
            }
        }
        debug!("Cancelled all debounced jobs");
    }

    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.timers.lock().await.is_empty()
    }
}

impl<K> Default for DebounceScheduler<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

async fn run_timer<K>(timers: Arc<Mutex<HashMap<K, Timer>>>, key: K, id: u64)
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    loop {
        let deadline = match timers.lock().await.get(&key) {
            Some(timer) if timer.id == id => timer.deadline,
            _ => return,
        };
        sleep_until(deadline).await;

        let fired = {
            let mut guard = timers.lock().await;
            let due = match guard.get(&key) {
                Some(timer) if timer.id == id => timer.deadline <= Instant::now(),
                _ => return,
            };
            if !due {
                continue;
            }
            guard.remove(&key)
        };
        let Some(timer) = fired else {
            return;
        };

        debug!(%key, "Debounced job fired");
        timer.job.await;
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<&'static str>>>, impl Fn(&'static str) -> BoxFuture<'static, ()>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &'static str| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(label);
            }
            .boxed()
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_call_wins() {
        let scheduler = DebounceScheduler::<String>::new();
        let (log, job) = recorder();

        scheduler
            .schedule("k".to_string(), Duration::from_millis(200), job("first"))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler
            .schedule("k".to_string(), Duration::from_millis(200), job("second"))
            .await;

        // The original deadline has passed but the timer was pushed back
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(log.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
        assert!(scheduler.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_keeps_job() {
        let scheduler = DebounceScheduler::<String>::new();
        let (log, job) = recorder();

        scheduler
            .schedule("k".to_string(), Duration::from_millis(100), job("only"))
            .await;
        assert!(
            scheduler
                .reschedule(&"k".to_string(), Duration::from_millis(500))
                .await
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(log.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(*log.lock().unwrap(), vec!["only"]);

        assert!(
            !scheduler
                .reschedule(&"k".to_string(), Duration::from_millis(10))
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_job() {
        let scheduler = DebounceScheduler::<String>::new();
        let (log, job) = recorder();

        scheduler
            .schedule("a".to_string(), Duration::from_millis(100), job("a"))
            .await;
        scheduler
            .schedule("b".to_string(), Duration::from_millis(100), job("b"))
            .await;
        assert_eq!(scheduler.len().await, 2);

        assert!(scheduler.cancel(&"a".to_string()).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*log.lock().unwrap(), vec!["b"]);

        scheduler
            .schedule("c".to_string(), Duration::from_millis(100), job("c"))
            .await;
        scheduler.cancel_all().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }
}
