//! Fast and slow retry classes for model keys whose sync failed

use crate::config::ControllerConfig;
use crate::key::ModelKey;
use crate::metrics::SyncMetrics;
use crate::queue::WorkQueue;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryClass {
    /// Seconds; transient network and server errors
    Fast,
    /// Minutes; admission, capacity and validation errors from the remote side
    Slow,
}

impl RetryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryClass::Fast => "fast",
            RetryClass::Slow => "slow",
        }
    }

    fn other(&self) -> RetryClass {
        match self {
            RetryClass::Fast => RetryClass::Slow,
            RetryClass::Slow => RetryClass::Fast,
        }
    }
}

impl fmt::Display for RetryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry state of one model key
#[derive(Clone, Debug, PartialEq)]
pub struct RetryEntry {
    pub class: RetryClass,
    /// Failed passes since the last success
    pub attempts: u32,
    pub next_eligible: Instant,
    generation: u64,
}

struct SchedulerInner {
    fast: Arc<WorkQueue<ModelKey>>,
    slow: Arc<WorkQueue<ModelKey>>,
    entries: Mutex<HashMap<ModelKey, RetryEntry>>,
    next_generation: AtomicU64,
    fast_interval: Duration,
    slow_interval: Duration,
    fast_max_attempts: u32,
    metrics: SyncMetrics,
}

impl SchedulerInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<ModelKey, RetryEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn queue(&self, class: RetryClass) -> &Arc<WorkQueue<ModelKey>> {
        match class {
            RetryClass::Fast => &self.fast,
            RetryClass::Slow => &self.slow,
        }
    }
}

/// RetryScheduler keeps each failed key in exactly one retry class and
/// releases it onto that class's queue once its delay has passed
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
}

impl RetryScheduler {
    pub fn new(
        config: &ControllerConfig,
        fast: Arc<WorkQueue<ModelKey>>,
        slow: Arc<WorkQueue<ModelKey>>,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                fast,
                slow,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                fast_interval: config.fast_retry_interval,
                slow_interval: config.slow_retry_interval,
                fast_max_attempts: config.fast_retry_max_attempts,
                metrics,
            }),
        }
    }

    pub fn fast_queue(&self) -> &Arc<WorkQueue<ModelKey>> {
        &self.inner.fast
    }

    pub fn slow_queue(&self) -> &Arc<WorkQueue<ModelKey>> {
        &self.inner.slow
    }

    /// Schedule `key` for another pass. Any pending membership in the other
    /// class is cancelled. Returns the class actually used, which is slow
    /// once fast attempts are exhausted.
    pub fn schedule(&self, key: &ModelKey, requested: RetryClass) -> RetryClass {
        let inner = &self.inner;
        let (class, delay, generation, attempts) = {
            let mut entries = inner.entries();
            let attempts = entries.get(key).map_or(0, |e| e.attempts) + 1;
            let class = if requested == RetryClass::Fast && attempts > inner.fast_max_attempts {
                RetryClass::Slow
            } else {
                requested
            };
            let delay = match class {
                RetryClass::Fast => inner.fast_interval,
                RetryClass::Slow => inner.slow_interval,
            };
            let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed);
            entries.insert(
                key.clone(),
                RetryEntry { class, attempts, next_eligible: Instant::now() + delay, generation },
            );
            (class, delay, generation, attempts)
        };

        inner.queue(class.other()).forget(key);
        inner.metrics.retries_total.with_label_values(&[class.as_str()]).inc();
        debug!("Retry {} for {} in {:?} (attempt {})", class, key, delay, attempts);

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = inner.entries().get(&key).map(|e| e.generation);
            if current == Some(generation) {
                inner.queue(class).add(key);
            }
        });
        class
    }

    /// Whether a key dequeued from `class` is still scheduled there
    pub fn claim(&self, key: &ModelKey, class: RetryClass) -> bool {
        self.inner.entries().get(key).map_or(false, |e| e.class == class)
    }

    /// Forget a key after a successful pass
    pub fn reset(&self, key: &ModelKey) {
        if self.inner.entries().remove(key).is_some() {
            self.inner.fast.forget(key);
            self.inner.slow.forget(key);
        }
    }

    /// Forget every key; used before a periodic full resync
    pub fn reset_all(&self) {
        let keys: Vec<ModelKey> = self.inner.entries().drain().map(|(k, _)| k).collect();
        for key in &keys {
            self.inner.fast.forget(key);
            self.inner.slow.forget(key);
        }
    }

    pub fn entry(&self, key: &ModelKey) -> Option<RetryEntry> {
        self.inner.entries().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max_attempts: u32) -> RetryScheduler {
        let config = ControllerConfig {
            fast_retry_interval: Duration::from_secs(1),
            slow_retry_interval: Duration::from_secs(60),
            fast_retry_max_attempts: max_attempts,
            ..Default::default()
        };
        RetryScheduler::new(
            &config,
            Arc::new(WorkQueue::new("fast")),
            Arc::new(WorkQueue::new("slow")),
            SyncMetrics::new().unwrap(),
        )
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_class_releases_after_interval() {
        let retry = scheduler(5);
        let key = ModelKey::from("admin/a");

        assert_eq!(retry.schedule(&key, RetryClass::Fast), RetryClass::Fast);
        assert!(retry.fast_queue().is_empty());

        advance(2).await;
        assert!(retry.fast_queue().is_pending(&key));
        assert!(retry.slow_queue().is_empty());
        assert!(retry.claim(&key, RetryClass::Fast));
        assert!(!retry.claim(&key, RetryClass::Slow));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cancels_pending_fast() {
        let retry = scheduler(5);
        let key = ModelKey::from("admin/a");

        retry.schedule(&key, RetryClass::Fast);
        retry.schedule(&key, RetryClass::Slow);

        advance(2).await;
        assert!(retry.fast_queue().is_empty());
        assert!(!retry.claim(&key, RetryClass::Fast));

        advance(60).await;
        assert!(retry.slow_queue().is_pending(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_removes_released_slow_entry() {
        let retry = scheduler(5);
        let key = ModelKey::from("admin/a");

        retry.schedule(&key, RetryClass::Slow);
        advance(61).await;
        assert!(retry.slow_queue().is_pending(&key));

        retry.schedule(&key, RetryClass::Fast);
        assert!(!retry.slow_queue().is_pending(&key));

        advance(2).await;
        assert!(retry.fast_queue().is_pending(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_escalates_to_slow_after_max_attempts() {
        let retry = scheduler(2);
        let key = ModelKey::from("admin/a");

        assert_eq!(retry.schedule(&key, RetryClass::Fast), RetryClass::Fast);
        assert_eq!(retry.schedule(&key, RetryClass::Fast), RetryClass::Fast);
        assert_eq!(retry.schedule(&key, RetryClass::Fast), RetryClass::Slow);
        assert_eq!(retry.entry(&key).unwrap().attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_everything() {
        let retry = scheduler(5);
        let key = ModelKey::from("admin/a");

        retry.schedule(&key, RetryClass::Fast);
        retry.reset(&key);
        advance(2).await;

        assert!(retry.fast_queue().is_empty());
        assert!(retry.entry(&key).is_none());
        assert_eq!(retry.schedule(&key, RetryClass::Fast), RetryClass::Fast);
        assert_eq!(retry.entry(&key).unwrap().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_all() {
        let retry = scheduler(5);
        retry.schedule(&ModelKey::from("admin/a"), RetryClass::Slow);
        retry.schedule(&ModelKey::from("admin/b"), RetryClass::Fast);
        retry.reset_all();
        advance(120).await;
        assert!(retry.fast_queue().is_empty());
        assert!(retry.slow_queue().is_empty());
    }
}
