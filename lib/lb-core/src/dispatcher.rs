//! Queue set and the supervisor running their worker pools

use crate::key::{IngestionKey, ModelKey};
use crate::queue::WorkQueue;
use crate::status::StatusTarget;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// The five queues of the pipeline, one payload type each
pub struct Queues {
    pub ingestion: Arc<WorkQueue<IngestionKey>>,
    /// Shared by graph rebuild outcomes and REST sync
    pub graph: Arc<WorkQueue<ModelKey>>,
    pub fast_retry: Arc<WorkQueue<ModelKey>>,
    pub slow_retry: Arc<WorkQueue<ModelKey>>,
    pub status: Arc<WorkQueue<StatusTarget>>,
}

impl Queues {
    pub fn new() -> Self {
        Self {
            ingestion: Arc::new(WorkQueue::new("ingestion")),
            graph: Arc::new(WorkQueue::new("graph")),
            fast_retry: Arc::new(WorkQueue::new("fast-retry")),
            slow_retry: Arc::new(WorkQueue::new("slow-retry")),
            status: Arc::new(WorkQueue::new("status")),
        }
    }

    /// Stop handing out new work; queued items are still drained
    pub fn shut_down_all(&self) {
        self.ingestion.shut_down();
        self.graph.shut_down();
        self.fast_retry.shut_down();
        self.slow_retry.shut_down();
        self.status.shut_down();
    }

    /// Items waiting across every queue
    pub fn pending(&self) -> usize {
        self.ingestion.len() + self.graph.len() + self.fast_retry.len() + self.slow_retry.len() + self.status.len()
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatcher owns every worker task so shutdown can join them in one place
pub struct Dispatcher {
    tasks: JoinSet<()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { tasks: JoinSet::new() }
    }

    /// Run `workers` tasks draining `queue` through `handler`. Each task exits
    /// once the queue is shut down and empty.
    pub fn spawn_pool<T, F, Fut>(&mut self, queue: Arc<WorkQueue<T>>, workers: usize, handler: F)
    where
        T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        for worker in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            self.tasks.spawn(async move {
                debug!(queue = queue.name(), worker, "Worker started");
                while let Some(item) = queue.get().await {
                    handler(item.clone()).await;
                    queue.done(&item);
                }
                debug!(queue = queue.name(), worker, "Worker stopped");
            });
        }
    }

    /// Supervise an auxiliary task, such as a timer, alongside the pools
    pub fn spawn<Fut>(&mut self, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task to finish. Returns false, after aborting the
    /// stragglers, if that takes longer than `timeout`.
    pub async fn drained(&mut self, timeout: Duration) -> bool {
        let tasks = &mut self.tasks;
        let joined = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!("Worker panicked: {}", e);
                    }
                }
            }
        })
        .await;

        match joined {
            Ok(()) => true,
            Err(_) => {
                warn!("{} workers still running after {:?}, aborting", self.tasks.len(), timeout);
                self.tasks.abort_all();
                while self.tasks.join_next().await.is_some() {}
                false
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_pool_drains_queue_before_exiting() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new("test"));
        for i in 0..10 {
            queue.add(i);
        }
        let seen = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new();
        let counter = Arc::clone(&seen);
        dispatcher.spawn_pool(Arc::clone(&queue), 3, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(dispatcher.len(), 3);

        queue.shut_down();
        assert!(dispatcher.drained(Duration::from_secs(5)).await);
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out_on_stuck_worker() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new("test"));
        queue.add(1);

        let mut dispatcher = Dispatcher::new();
        dispatcher.spawn_pool(Arc::clone(&queue), 1, |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        tokio::task::yield_now().await;

        queue.shut_down();
        assert!(!dispatcher.drained(Duration::from_secs(1)).await);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_shut_down_all() {
        let queues = Queues::new();
        queues.graph.add(ModelKey::from("admin/c--default-gw"));
        queues.shut_down_all();
        assert!(queues.ingestion.is_shutting_down());
        assert!(queues.status.is_shutting_down());
        assert_eq!(queues.pending(), 1);
    }
}
