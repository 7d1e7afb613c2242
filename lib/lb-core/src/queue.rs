//! Coalescing work queue with per-key single-flight

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::trace;

struct QueueState<T> {
    queue: VecDeque<T>,
    /// Items waiting to be handed out, including ones re-added while processing
    dirty: HashSet<T>,
    /// Items currently held by a worker
    processing: HashSet<T>,
    shutting_down: bool,
}

/// WorkQueue hands each key to at most one worker at a time.
///
/// Adding a key that is already queued is a no-op. Adding a key that is
/// being processed marks it dirty; it is re-queued when the worker calls
/// [`WorkQueue::done`], so the next pass sees the latest state.
pub struct WorkQueue<T> {
    name: &'static str,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // State stays consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue `item` unless it is already waiting
    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            trace!(queue = self.name, ?item, "coalesced while processing");
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next item; `None` once shut down and empty
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so idle workers pick up the rest.
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `item` finished; re-queues it if it was added while processing
    pub fn done(&self, item: &T) {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Drop a waiting item; an in-flight one still finishes but is not re-queued
    pub fn forget(&self, item: &T) {
        let mut state = self.lock();
        if state.dirty.remove(item) {
            state.queue.retain(|queued| queued != item);
        }
    }

    /// True if `item` is waiting to be handed out
    pub fn is_pending(&self, item: &T) -> bool {
        self.lock().dirty.contains(item)
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting work; workers drain what is queued and then see `None`
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
