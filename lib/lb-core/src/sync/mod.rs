//! Sync engine: pushes the difference between a model key's graph and the
//! realized-state cache to the load balancer
//!
//! A pass renders the graph, plans the minimal operations and applies them
//! one at a time in dependency order. The cache is updated after every
//! successful call, so a pass that stops halfway leaves an accurate record
//! of what was realized and the next pass resumes from there.

pub mod plan;
pub mod render;

use crate::cache::{CacheEntry, RealizedStateCache};
use crate::client::{ClientError, LbObject, LoadBalancerClient, RemoteObject};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::graph::ObjectGraphStore;
use crate::key::ModelKey;
use crate::metrics::SyncMetrics;
use crate::retry::RetryClass;
use plan::{plan, Operation};
use render::{render, RenderContext};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Result of one sync pass
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Remote state matches the graph
    Synced { operations: usize },
    /// The pass stopped at a failed call
    Retry { class: RetryClass, error: ClientError },
    /// The graph cannot be rendered; retrying will not help
    Abandoned(String),
}

/// SyncEngine owns the per-key serialization of REST passes.
///
/// Passes share `refresh`; a cache refresh takes it exclusively so that no
/// pass writes to the cache between an inventory read and its replacement.
/// Lock entries are dropped once their model key is fully torn down.
pub struct SyncEngine {
    store: Arc<ObjectGraphStore>,
    cache: Arc<RealizedStateCache>,
    client: Arc<dyn LoadBalancerClient>,
    context: RenderContext,
    timeout: Duration,
    metrics: SyncMetrics,
    locks: std::sync::Mutex<HashMap<ModelKey, Arc<Mutex<()>>>>,
    refresh: RwLock<()>,
}

impl SyncEngine {
    pub fn new(
        config: &ControllerConfig,
        store: Arc<ObjectGraphStore>,
        cache: Arc<RealizedStateCache>,
        client: Arc<dyn LoadBalancerClient>,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            store,
            cache,
            client,
            context: RenderContext {
                cluster: config.cluster_name.clone(),
                tenant: config.tenant.clone(),
                created_by: config.created_by(),
            },
            timeout: config.rest_timeout,
            metrics,
            locks: std::sync::Mutex::new(HashMap::new()),
            refresh: RwLock::new(()),
        }
    }

    pub fn client(&self) -> &Arc<dyn LoadBalancerClient> {
        &self.client
    }

    fn key_locks(&self) -> std::sync::MutexGuard<'_, HashMap<ModelKey, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key_lock(&self, key: &ModelKey) -> Arc<Mutex<()>> {
        Arc::clone(self.key_locks().entry(key.clone()).or_default())
    }

    /// Forget the lock of a torn-down key unless another pass holds or awaits it
    fn release_lock(&self, key: &ModelKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks();
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
            debug!("Released sync lock of {}", key);
        }
    }

    /// Number of model keys with a sync lock
    pub fn tracked_keys(&self) -> usize {
        self.key_locks().len()
    }

    /// Wait for running passes to finish and hold off new ones until the
    /// guard drops
    pub async fn pause(&self) -> RwLockWriteGuard<'_, ()> {
        self.refresh.write().await
    }

    /// Objects the current graph of `key` requires; none once the graph is gone
    pub async fn desired(&self, key: &ModelKey) -> Result<Vec<LbObject>> {
        match self.store.get(key).await {
            Some(graph) => render(&graph, &self.context),
            None => Ok(Vec::new()),
        }
    }

    /// Operations a pass would issue right now, computed locally
    pub async fn pending_operations(&self, key: &ModelKey) -> Result<Vec<Operation>> {
        let desired = self.desired(key).await?;
        let realized = self.cache.entries_for_model(key).await;
        Ok(plan(&desired, &realized))
    }

    /// Whether `key` differs from the realized state
    pub async fn needs_sync(&self, key: &ModelKey) -> bool {
        match self.pending_operations(key).await {
            Ok(operations) => !operations.is_empty(),
            Err(_) => true,
        }
    }

    /// First VIP of the parent virtual service realized for `key`
    pub async fn vip(&self, key: &ModelKey) -> Option<String> {
        self.cache
            .entries_for_model(key)
            .await
            .into_iter()
            .filter(|e| e.object_type == crate::client::ObjectType::VirtualService && !e.is_child_vs())
            .find_map(|e| e.vip)
    }

    /// Run one pass for `key`. Passes for the same key never overlap.
    pub async fn sync(&self, key: &ModelKey) -> SyncOutcome {
        let _refresh = self.refresh.read().await;
        let lock = self.key_lock(key);
        let (outcome, torn_down) = {
            let _guard = lock.lock().await;
            let _timer = self.metrics.sync_duration_seconds.start_timer();
            self.pass(key).await
        };
        if torn_down {
            self.release_lock(key, lock);
        }
        outcome
    }

    /// One pass under the key lock; the flag is set when `key` has neither a
    /// graph nor realized objects left
    async fn pass(&self, key: &ModelKey) -> (SyncOutcome, bool) {
        let desired = match self.desired(key).await {
            Ok(desired) => desired,
            Err(e) => {
                warn!("Cannot render {}: {}", key, e);
                return (SyncOutcome::Abandoned(e.to_string()), false);
            }
        };
        let realized = self.cache.entries_for_model(key).await;
        let operations = plan(&desired, &realized);
        if operations.is_empty() {
            debug!("{} already in sync", key);
            return (SyncOutcome::Synced { operations: 0 }, desired.is_empty() && realized.is_empty());
        }

        debug!("Syncing {}: {} operations", key, operations.len());
        for operation in &operations {
            if let Err(error) = self.apply(operation).await {
                let class = error.retry_class();
                warn!(
                    "Sync of {} stopped at {} {}: {} (retry {})",
                    key,
                    operation.method(),
                    operation.object_ref(),
                    error,
                    class
                );
                return (SyncOutcome::Retry { class, error }, false);
            }
        }

        // The model now owns exactly the desired set.
        let mut entries = Vec::with_capacity(desired.len());
        for object in &desired {
            match self.cache.get(&object.object_ref()).await {
                Some(entry) => entries.push(entry),
                None => {
                    let reason = format!("{} missing from cache after sync", object.object_ref());
                    return (SyncOutcome::Abandoned(reason), false);
                }
            }
        }
        self.cache.replace_model(key, entries).await;

        info!("Synced {} ({} operations)", key, operations.len());
        (SyncOutcome::Synced { operations: operations.len() }, desired.is_empty())
    }

    async fn call<T>(&self, future: impl Future<Output = std::result::Result<T, ClientError>>) -> std::result::Result<T, ClientError> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(format!("no response within {:?}", self.timeout))),
        }
    }

    fn record(&self, operation: &Operation, outcome: &str) {
        self.metrics
            .rest_operations_total
            .with_label_values(&[operation.object_ref().object_type.api_path(), operation.method(), outcome])
            .inc();
    }

    async fn apply(&self, operation: &Operation) -> std::result::Result<(), ClientError> {
        match operation {
            Operation::Create(object) => match self.call(self.client.create(object)).await {
                Ok(remote) => {
                    self.record(operation, "ok");
                    self.cache.put(realized_entry(object, remote)).await;
                    Ok(())
                }
                Err(ClientError::Conflict(message)) => {
                    self.record(operation, "conflict");
                    self.adopt(object).await?;
                    Err(ClientError::Conflict(message))
                }
                Err(e) => {
                    self.record(operation, "error");
                    Err(e)
                }
            },
            Operation::Update { uuid, object } => match self.call(self.client.update(uuid, object)).await {
                Ok(remote) => {
                    self.record(operation, "ok");
                    self.cache.put(realized_entry(object, remote)).await;
                    Ok(())
                }
                Err(ClientError::NotFound(message)) => {
                    self.record(operation, "not_found");
                    self.cache.delete(&object.object_ref()).await;
                    Err(ClientError::NotFound(message))
                }
                Err(e) => {
                    self.record(operation, "error");
                    Err(e)
                }
            },
            Operation::Delete(entry) => {
                match self.call(self.client.delete(entry.object_type, &entry.uuid)).await {
                    Ok(()) => self.record(operation, "ok"),
                    Err(ClientError::NotFound(_)) => {
                        self.record(operation, "not_found");
                        debug!("{} already gone", entry.object_ref());
                    }
                    Err(e) => {
                        self.record(operation, "error");
                        return Err(e);
                    }
                }
                self.cache.delete(&entry.object_ref()).await;
                Ok(())
            }
        }
    }

    /// Take over an object that already exists remotely under the desired
    /// name. It is cached without a checksum so the next pass rewrites it.
    async fn adopt(&self, object: &LbObject) -> std::result::Result<(), ClientError> {
        match self.call(self.client.get_by_name(object.object_type, &object.name)).await? {
            Some(remote) => {
                info!("Adopting existing {} ({})", object.object_ref(), remote.uuid);
                let mut entry = realized_entry(object, remote);
                entry.checksum = None;
                self.cache.put(entry).await;
            }
            None => debug!("{} conflicted but could not be found", object.object_ref()),
        }
        Ok(())
    }
}

fn realized_entry(object: &LbObject, remote: RemoteObject) -> CacheEntry {
    CacheEntry {
        object_type: object.object_type,
        name: object.name.clone(),
        uuid: remote.uuid,
        checksum: Some(object.checksum.clone()),
        model_key: Some(object.model_key.clone()),
        references: object.references.clone(),
        vip: remote.vip,
    }
}
