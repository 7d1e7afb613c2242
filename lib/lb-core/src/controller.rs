//! Controller: wires the stores, queues and engines together and exposes
//! the surface the bootstrap binary drives

use crate::cache::{CacheEntry, RealizedStateCache};
use crate::client::LoadBalancerClient;
use crate::config::ControllerConfig;
use crate::dispatcher::{Dispatcher, Queues};
use crate::error::{CoreError, Result};
use crate::graph::validate::is_claimed;
use crate::graph::{GraphBuilder, ObjectGraphStore};
use crate::index::ClusterIndex;
use crate::key::{IngestionKey, ModelKey, ObjectName, ResourceKind};
use crate::ledger::ResourceVersionLedger;
use crate::metrics::SyncMetrics;
use crate::resource::{Change, Resource, WatchEvent};
use crate::retry::{RetryClass, RetryScheduler};
use crate::source::ClusterApi;
use crate::status::{StatusPublisher, StatusUpdate, CONDITION_PROGRAMMED};
use crate::sync::{SyncEngine, SyncOutcome};
use lb_api::Condition;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, trace, warn};

struct Inner {
    config: ControllerConfig,
    api: Arc<dyn ClusterApi>,
    queues: Queues,
    index: Arc<ClusterIndex>,
    ledger: Arc<ResourceVersionLedger>,
    store: Arc<ObjectGraphStore>,
    cache: Arc<RealizedStateCache>,
    builder: GraphBuilder,
    sync: SyncEngine,
    status: StatusPublisher,
    retry: RetryScheduler,
    metrics: SyncMetrics,
    sync_disabled: AtomicBool,
    ready: AtomicBool,
    stopping: watch::Sender<bool>,
    dispatcher: Mutex<Dispatcher>,
    full_sync_lock: Mutex<()>,
}

/// Controller is cheap to clone; clones share one pipeline
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        api: Arc<dyn ClusterApi>,
        client: Arc<dyn LoadBalancerClient>,
    ) -> Result<Self> {
        let metrics = SyncMetrics::new()?;
        let queues = Queues::new();
        let index = Arc::new(ClusterIndex::new());
        let ledger = Arc::new(ResourceVersionLedger::new());
        let store = Arc::new(ObjectGraphStore::new());
        let cache = Arc::new(RealizedStateCache::new());

        let status = StatusPublisher::new(
            Arc::clone(&queues.status),
            Arc::clone(&api),
            Arc::clone(&index),
            config.controller_name.clone(),
        );
        let builder = GraphBuilder::new(
            &config,
            Arc::clone(&index),
            Arc::clone(&ledger),
            Arc::clone(&store),
            status.clone(),
            Arc::clone(&queues.graph),
            metrics.clone(),
        );
        let sync = SyncEngine::new(&config, Arc::clone(&store), Arc::clone(&cache), client, metrics.clone());
        let retry = RetryScheduler::new(
            &config,
            Arc::clone(&queues.fast_retry),
            Arc::clone(&queues.slow_retry),
            metrics.clone(),
        );
        let (stopping, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                api,
                queues,
                index,
                ledger,
                store,
                cache,
                builder,
                sync,
                status,
                retry,
                metrics,
                sync_disabled: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                stopping,
                dispatcher: Mutex::new(Dispatcher::new()),
                full_sync_lock: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.inner.metrics
    }

    pub fn queues(&self) -> &Queues {
        &self.inner.queues
    }

    pub fn store(&self) -> &Arc<ObjectGraphStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<RealizedStateCache> {
        &self.inner.cache
    }

    pub fn is_sync_disabled(&self) -> bool {
        self.inner.sync_disabled.load(Ordering::SeqCst)
    }

    /// Bootstrap finished and processing is still enabled
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst) && !self.is_sync_disabled()
    }

    /// Everything that has to happen before the queues start: controller
    /// health, cache seeding, optional teardown, stale cleanup and the
    /// first full sync.
    pub async fn bootstrap(&self) -> Result<()> {
        self.inner.bootstrap().await
    }

    /// Spawn the worker pools and the periodic resync. Work stops being
    /// handed out once `stop` turns true.
    pub async fn start(&self, mut stop: watch::Receiver<bool>) {
        let inner = &self.inner;
        let config = &inner.config;
        let mut dispatcher = inner.dispatcher.lock().await;

        let worker = Arc::clone(inner);
        dispatcher.spawn_pool(Arc::clone(&inner.queues.ingestion), 1, move |key| {
            let inner = Arc::clone(&worker);
            async move { inner.process_ingestion(key).await }
        });
        let worker = Arc::clone(inner);
        dispatcher.spawn_pool(Arc::clone(&inner.queues.graph), config.graph_workers, move |key| {
            let inner = Arc::clone(&worker);
            async move { inner.process_model(key).await }
        });
        let worker = Arc::clone(inner);
        dispatcher.spawn_pool(Arc::clone(&inner.queues.fast_retry), 1, move |key| {
            let inner = Arc::clone(&worker);
            async move { inner.process_retry(key, RetryClass::Fast).await }
        });
        let worker = Arc::clone(inner);
        dispatcher.spawn_pool(Arc::clone(&inner.queues.slow_retry), 1, move |key| {
            let inner = Arc::clone(&worker);
            async move { inner.process_retry(key, RetryClass::Slow).await }
        });
        let worker = Arc::clone(inner);
        dispatcher.spawn_pool(Arc::clone(&inner.queues.status), config.status_workers, move |target| {
            let inner = Arc::clone(&worker);
            async move {
                if !inner.is_disabled() {
                    inner.status.process(&target).await;
                }
            }
        });

        if let Some(interval) = config.full_sync_interval {
            let timer = Arc::clone(inner);
            let mut stopping = inner.stopping.subscribe();
            dispatcher.spawn(async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => timer.periodic_resync().await,
                        _ = stopping.changed() => break,
                    }
                }
                debug!("Full sync timer stopped");
            });
        }

        let watcher = Arc::clone(inner);
        dispatcher.spawn(async move {
            let mut stopping = watcher.stopping.subscribe();
            tokio::select! {
                _ = wait_for_stop(&mut stop) => watcher.stop(),
                _ = stopping.changed() => {}
            }
        });

        info!(
            graph_workers = config.graph_workers,
            status_workers = config.status_workers,
            "Controller started"
        );
    }

    /// Feed one watch notification into the pipeline
    pub async fn handle_event(&self, event: WatchEvent) {
        self.inner.handle_event(event).await
    }

    pub fn enqueue_ingestion(&self, key: IngestionKey) {
        if !self.is_sync_disabled() {
            self.inner.queues.ingestion.add(key);
        }
    }

    /// List every kind, rebuild every graph and, with `push`, queue every
    /// model key whose realized state differs
    pub async fn run_full_sync(&self, push: bool) -> Result<()> {
        self.inner.run_full_sync(push).await
    }

    /// Stop the queues and wait for in-flight work. Returns false if the
    /// workers did not finish within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.stop();
        let drained = self.inner.dispatcher.lock().await.drained(timeout).await;
        if drained {
            info!("Controller drained");
        } else {
            warn!("Controller shutdown timed out after {:?}", timeout);
        }
        drained
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

impl Inner {
    fn is_disabled(&self) -> bool {
        self.sync_disabled.load(Ordering::SeqCst)
    }

    fn disable_sync(&self, reason: &str) {
        if !self.sync_disabled.swap(true, Ordering::SeqCst) {
            error!("Disabling sync: {}", reason);
        }
    }

    fn stop(&self) {
        self.queues.shut_down_all();
        self.stopping.send_replace(true);
    }

    async fn bootstrap(&self) -> Result<()> {
        let client = self.sync.client();
        match client.cluster_active().await {
            Ok(true) => {}
            Ok(false) => return Err(CoreError::Fatal("load balancer controller cluster is not active".into())),
            Err(e) => return Err(CoreError::Fatal(format!("load balancer controller unreachable: {}", e))),
        }

        if let Err(e) = self.refresh_cache().await {
            self.disable_sync(&format!("inventory read failed: {}", e));
        }

        if self.config.delete_config {
            self.teardown_all().await;
            self.disable_sync("configuration deleted on request");
            return Ok(());
        }

        if !self.is_disabled() {
            self.remove_stale().await?;
        }

        self.run_full_sync(true)
            .await
            .map_err(|e| CoreError::Fatal(format!("initial full sync failed: {}", e)))?;

        self.ready.store(true, Ordering::SeqCst);
        info!("Bootstrap complete: {} graphs, {} cached objects", self.store.keys().await.len(), self.cache.len().await);
        Ok(())
    }

    /// Replace the cache with this cluster's objects from the inventory.
    /// Sync passes are held off from the read until the replacement.
    async fn refresh_cache(&self) -> Result<()> {
        let _paused = self.sync.pause().await;
        let prefix = format!("{}/{}--", self.config.tenant, self.config.cluster_name);
        let entries: Vec<CacheEntry> = self
            .sync
            .client()
            .inventory()
            .await?
            .into_iter()
            .filter(|o| o.model_key.as_ref().map_or(false, |k| k.as_str().starts_with(&prefix)))
            .filter_map(CacheEntry::from_remote)
            .collect();
        info!("Seeded cache with {} objects", entries.len());
        self.cache.replace_all(entries).await;
        Ok(())
    }

    async fn teardown_all(&self) {
        for key in self.cache.model_keys().await {
            match self.sync.sync(&key).await {
                SyncOutcome::Synced { operations } => info!("Deleted {} ({} objects)", key, operations),
                outcome => warn!("Teardown of {} incomplete: {:?}", key, outcome),
            }
        }
    }

    /// Delete cached models whose Gateway vanished while the controller was
    /// not running, before anything new is built
    async fn remove_stale(&self) -> Result<()> {
        let classes = self.list(ResourceKind::GatewayClass).await?;
        let gateways = self.list(ResourceKind::Gateway).await?;

        let claimed: BTreeSet<String> = classes
            .iter()
            .filter_map(|r| match r {
                Resource::GatewayClass(class) if is_claimed(class, &self.config.controller_name) => {
                    class.metadata.name.clone()
                }
                _ => None,
            })
            .collect();
        let live: BTreeSet<ModelKey> = gateways
            .iter()
            .filter_map(|r| match r {
                Resource::Gateway(gw) if claimed.contains(&gw.spec.gateway_class_name) => {
                    let key = r.key();
                    Some(self.builder.model_key(&ObjectName::new(key.namespace(), key.name())))
                }
                _ => None,
            })
            .collect();

        for key in self.cache.model_keys().await.difference(&live) {
            info!("Removing stale model {}", key);
            if let SyncOutcome::Retry { class, .. } = self.sync.sync(key).await {
                self.retry.schedule(key, class);
            }
        }
        Ok(())
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>> {
        match self.api.list(kind).await {
            Ok(resources) => Ok(resources),
            Err(e) => {
                self.disable_sync(&e.to_string());
                Err(e.into())
            }
        }
    }

    async fn run_full_sync(&self, push: bool) -> Result<()> {
        if self.is_disabled() {
            return Err(CoreError::Fatal("sync is disabled".into()));
        }
        let _guard = self.full_sync_lock.lock().await;
        info!(push, "Starting full sync");

        let mut listed = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            match self.list(kind).await {
                Ok(resources) => listed.push((kind, resources)),
                Err(e) => {
                    self.metrics.full_syncs_total.with_label_values(&["failed"]).inc();
                    return Err(e);
                }
            }
        }

        let mut roots = Vec::new();
        for (kind, resources) in listed {
            for resource in &resources {
                if let Some(version) = resource.version() {
                    self.ledger.save(&resource.key(), &version).await;
                }
                if matches!(kind, ResourceKind::GatewayClass | ResourceKind::Gateway) {
                    roots.push(resource.key());
                }
            }
            self.index.replace_kind(kind, resources).await;
        }

        for key in &roots {
            if let Err(e) = self.builder.process(key, true).await {
                warn!("Full sync could not build {}: {}", key, e);
            }
        }
        let live: BTreeSet<ModelKey> = self
            .builder
            .owned_gateways()
            .await
            .iter()
            .map(|gw| self.builder.model_key(gw))
            .collect();
        self.builder.prune(&live).await;

        if push {
            let graphs = self.store.keys().await;
            let cached = self.cache.model_keys().await;
            let mut published = 0;
            for key in graphs.symmetric_difference(&cached) {
                self.queues.graph.add(key.clone());
                published += 1;
            }
            for key in graphs.intersection(&cached) {
                if self.sync.needs_sync(key).await {
                    debug!("Drift detected for {}", key);
                    self.queues.graph.add(key.clone());
                    published += 1;
                }
            }
            info!("Full sync published {} model keys", published);
        }

        self.metrics.full_syncs_total.with_label_values(&["ok"]).inc();
        Ok(())
    }

    async fn periodic_resync(&self) {
        if self.is_disabled() {
            return;
        }
        if let Err(e) = self.refresh_cache().await {
            warn!("Skipping periodic full sync, inventory read failed: {}", e);
            return;
        }
        self.retry.reset_all();
        if let Err(e) = self.run_full_sync(true).await {
            error!("Periodic full sync failed: {}", e);
        }
    }

    async fn handle_event(&self, event: WatchEvent) {
        if self.is_disabled() {
            return;
        }
        let WatchEvent { key, version, change } = event;
        match change {
            Change::Applied(resource) => {
                if self.ledger.is_unchanged(&key, version.as_deref()).await {
                    trace!("{} unchanged at {:?}", key, version);
                    return;
                }
                self.index.apply(resource).await;
            }
            Change::Deleted => {
                self.index.remove(&key).await;
            }
        }
        self.queues.ingestion.add(key);
    }

    async fn process_ingestion(&self, key: IngestionKey) {
        if self.is_disabled() {
            return;
        }
        if let Err(e) = self.builder.process(&key, false).await {
            error!("Failed to process {}: {}", key, e);
        }
    }

    async fn process_retry(&self, key: ModelKey, class: RetryClass) {
        if !self.retry.claim(&key, class) {
            trace!("{} no longer scheduled for {} retry", key, class);
            return;
        }
        self.process_model(key).await
    }

    async fn process_model(&self, key: ModelKey) {
        if self.is_disabled() {
            return;
        }
        match self.sync.sync(&key).await {
            SyncOutcome::Synced { .. } => {
                self.retry.reset(&key);
                let addresses = self.sync.vip(&key).await.map(|vip| vec![vip]);
                self.publish_programmed(&key, Ok(()), addresses).await;
            }
            SyncOutcome::Retry { class, error } => {
                let class = self.retry.schedule(&key, class);
                if class == RetryClass::Slow {
                    self.publish_programmed(&key, Err(error.to_string()), None).await;
                }
            }
            SyncOutcome::Abandoned(reason) => {
                error!(model = %key, "Abandoning sync pass: {}", reason);
            }
        }
    }

    async fn publish_programmed(
        &self,
        key: &ModelKey,
        outcome: std::result::Result<(), String>,
        addresses: Option<Vec<String>>,
    ) {
        let Some(graph) = self.store.get(key).await else {
            return;
        };
        let generation = self.index.read().await.gateway(&graph.gateway).and_then(|gw| gw.metadata.generation);
        let condition = match outcome {
            Ok(()) => Condition::new(CONDITION_PROGRAMMED, true, "Programmed", "", generation),
            Err(message) => Condition::new(CONDITION_PROGRAMMED, false, "Pending", message, generation),
        };
        self.status
            .publish(StatusUpdate::Gateway {
                gateway: graph.gateway.clone(),
                conditions: vec![condition],
                listeners: None,
                addresses,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, ObjectRef, ObjectType, RemoteObject};
    use crate::status::{StatusTarget, CONDITION_ACCEPTED};
    use crate::test_utils::{fixtures, FakeClusterApi, FakeLoadBalancer};

    struct Setup {
        controller: Controller,
        api: Arc<FakeClusterApi>,
        lb: Arc<FakeLoadBalancer>,
    }

    fn config() -> ControllerConfig {
        ControllerConfig {
            cluster_name: "c1".to_string(),
            controller_name: "example.com/lb".to_string(),
            fast_retry_interval: Duration::from_secs(1),
            slow_retry_interval: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn setup_with(config: ControllerConfig) -> Setup {
        let api = Arc::new(FakeClusterApi::new());
        let lb = Arc::new(FakeLoadBalancer::new());
        let controller = Controller::new(config, api.clone(), lb.clone()).unwrap();
        Setup { controller, api, lb }
    }

    fn setup() -> Setup {
        setup_with(config())
    }

    fn seed(api: &FakeClusterApi, gateway: &str) {
        api.put(fixtures::gateway_class("lb", "example.com/lb"));
        api.put(fixtures::gateway("default", gateway, "lb", vec![fixtures::listener("http", 80, None)]));
        api.put(fixtures::service("default", "svc", 8080));
        api.put(fixtures::endpoints("default", "svc", &["10.0.0.1"], 8080));
        api.put(fixtures::http_route(
            "default",
            "r",
            &[gateway],
            &["foo.com"],
            vec![fixtures::rule(&["/"], vec![fixtures::backend("svc", 8080)])],
        ));
    }

    fn model_key(gateway: &str) -> ModelKey {
        ModelKey::for_gateway("admin", "c1", &ObjectName::new("default", gateway))
    }

    /// Run queued graph keys inline until the queue is empty
    async fn drain_graph(controller: &Controller) {
        let queue = Arc::clone(&controller.queues().graph);
        while !queue.is_empty() {
            if let Some(key) = queue.get().await {
                controller.inner.process_model(key.clone()).await;
                queue.done(&key);
            }
        }
    }

    async fn drain_ingestion(controller: &Controller) {
        let queue = Arc::clone(&controller.queues().ingestion);
        while !queue.is_empty() {
            if let Some(key) = queue.get().await {
                controller.inner.process_ingestion(key.clone()).await;
                queue.done(&key);
            }
        }
    }

    fn orphan(name: &str, model: &str) -> RemoteObject {
        RemoteObject {
            object_type: Some(ObjectType::VirtualService),
            name: name.to_string(),
            uuid: format!("{}-uuid", name),
            checksum: Some("old".to_string()),
            model_key: Some(ModelKey::from(model)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_requires_active_cluster() {
        let s = setup();
        s.lb.set_active(false);
        assert!(matches!(s.controller.bootstrap().await, Err(CoreError::Fatal(_))));
        assert!(!s.controller.is_ready());
    }

    #[tokio::test]
    async fn test_bootstrap_publishes_and_syncs_new_gateway() {
        let s = setup();
        seed(&s.api, "gw");

        s.controller.bootstrap().await.unwrap();
        assert!(s.controller.is_ready());
        assert!(s.controller.queues().graph.is_pending(&model_key("gw")));
        assert!(s.lb.objects().is_empty());

        drain_graph(&s.controller).await;
        assert_eq!(s.lb.objects().len(), 4);
        assert_eq!(s.controller.cache().entries_for_model(&model_key("gw")).await.len(), 4);

        let pending = s
            .controller
            .inner
            .status
            .pending(&StatusTarget::Gateway(ObjectName::new("default", "gw")))
            .await
            .unwrap();
        assert!(pending.condition(CONDITION_ACCEPTED).unwrap().is_true());
        assert!(pending.condition(CONDITION_PROGRAMMED).unwrap().is_true());
        assert_eq!(pending.addresses.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_bootstrap_removes_stale_models_before_building() {
        let s = setup();
        seed(&s.api, "gw");
        s.lb.insert(orphan("c1--default-gone-EVH", "admin/c1--default-gone"));
        s.lb.insert(orphan("other--default-x-EVH", "admin/other--default-x"));

        s.controller.bootstrap().await.unwrap();

        let calls = s.lb.calls();
        assert_eq!(
            calls,
            vec![("delete", ObjectRef::new(ObjectType::VirtualService, "c1--default-gone-EVH"))]
        );
        let names: Vec<String> = s.lb.objects().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["other--default-x-EVH".to_string()]);
    }

    #[tokio::test]
    async fn test_full_sync_tears_down_deleted_gateway_and_heals_drift() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();
        drain_graph(&s.controller).await;

        // A gateway deleted while no event arrived.
        s.api.delete(&IngestionKey::new(ResourceKind::Gateway, "default", "gw"));
        s.controller.run_full_sync(true).await.unwrap();
        assert!(s.controller.store().get(&model_key("gw")).await.is_none());
        assert!(s.controller.queues().graph.is_pending(&model_key("gw")));

        drain_graph(&s.controller).await;
        assert!(s.lb.objects().is_empty());
        assert!(s.controller.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_full_sync_publishes_drifted_keys_only() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();
        drain_graph(&s.controller).await;

        s.controller.run_full_sync(true).await.unwrap();
        assert!(s.controller.queues().graph.is_empty());

        s.api.put(fixtures::endpoints("default", "svc", &["10.0.0.9"], 8080));
        s.controller.run_full_sync(true).await.unwrap();
        assert!(s.controller.queues().graph.is_pending(&model_key("gw")));
    }

    #[tokio::test]
    async fn test_list_failure_fails_closed() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();

        s.api.fail_lists(true);
        assert!(s.controller.run_full_sync(true).await.is_err());
        assert!(s.controller.is_sync_disabled());
        assert!(!s.controller.is_ready());

        s.controller
            .handle_event(WatchEvent::applied(fixtures::gateway("default", "gw2", "lb", vec![])))
            .await;
        assert!(s.controller.queues().ingestion.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_failure_disables_sync() {
        let s = setup();
        seed(&s.api, "gw");
        s.lb.fail_inventory(Some(ClientError::Connection("refused".into())));

        assert!(s.controller.bootstrap().await.is_err());
        assert!(s.controller.is_sync_disabled());
        assert!(s.lb.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_config_tears_everything_down() {
        let s = setup_with(ControllerConfig { delete_config: true, ..config() });
        seed(&s.api, "gw");
        s.lb.insert(orphan("c1--default-gw-EVH", "admin/c1--default-gw"));

        s.controller.bootstrap().await.unwrap();
        assert!(s.lb.objects().is_empty());
        assert!(s.controller.is_sync_disabled());
        assert!(s.controller.store().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_events_are_dropped() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();

        // Initial listing replayed by the watch stream.
        let gw = fixtures::gateway("default", "gw", "lb", vec![fixtures::listener("http", 80, None)]);
        s.controller.handle_event(WatchEvent::applied(gw.clone())).await;
        assert!(s.controller.queues().ingestion.is_empty());

        let mut changed = gw;
        changed.metadata.resource_version = Some("2".to_string());
        changed.spec.listeners.push(fixtures::listener("alt", 8080, None));
        s.controller.handle_event(WatchEvent::applied(changed)).await;
        assert_eq!(s.controller.queues().ingestion.len(), 1);

        drain_ingestion(&s.controller).await;
        assert!(s.controller.queues().graph.is_pending(&model_key("gw")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_route_to_retry_classes() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();
        let key = model_key("gw");

        s.lb.fail_next("create", ObjectType::Pool, ClientError::Connection("reset".into()));
        drain_graph(&s.controller).await;
        assert_eq!(s.controller.inner.retry.entry(&key).unwrap().class, RetryClass::Fast);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(s.controller.queues().fast_retry.is_pending(&key));

        s.lb.fail_next("create", ObjectType::Pool, ClientError::Rejected { status: 429, message: "quota".into() });
        s.controller.inner.process_retry(key.clone(), RetryClass::Fast).await;
        assert_eq!(s.controller.inner.retry.entry(&key).unwrap().class, RetryClass::Slow);
        assert!(!s.controller.queues().fast_retry.is_pending(&key));

        let pending = s
            .controller
            .inner
            .status
            .pending(&StatusTarget::Gateway(ObjectName::new("default", "gw")))
            .await
            .unwrap();
        let programmed = pending.condition(CONDITION_PROGRAMMED).unwrap();
        assert!(!programmed.is_true());
        assert_eq!(programmed.reason, "Pending");

        // A stale fast-queue entry is ignored once the key moved to slow.
        s.controller.inner.process_retry(key.clone(), RetryClass::Fast).await;
        assert!(s.lb.objects().is_empty());

        s.controller.inner.process_retry(key.clone(), RetryClass::Slow).await;
        assert_eq!(s.lb.objects().len(), 4);
        assert!(s.controller.inner.retry.entry(&key).is_none());
    }

    #[tokio::test]
    async fn test_full_sync_racing_gateway_deletion_converges() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();
        drain_graph(&s.controller).await;

        let gw_key = IngestionKey::new(ResourceKind::Gateway, "default", "gw");
        s.api.delete(&gw_key);
        let controller = s.controller.clone();
        let deletion = async {
            controller.handle_event(WatchEvent::deleted(gw_key.clone())).await;
            drain_ingestion(&controller).await;
            drain_graph(&controller).await;
        };
        let (full_sync, ()) = tokio::join!(s.controller.run_full_sync(true), deletion);
        full_sync.unwrap();
        drain_graph(&s.controller).await;

        assert!(s.lb.objects().is_empty());
        assert!(s.controller.cache().is_empty().await);
        assert!(s.controller.store().keys().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_refresh_does_not_lose_concurrent_sync() {
        let s = setup();
        seed(&s.api, "gw");
        s.controller.bootstrap().await.unwrap();
        let key = model_key("gw");

        // The inventory snapshot is empty and arrives after the sync starts.
        s.lb.set_inventory_delay(Duration::from_secs(1));
        let sync = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drain_graph(&s.controller).await;
        };
        let (refreshed, ()) = tokio::join!(s.controller.inner.refresh_cache(), sync);
        refreshed.unwrap();

        assert_eq!(s.lb.objects().len(), 4);
        assert_eq!(s.controller.cache().entries_for_model(&key).await.len(), 4);
        assert!(!s.controller.inner.sync.needs_sync(&key).await);

        s.lb.clear_calls();
        s.controller.run_full_sync(true).await.unwrap();
        assert!(s.controller.queues().graph.is_empty());
        assert!(s.lb.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_processes_events_and_shuts_down() {
        let s = setup();
        s.api.put(fixtures::gateway_class("lb", "example.com/lb"));
        s.controller.bootstrap().await.unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        s.controller.start(stop_rx).await;

        let gw = fixtures::gateway("default", "gw", "lb", vec![fixtures::listener("http", 80, None)]);
        s.controller.handle_event(WatchEvent::applied(gw)).await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while s.lb.objects().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(s.lb.objects().len(), 1);

        stop_tx.send(true).unwrap();
        assert!(s.controller.shutdown(Duration::from_secs(5)).await);
    }
}
