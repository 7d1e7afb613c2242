//! Shared fixtures and in-memory collaborators for unit tests

#![allow(dead_code)]

use crate::cache::RealizedStateCache;
use crate::client::{ClientError, LbObject, LoadBalancerClient, ObjectRef, ObjectType, RemoteObject};
use crate::config::ControllerConfig;
use crate::graph::{GraphBuilder, ObjectGraph, ObjectGraphStore};
use crate::index::ClusterIndex;
use crate::key::{ModelKey, ObjectName, ResourceKind};
use crate::ledger::ResourceVersionLedger;
use crate::metrics::SyncMetrics;
use crate::queue::WorkQueue;
use crate::resource::Resource;
use crate::source::{ClusterApi, SourceError};
use crate::status::{StatusPublisher, StatusTarget};
use crate::sync::SyncEngine;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub mod fixtures {
    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Secret, Service, ServicePort, ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use k8s_openapi::ByteString;
    use lb_api::v1::gateway::{GatewaySpec, GatewayTlsConfig, Listener, SecretObjectReference};
    use lb_api::v1::gateway_class::GatewayClassSpec;
    use lb_api::v1::http_route::{
        HTTPBackendRef, HTTPHeader, HTTPHeaderFilter, HTTPPathMatch, HTTPRequestRedirectFilter, HTTPRouteFilter,
        HTTPRouteMatch, HTTPRouteRule, HTTPRouteSpec, ParentReference,
    };
    use lb_api::{Gateway, GatewayClass, HTTPRoute};
    use std::collections::BTreeMap;

    fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            generation: Some(1),
            resource_version: Some("1".to_string()),
            ..Default::default()
        }
    }

    pub fn gateway_class(name: &str, controller: &str) -> GatewayClass {
        GatewayClass {
            metadata: meta(None, name),
            spec: GatewayClassSpec { controller_name: controller.to_string(), description: None },
            status: None,
        }
    }

    pub fn gateway(namespace: &str, name: &str, class: &str, listeners: Vec<Listener>) -> Gateway {
        Gateway {
            metadata: meta(Some(namespace), name),
            spec: GatewaySpec { gateway_class_name: class.to_string(), listeners, addresses: vec![] },
            status: None,
        }
    }

    pub fn listener(name: &str, port: u16, hostname: Option<&str>) -> Listener {
        Listener {
            name: name.to_string(),
            hostname: hostname.map(str::to_string),
            port,
            protocol: "HTTP".to_string(),
            tls: None,
        }
    }

    pub fn https_listener(name: &str, port: u16, hostname: Option<&str>, secret: &str) -> Listener {
        Listener {
            protocol: "HTTPS".to_string(),
            tls: Some(GatewayTlsConfig {
                mode: Some("Terminate".to_string()),
                certificate_refs: vec![SecretObjectReference { name: secret.to_string(), ..Default::default() }],
            }),
            ..listener(name, port, hostname)
        }
    }

    pub fn http_route(
        namespace: &str,
        name: &str,
        parents: &[&str],
        hostnames: &[&str],
        rules: Vec<HTTPRouteRule>,
    ) -> HTTPRoute {
        HTTPRoute {
            metadata: meta(Some(namespace), name),
            spec: HTTPRouteSpec {
                parent_refs: parents
                    .iter()
                    .map(|p| ParentReference { name: p.to_string(), ..Default::default() })
                    .collect(),
                hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
                rules,
            },
            status: None,
        }
    }

    pub fn rule(paths: &[&str], backends: Vec<HTTPBackendRef>) -> HTTPRouteRule {
        HTTPRouteRule {
            matches: paths
                .iter()
                .map(|p| HTTPRouteMatch {
                    path: Some(HTTPPathMatch {
                        type_: Some("PathPrefix".to_string()),
                        value: Some(p.to_string()),
                    }),
                    ..Default::default()
                })
                .collect(),
            filters: vec![],
            backend_refs: backends,
        }
    }

    pub fn backend(name: &str, port: u16) -> HTTPBackendRef {
        HTTPBackendRef { name: name.to_string(), port: Some(port), ..Default::default() }
    }

    fn headers(pairs: &[(&str, &str)]) -> Vec<HTTPHeader> {
        pairs
            .iter()
            .map(|(name, value)| HTTPHeader { name: name.to_string(), value: value.to_string() })
            .collect()
    }

    pub fn request_header_filter(add: &[(&str, &str)], set: &[(&str, &str)], remove: &[&str]) -> HTTPRouteFilter {
        HTTPRouteFilter {
            type_: "RequestHeaderModifier".to_string(),
            request_header_modifier: Some(HTTPHeaderFilter {
                set: headers(set),
                add: headers(add),
                remove: remove.iter().map(|r| r.to_string()).collect(),
            }),
            ..Default::default()
        }
    }

    pub fn redirect_filter(hostname: &str, status_code: u16) -> HTTPRouteFilter {
        HTTPRouteFilter {
            type_: "RequestRedirect".to_string(),
            request_redirect: Some(HTTPRequestRedirectFilter {
                hostname: Some(hostname.to_string()),
                status_code: Some(status_code),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn service(namespace: &str, name: &str, port: u16) -> Service {
        Service {
            metadata: meta(Some(namespace), name),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: i32::from(port),
                    target_port: Some(IntOrString::Int(i32::from(port))),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    pub fn endpoints(namespace: &str, name: &str, ips: &[&str], port: u16) -> Endpoints {
        Endpoints {
            metadata: meta(Some(namespace), name),
            subsets: Some(vec![EndpointSubset {
                addresses: Some(
                    ips.iter()
                        .map(|ip| EndpointAddress { ip: ip.to_string(), ..Default::default() })
                        .collect(),
                ),
                ports: Some(vec![EndpointPort { port: i32::from(port), ..Default::default() }]),
                ..Default::default()
            }]),
        }
    }

    pub fn secret(namespace: &str, name: &str) -> Secret {
        let mut data = BTreeMap::new();
        data.insert("tls.crt".to_string(), ByteString(b"CERT".to_vec()));
        data.insert("tls.key".to_string(), ByteString(b"KEY".to_vec()));
        Secret {
            metadata: meta(Some(namespace), name),
            data: Some(data),
            type_: Some("kubernetes.io/tls".to_string()),
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct FakeClusterState {
    objects: HashMap<ResourceKind, Vec<Resource>>,
    statuses: Vec<(StatusTarget, serde_json::Value)>,
    fail_status_updates: bool,
    fail_lists: bool,
}

/// In-memory cluster API recording status writes
#[derive(Default)]
pub struct FakeClusterApi {
    state: Mutex<FakeClusterState>,
}

impl FakeClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeClusterState> {
        self.state.lock().unwrap()
    }

    /// Make `resource` part of the next list of its kind, replacing any
    /// object with the same key
    pub fn put(&self, resource: impl Into<Resource>) {
        let resource = resource.into();
        let mut state = self.state();
        let objects = state.objects.entry(resource.kind()).or_default();
        objects.retain(|r| r.key() != resource.key());
        objects.push(resource);
    }

    pub fn delete(&self, key: &crate::key::IngestionKey) {
        if let Some(objects) = self.state().objects.get_mut(&key.kind) {
            objects.retain(|r| &r.key() != key);
        }
    }

    pub fn statuses(&self) -> Vec<(StatusTarget, serde_json::Value)> {
        self.state().statuses.clone()
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.state().fail_status_updates = fail;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.state().fail_lists = fail;
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, SourceError> {
        let state = self.state();
        if state.fail_lists {
            return Err(SourceError::List { kind, message: "injected failure".to_string() });
        }
        Ok(state.objects.get(&kind).cloned().unwrap_or_default())
    }

    async fn update_status(&self, target: &StatusTarget, status: serde_json::Value) -> Result<(), SourceError> {
        let mut state = self.state();
        if state.fail_status_updates {
            return Err(SourceError::Status { target: target.to_string(), message: "injected failure".to_string() });
        }
        state.statuses.push((target.clone(), status));
        Ok(())
    }
}

struct InjectedFailure {
    method: &'static str,
    object_type: ObjectType,
    error: ClientError,
    once: bool,
}

#[derive(Default)]
struct FakeLbState {
    objects: BTreeMap<ObjectRef, RemoteObject>,
    calls: Vec<(&'static str, ObjectRef)>,
    failures: Vec<InjectedFailure>,
    inventory_error: Option<ClientError>,
    inactive: bool,
    next_uuid: u64,
}

/// In-memory load balancer recording every mutating call
#[derive(Default)]
pub struct FakeLoadBalancer {
    state: Mutex<FakeLbState>,
    delay: Mutex<Option<Duration>>,
    inventory_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeLbState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<(&'static str, ObjectRef)> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn objects(&self) -> Vec<RemoteObject> {
        self.state().objects.values().cloned().collect()
    }

    pub fn object(&self, object: &ObjectRef) -> Option<RemoteObject> {
        self.state().objects.get(object).cloned()
    }

    /// Seed an object that exists before the controller starts
    pub fn insert(&self, remote: RemoteObject) {
        let object_type = remote.object_type.unwrap_or(ObjectType::VirtualService);
        self.state().objects.insert(ObjectRef::new(object_type, remote.name.clone()), remote);
    }

    /// Delete an object behind the controller's back
    pub fn remove(&self, object: &ObjectRef) {
        self.state().objects.remove(object);
    }

    pub fn fail_next(&self, method: &'static str, object_type: ObjectType, error: ClientError) {
        self.state().failures.push(InjectedFailure { method, object_type, error, once: true });
    }

    pub fn fail_always(&self, method: &'static str, object_type: ObjectType, error: ClientError) {
        self.state().failures.push(InjectedFailure { method, object_type, error, once: false });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn fail_inventory(&self, error: Option<ClientError>) {
        self.state().inventory_error = error;
    }

    pub fn set_active(&self, active: bool) {
        self.state().inactive = !active;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Hold inventory responses for `delay` after the snapshot is taken
    pub fn set_inventory_delay(&self, delay: Duration) {
        *self.inventory_delay.lock().unwrap() = Some(delay);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, method: &'static str, object: ObjectRef) -> Result<(), ClientError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state();
        state.calls.push((method, object.clone()));
        let position = state
            .failures
            .iter()
            .position(|f| f.method == method && f.object_type == object.object_type);
        match position {
            Some(i) if state.failures[i].once => Err(state.failures.remove(i).error),
            Some(i) => Err(state.failures[i].error.clone()),
            None => Ok(()),
        }
    }

    fn remote(&self, state: &mut FakeLbState, object: &LbObject, uuid: String) -> RemoteObject {
        let vip = (object.object_type == ObjectType::VirtualService && !object.is_child_vs())
            .then(|| format!("10.10.0.{}", state.next_uuid % 250 + 1));
        RemoteObject {
            object_type: Some(object.object_type),
            name: object.name.clone(),
            uuid,
            checksum: Some(object.checksum.clone()),
            model_key: Some(object.model_key.clone()),
            references: object.references.clone(),
            vip,
        }
    }
}

#[async_trait]
impl LoadBalancerClient for FakeLoadBalancer {
    async fn create(&self, object: &LbObject) -> Result<RemoteObject, ClientError> {
        self.enter("create", object.object_ref()).await?;
        let mut state = self.state();
        if state.objects.contains_key(&object.object_ref()) {
            return Err(ClientError::Conflict(object.name.clone()));
        }
        state.next_uuid += 1;
        let uuid = format!("{}-{}", object.object_type.api_path(), state.next_uuid);
        let remote = self.remote(&mut state, object, uuid);
        state.objects.insert(object.object_ref(), remote.clone());
        Ok(remote)
    }

    async fn update(&self, uuid: &str, object: &LbObject) -> Result<RemoteObject, ClientError> {
        self.enter("update", object.object_ref()).await?;
        let mut state = self.state();
        let exists = state
            .objects
            .get(&object.object_ref())
            .map_or(false, |o| o.uuid == uuid);
        if !exists {
            return Err(ClientError::NotFound(uuid.to_string()));
        }
        let remote = self.remote(&mut state, object, uuid.to_string());
        state.objects.insert(object.object_ref(), remote.clone());
        Ok(remote)
    }

    async fn delete(&self, object_type: ObjectType, uuid: &str) -> Result<(), ClientError> {
        let name = {
            let state = self.state();
            state
                .objects
                .values()
                .find(|o| o.object_type == Some(object_type) && o.uuid == uuid)
                .map(|o| o.name.clone())
        };
        let object = ObjectRef::new(object_type, name.clone().unwrap_or_else(|| uuid.to_string()));
        self.enter("delete", object.clone()).await?;
        if name.is_none() || self.state().objects.remove(&object).is_none() {
            return Err(ClientError::NotFound(uuid.to_string()));
        }
        Ok(())
    }

    async fn get_by_name(&self, object_type: ObjectType, name: &str) -> Result<Option<RemoteObject>, ClientError> {
        Ok(self.state().objects.get(&ObjectRef::new(object_type, name)).cloned())
    }

    async fn inventory(&self) -> Result<Vec<RemoteObject>, ClientError> {
        let snapshot = {
            let state = self.state();
            if let Some(error) = &state.inventory_error {
                return Err(error.clone());
            }
            state.objects.values().cloned().collect()
        };
        let delay = *self.inventory_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn cluster_active(&self) -> Result<bool, ClientError> {
        Ok(!self.state().inactive)
    }
}

/// Wires the pipeline's shared state around fake collaborators
pub struct Harness {
    pub config: ControllerConfig,
    pub index: Arc<ClusterIndex>,
    pub ledger: Arc<ResourceVersionLedger>,
    pub store: Arc<ObjectGraphStore>,
    pub cache: Arc<RealizedStateCache>,
    pub api: Arc<FakeClusterApi>,
    pub lb: Arc<FakeLoadBalancer>,
    pub status: StatusPublisher,
    pub graph_queue: Arc<WorkQueue<ModelKey>>,
    pub builder: GraphBuilder,
    pub sync: Arc<SyncEngine>,
    pub metrics: SyncMetrics,
}

impl Harness {
    pub fn new() -> Self {
        let config = ControllerConfig { cluster_name: "c1".to_string(), ..Default::default() };
        let metrics = SyncMetrics::new().unwrap();
        let index = Arc::new(ClusterIndex::new());
        let ledger = Arc::new(ResourceVersionLedger::new());
        let store = Arc::new(ObjectGraphStore::new());
        let cache = Arc::new(RealizedStateCache::new());
        let api = Arc::new(FakeClusterApi::new());
        let lb = Arc::new(FakeLoadBalancer::new());
        let status = StatusPublisher::new(
            Arc::new(WorkQueue::new("status")),
            api.clone(),
            index.clone(),
            config.controller_name.clone(),
        );
        let graph_queue = Arc::new(WorkQueue::new("graph"));
        let builder = GraphBuilder::new(
            &config,
            index.clone(),
            ledger.clone(),
            store.clone(),
            status.clone(),
            graph_queue.clone(),
            metrics.clone(),
        );
        let sync = Arc::new(SyncEngine::new(&config, store.clone(), cache.clone(), lb.clone(), metrics.clone()));
        Self { config, index, ledger, store, cache, api, lb, status, graph_queue, builder, sync, metrics }
    }

    pub async fn apply(&self, resource: impl Into<Resource>) {
        self.index.apply(resource.into()).await;
    }

    pub fn model_key(&self, gateway: &str) -> ModelKey {
        self.builder.model_key(&ObjectName::new("default", gateway))
    }

    pub async fn graph(&self, gateway: &str) -> Arc<ObjectGraph> {
        self.store.get(&self.model_key(gateway)).await.unwrap()
    }
}
