//! Latest known copy of every watched object, with reverse lookups

use crate::key::{IngestionKey, ObjectName, ResourceKind};
use crate::resource::Resource;
use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use lb_api::v1::http_route::{HTTPBackendRef, ParentReference};
use lb_api::v1::API_GROUP;
use lb_api::{Gateway, GatewayClass, HTTPRoute};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Gateway a parent reference points at, if it names a Gateway
pub fn parent_gateway(route_namespace: &str, parent: &ParentReference) -> Option<ObjectName> {
    let group_ok = parent.group.as_deref().map_or(true, |g| g == API_GROUP);
    let kind_ok = parent.kind.as_deref().map_or(true, |k| k == "Gateway");
    if !group_ok || !kind_ok {
        return None;
    }
    let namespace = parent.namespace.as_deref().unwrap_or(route_namespace);
    Some(ObjectName::new(namespace, parent.name.as_str()))
}

/// Service a backend reference points at, if it names a core Service
pub fn backend_service(route_namespace: &str, backend: &HTTPBackendRef) -> Option<ObjectName> {
    let group_ok = backend.group.as_deref().map_or(true, str::is_empty);
    let kind_ok = backend.kind.as_deref().map_or(true, |k| k == "Service");
    if !group_ok || !kind_ok {
        return None;
    }
    let namespace = backend.namespace.as_deref().unwrap_or(route_namespace);
    Some(ObjectName::new(namespace, backend.name.as_str()))
}

fn object_name(namespace: Option<&String>, name: Option<&String>) -> ObjectName {
    ObjectName::new(
        namespace.cloned().unwrap_or_default(),
        name.cloned().unwrap_or_default(),
    )
}

/// Plain maps of the indexed objects; read through [`ClusterIndex::read`]
#[derive(Default)]
pub struct IndexState {
    gateway_classes: BTreeMap<String, Arc<GatewayClass>>,
    gateways: BTreeMap<ObjectName, Arc<Gateway>>,
    routes: BTreeMap<ObjectName, Arc<HTTPRoute>>,
    services: BTreeMap<ObjectName, Arc<Service>>,
    endpoints: BTreeMap<ObjectName, Arc<Endpoints>>,
    secrets: BTreeMap<ObjectName, Arc<Secret>>,
}

impl IndexState {
    pub fn gateway_class(&self, name: &str) -> Option<Arc<GatewayClass>> {
        self.gateway_classes.get(name).cloned()
    }

    pub fn gateway(&self, name: &ObjectName) -> Option<Arc<Gateway>> {
        self.gateways.get(name).cloned()
    }

    pub fn route(&self, name: &ObjectName) -> Option<Arc<HTTPRoute>> {
        self.routes.get(name).cloned()
    }

    pub fn service(&self, name: &ObjectName) -> Option<Arc<Service>> {
        self.services.get(name).cloned()
    }

    pub fn endpoints(&self, name: &ObjectName) -> Option<Arc<Endpoints>> {
        self.endpoints.get(name).cloned()
    }

    pub fn secret(&self, name: &ObjectName) -> Option<Arc<Secret>> {
        self.secrets.get(name).cloned()
    }

    pub fn gateway_classes(&self) -> impl Iterator<Item = &Arc<GatewayClass>> {
        self.gateway_classes.values()
    }

    pub fn gateways(&self) -> impl Iterator<Item = (&ObjectName, &Arc<Gateway>)> {
        self.gateways.iter()
    }

    pub fn gateways_for_class(&self, class: &str) -> Vec<ObjectName> {
        self.gateways
            .iter()
            .filter(|(_, gw)| gw.spec.gateway_class_name == class)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Routes with at least one parent reference naming `gateway`, in name order
    pub fn routes_for_gateway(&self, gateway: &ObjectName) -> Vec<Arc<HTTPRoute>> {
        self.routes
            .iter()
            .filter(|(name, route)| {
                route
                    .spec
                    .parent_refs
                    .iter()
                    .any(|p| parent_gateway(&name.namespace, p).as_ref() == Some(gateway))
            })
            .map(|(_, route)| route.clone())
            .collect()
    }

    pub fn routes_for_service(&self, service: &ObjectName) -> Vec<Arc<HTTPRoute>> {
        self.routes
            .iter()
            .filter(|(name, route)| {
                route.spec.rules.iter().flat_map(|r| r.backend_refs.iter()).any(|b| {
                    backend_service(&name.namespace, b).as_ref() == Some(service)
                })
            })
            .map(|(_, route)| route.clone())
            .collect()
    }

    pub fn gateways_for_secret(&self, secret: &ObjectName) -> Vec<ObjectName> {
        self.gateways
            .iter()
            .filter(|(name, gw)| {
                gw.spec
                    .listeners
                    .iter()
                    .filter_map(|l| l.tls.as_ref())
                    .flat_map(|tls| tls.certificate_refs.iter())
                    .any(|r| {
                        let ns = r.namespace.as_deref().unwrap_or(&name.namespace);
                        ns == secret.namespace && r.name == secret.name
                    })
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn insert(&mut self, resource: Resource) {
        match resource {
            Resource::GatewayClass(o) => {
                let name = o.metadata.name.clone().unwrap_or_default();
                self.gateway_classes.insert(name, o);
            }
            Resource::Gateway(o) => {
                let name = object_name(o.metadata.namespace.as_ref(), o.metadata.name.as_ref());
                self.gateways.insert(name, o);
            }
            Resource::HTTPRoute(o) => {
                let name = object_name(o.metadata.namespace.as_ref(), o.metadata.name.as_ref());
                self.routes.insert(name, o);
            }
            Resource::Service(o) => {
                let name = object_name(o.metadata.namespace.as_ref(), o.metadata.name.as_ref());
                self.services.insert(name, o);
            }
            Resource::Endpoints(o) => {
                let name = object_name(o.metadata.namespace.as_ref(), o.metadata.name.as_ref());
                self.endpoints.insert(name, o);
            }
            Resource::Secret(o) => {
                let name = object_name(o.metadata.namespace.as_ref(), o.metadata.name.as_ref());
                self.secrets.insert(name, o);
            }
        }
    }

    fn remove(&mut self, key: &IngestionKey) -> bool {
        match key.kind {
            ResourceKind::GatewayClass => self.gateway_classes.remove(key.name()).is_some(),
            ResourceKind::Gateway => self.gateways.remove(&key.object).is_some(),
            ResourceKind::HTTPRoute => self.routes.remove(&key.object).is_some(),
            ResourceKind::Service => self.services.remove(&key.object).is_some(),
            ResourceKind::Endpoints => self.endpoints.remove(&key.object).is_some(),
            ResourceKind::Secret => self.secrets.remove(&key.object).is_some(),
        }
    }

    fn clear(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::GatewayClass => self.gateway_classes.clear(),
            ResourceKind::Gateway => self.gateways.clear(),
            ResourceKind::HTTPRoute => self.routes.clear(),
            ResourceKind::Service => self.services.clear(),
            ResourceKind::Endpoints => self.endpoints.clear(),
            ResourceKind::Secret => self.secrets.clear(),
        }
    }
}

/// ClusterIndex holds the newest observed copy of every watched object
pub struct ClusterIndex {
    state: RwLock<IndexState>,
}

impl ClusterIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Consistent read view across all kinds
    pub async fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().await
    }

    /// Record the latest copy of an object
    pub async fn apply(&self, resource: Resource) {
        let key = resource.key();
        self.state.write().await.insert(resource);
        debug!("Indexed {}", key);
    }

    /// Forget an object; returns whether it was known
    pub async fn remove(&self, key: &IngestionKey) -> bool {
        let removed = self.state.write().await.remove(key);
        if removed {
            debug!("Removed {} from index", key);
        }
        removed
    }

    /// Replace every object of one kind with a fresh listing
    pub async fn replace_kind(&self, kind: ResourceKind, resources: Vec<Resource>) {
        let mut state = self.state.write().await;
        state.clear(kind);
        let count = resources.len();
        for resource in resources.into_iter().filter(|r| r.kind() == kind) {
            state.insert(resource);
        }
        debug!("Indexed {} {} objects", count, kind);
    }

    /// Current copy of the object behind an ingestion key
    pub async fn get(&self, key: &IngestionKey) -> Option<Resource> {
        let state = self.state.read().await;
        match key.kind {
            ResourceKind::GatewayClass => state.gateway_class(key.name()).map(Resource::GatewayClass),
            ResourceKind::Gateway => state.gateway(&key.object).map(Resource::Gateway),
            ResourceKind::HTTPRoute => state.route(&key.object).map(Resource::HTTPRoute),
            ResourceKind::Service => state.service(&key.object).map(Resource::Service),
            ResourceKind::Endpoints => state.endpoints(&key.object).map(Resource::Endpoints),
            ResourceKind::Secret => state.secret(&key.object).map(Resource::Secret),
        }
    }
}

impl Default for ClusterIndex {
    fn default() -> Self {
        Self::new()
    }
}
