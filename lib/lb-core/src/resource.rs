//! Typed payloads carried from the watch layer into the pipeline

use crate::key::{IngestionKey, ResourceKind};
use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use kube::Resource as _;
use lb_api::{Gateway, GatewayClass, HTTPRoute};
use std::sync::Arc;

/// One watched object, tagged by kind
#[derive(Clone, Debug)]
pub enum Resource {
    GatewayClass(Arc<GatewayClass>),
    Gateway(Arc<Gateway>),
    HTTPRoute(Arc<HTTPRoute>),
    Service(Arc<Service>),
    Endpoints(Arc<Endpoints>),
    Secret(Arc<Secret>),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::GatewayClass(_) => ResourceKind::GatewayClass,
            Resource::Gateway(_) => ResourceKind::Gateway,
            Resource::HTTPRoute(_) => ResourceKind::HTTPRoute,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Endpoints(_) => ResourceKind::Endpoints,
            Resource::Secret(_) => ResourceKind::Secret,
        }
    }

    fn meta(&self) -> &kube::api::ObjectMeta {
        match self {
            Resource::GatewayClass(o) => o.meta(),
            Resource::Gateway(o) => o.meta(),
            Resource::HTTPRoute(o) => o.meta(),
            Resource::Service(o) => o.meta(),
            Resource::Endpoints(o) => o.meta(),
            Resource::Secret(o) => o.meta(),
        }
    }

    pub fn key(&self) -> IngestionKey {
        let meta = self.meta();
        IngestionKey::new(
            self.kind(),
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    /// Opaque version token assigned by the API server
    pub fn version(&self) -> Option<String> {
        self.meta().resource_version.clone()
    }

    pub fn generation(&self) -> Option<i64> {
        self.meta().generation
    }
}

macro_rules! impl_from {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Resource {
                fn from(obj: $ty) -> Self {
                    Resource::$ty(Arc::new(obj))
                }
            }
        )*
    };
}

impl_from!(GatewayClass, Gateway, HTTPRoute, Service, Endpoints, Secret);

/// What happened to the object identified by `key`
#[derive(Clone, Debug)]
pub enum Change {
    Applied(Resource),
    Deleted,
}

/// A change notification from the cluster API
#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub key: IngestionKey,
    pub version: Option<String>,
    pub change: Change,
}

impl WatchEvent {
    pub fn applied(resource: impl Into<Resource>) -> Self {
        let resource = resource.into();
        Self {
            key: resource.key(),
            version: resource.version(),
            change: Change::Applied(resource),
        }
    }

    pub fn deleted(key: IngestionKey) -> Self {
        Self { key, version: None, change: Change::Deleted }
    }
}
