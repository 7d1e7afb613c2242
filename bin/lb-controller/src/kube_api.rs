use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Secret, Service};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use lb_api::{Gateway, GatewayClass, HTTPRoute};
use lb_core::{ClusterApi, Resource, ResourceKind, SourceError, StatusTarget};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

/// Kubernetes-backed implementation of [`ClusterApi`]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_all<K>(&self, kind: ResourceKind) -> Result<Vec<Resource>, SourceError>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
        Resource: From<K>,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| SourceError::List { kind, message: e.to_string() })?;
        debug!("Listed {} {} objects", list.items.len(), kind);
        Ok(list.items.into_iter().map(Resource::from).collect())
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, SourceError> {
        match kind {
            ResourceKind::GatewayClass => self.list_all::<GatewayClass>(kind).await,
            ResourceKind::Gateway => self.list_all::<Gateway>(kind).await,
            ResourceKind::HTTPRoute => self.list_all::<HTTPRoute>(kind).await,
            ResourceKind::Service => self.list_all::<Service>(kind).await,
            ResourceKind::Endpoints => self.list_all::<Endpoints>(kind).await,
            ResourceKind::Secret => self.list_all::<Secret>(kind).await,
        }
    }

    async fn update_status(&self, target: &StatusTarget, status: serde_json::Value) -> Result<(), SourceError> {
        let patch = Patch::Merge(json!({ "status": status }));
        let params = PatchParams::default();
        let result = match target {
            StatusTarget::GatewayClass(name) => {
                let api: Api<GatewayClass> = Api::all(self.client.clone());
                api.patch_status(name, &params, &patch).await.map(|_| ())
            }
            StatusTarget::Gateway(name) => {
                let api: Api<Gateway> = Api::namespaced(self.client.clone(), &name.namespace);
                api.patch_status(&name.name, &params, &patch).await.map(|_| ())
            }
            StatusTarget::HTTPRoute(name) => {
                let api: Api<HTTPRoute> = Api::namespaced(self.client.clone(), &name.namespace);
                api.patch_status(&name.name, &params, &patch).await.map(|_| ())
            }
        };
        result.map_err(|e| SourceError::Status { target: target.to_string(), message: e.to_string() })
    }
}
