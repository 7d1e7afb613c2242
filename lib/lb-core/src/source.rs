//! Cluster API collaborator consumed by the core

use crate::key::ResourceKind;
use crate::resource::Resource;
use crate::status::StatusTarget;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("listing {kind} failed: {message}")]
    List { kind: ResourceKind, message: String },

    #[error("status update for {target} failed: {message}")]
    Status { target: String, message: String },
}

/// Read side and status side of the cluster-management API
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Every current object of one kind, across all namespaces
    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, SourceError>;

    /// Replace the status subresource of `target`
    async fn update_status(
        &self,
        target: &StatusTarget,
        status: serde_json::Value,
    ) -> Result<(), SourceError>;
}
