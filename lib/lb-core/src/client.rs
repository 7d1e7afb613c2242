//! Load balancer controller collaborator consumed by the sync engine

use crate::key::ModelKey;
use crate::retry::RetryClass;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Remote object types, in the order leaf objects are created
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    SslKeyAndCertificate,
    Pool,
    PoolGroup,
    HttpPolicySet,
    VirtualService,
}

impl ObjectType {
    pub const ALL: [ObjectType; 5] = [
        ObjectType::SslKeyAndCertificate,
        ObjectType::Pool,
        ObjectType::PoolGroup,
        ObjectType::HttpPolicySet,
        ObjectType::VirtualService,
    ];

    /// Path segment of the REST collection
    pub fn api_path(&self) -> &'static str {
        match self {
            ObjectType::SslKeyAndCertificate => "sslkeyandcertificate",
            ObjectType::Pool => "pool",
            ObjectType::PoolGroup => "poolgroup",
            ObjectType::HttpPolicySet => "httppolicyset",
            ObjectType::VirtualService => "virtualservice",
        }
    }

    pub fn from_api_path(path: &str) -> Option<Self> {
        ObjectType::ALL.into_iter().find(|t| t.api_path() == path)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_path())
    }
}

/// Type and name of a remote object; names are unique per type
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: ObjectType,
    pub name: String,
}

impl ObjectRef {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        Self { object_type, name: name.into() }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_type, self.name)
    }
}

/// Desired remote object rendered from a graph
#[derive(Clone, Debug, PartialEq)]
pub struct LbObject {
    pub object_type: ObjectType,
    pub name: String,
    pub model_key: ModelKey,
    /// Request body sent on create and update
    pub body: serde_json::Value,
    /// Objects this one points at
    pub references: Vec<ObjectRef>,
    /// Digest of the body, also stored remotely as a marker
    pub checksum: String,
}

impl LbObject {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.object_type, self.name.clone())
    }

    /// A virtual service pointing at another virtual service is a child
    pub fn is_child_vs(&self) -> bool {
        is_child_vs(self.object_type, &self.references)
    }
}

pub(crate) fn is_child_vs(object_type: ObjectType, references: &[ObjectRef]) -> bool {
    object_type == ObjectType::VirtualService
        && references.iter().any(|r| r.object_type == ObjectType::VirtualService)
}

/// Object as reported by the load balancer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemoteObject {
    pub object_type: Option<ObjectType>,
    pub name: String,
    pub uuid: String,
    pub checksum: Option<String>,
    pub model_key: Option<ModelKey>,
    pub references: Vec<ObjectRef>,
    /// First VIP address, for virtual services
    pub vip: Option<String>,
}

/// Classified failure of a load balancer call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("request rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    Conflict(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Retry class for a failed pass that ended with this error
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ClientError::Rejected { .. } => RetryClass::Slow,
            ClientError::Timeout(_)
            | ClientError::Connection(_)
            | ClientError::Server { .. }
            | ClientError::NotFound(_)
            | ClientError::Conflict(_)
            | ClientError::Decode(_) => RetryClass::Fast,
        }
    }
}

/// CRUD, inventory and health operations of the load balancer controller
#[async_trait]
pub trait LoadBalancerClient: Send + Sync {
    async fn create(&self, object: &LbObject) -> Result<RemoteObject, ClientError>;

    async fn update(&self, uuid: &str, object: &LbObject) -> Result<RemoteObject, ClientError>;

    async fn delete(&self, object_type: ObjectType, uuid: &str) -> Result<(), ClientError>;

    async fn get_by_name(
        &self,
        object_type: ObjectType,
        name: &str,
    ) -> Result<Option<RemoteObject>, ClientError>;

    /// Every object created by this cluster, across all types
    async fn inventory(&self) -> Result<Vec<RemoteObject>, ClientError>;

    /// Whether the controller cluster is up and accepting configuration
    async fn cluster_active(&self) -> Result<bool, ClientError>;
}
