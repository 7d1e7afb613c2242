//! Identifiers for watched resources and per-gateway models

use std::fmt;
use std::str::FromStr;

/// Every resource kind that feeds the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    GatewayClass,
    Gateway,
    HTTPRoute,
    Service,
    Endpoints,
    Secret,
}

impl ResourceKind {
    /// Listing order used by full resync: dependencies before dependents
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::GatewayClass,
        ResourceKind::Secret,
        ResourceKind::Service,
        ResourceKind::Endpoints,
        ResourceKind::Gateway,
        ResourceKind::HTTPRoute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::GatewayClass => "GatewayClass",
            ResourceKind::Gateway => "Gateway",
            ResourceKind::HTTPRoute => "HTTPRoute",
            ResourceKind::Service => "Service",
            ResourceKind::Endpoints => "Endpoints",
            ResourceKind::Secret => "Secret",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::GatewayClass)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| KeyParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed key: {0}")]
pub struct KeyParseError(pub String);

/// Namespace and name of an object; namespace is empty for cluster-scoped kinds
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ObjectName {
    pub namespace: String,
    pub name: String,
}

impl ObjectName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self { namespace: String::new(), name: name.into() }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Unit of work on the ingestion queue: `<Kind>/<namespace>/<name>`,
/// or `<Kind>/<name>` for cluster-scoped kinds
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IngestionKey {
    pub kind: ResourceKind,
    pub object: ObjectName,
}

impl IngestionKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let object = if kind.is_namespaced() {
            ObjectName::new(namespace, name)
        } else {
            ObjectName::cluster_scoped(name)
        };
        Self { kind, object }
    }

    pub fn namespace(&self) -> &str {
        &self.object.namespace
    }

    pub fn name(&self) -> &str {
        &self.object.name
    }
}

impl fmt::Display for IngestionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.object)
    }
}

impl FromStr for IngestionKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let malformed = || KeyParseError(s.to_string());
        match parts.as_slice() {
            [kind, name] if !name.is_empty() => {
                let kind: ResourceKind = kind.parse()?;
                if kind.is_namespaced() {
                    return Err(malformed());
                }
                Ok(IngestionKey::new(kind, "", *name))
            }
            [kind, namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                let kind: ResourceKind = kind.parse()?;
                if !kind.is_namespaced() {
                    return Err(malformed());
                }
                Ok(IngestionKey::new(kind, *namespace, *name))
            }
            _ => Err(malformed()),
        }
    }
}

/// Identifies one Gateway's desired graph: `<tenant>/<cluster>--<namespace>-<name>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ModelKey(String);

impl ModelKey {
    pub fn for_gateway(tenant: &str, cluster: &str, gateway: &ObjectName) -> Self {
        Self(format!("{}/{}--{}-{}", tenant, cluster, gateway.namespace, gateway.name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ModelKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
