use crate::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Gateway describes one load-balanced entry point and its listeners
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    plural = "gateways",
    namespaced,
    derive = "Default",
    status = "GatewayStatus",
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Name of the GatewayClass this Gateway belongs to
    pub gateway_class_name: String,

    /// Listeners bound to this Gateway
    #[serde(default)]
    pub listeners: Vec<Listener>,

    /// Requested addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayAddress>,
}

/// A logical endpoint accepting traffic on one port
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Unique name within the Gateway
    pub name: String,

    /// Hostname to match; absent matches every host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    pub port: u16,

    /// HTTP or HTTPS
    pub protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,
}

/// TLS termination settings for a listener
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// Terminate (default) or Passthrough
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default)]
    pub certificate_refs: Vec<SecretObjectReference>,
}

/// Reference to a Secret holding `tls.crt` and `tls.key`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretObjectReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    pub value: String,
}

/// Observed state of a Gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Addresses assigned by the load balancer
    #[serde(default)]
    pub addresses: Vec<GatewayAddress>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub listeners: Vec<ListenerStatus>,
}

/// Per-listener observed state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,

    /// Number of routes successfully attached to this listener
    #[serde(default)]
    pub attached_routes: i32,

    #[serde(default)]
    pub supported_kinds: Vec<RouteGroupKind>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroupKind {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    pub kind: String,
}
