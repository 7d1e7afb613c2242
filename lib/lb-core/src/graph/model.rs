//! Object graph node types
//!
//! The tree mirrors what is realized on the load balancer: one parent
//! virtual service per Gateway, one child virtual service per route rule,
//! and the pools, pool groups, HTTP policies and certificates they use.

use crate::key::{ModelKey, ObjectName};
use serde::Serialize;

/// Desired configuration for one Gateway
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObjectGraph {
    pub model_key: ModelKey,
    pub gateway: ObjectName,
    pub root: ParentVsNode,
}

impl ObjectGraph {
    pub fn child(&self, name: &str) -> Option<&ChildVsNode> {
        self.root.children.iter().find(|c| c.name == name)
    }

    pub fn children_for_route(&self, route: &ObjectName) -> impl Iterator<Item = &ChildVsNode> {
        let route = route.clone();
        self.root.children.iter().filter(move |c| c.route == route)
    }

    pub fn references_route(&self, route: &ObjectName) -> bool {
        self.root.children.iter().any(|c| &c.route == route)
    }

    pub fn references_service(&self, service: &ObjectName) -> bool {
        self.root
            .children
            .iter()
            .flat_map(|c| c.pools.iter())
            .any(|p| &p.service == service)
    }
}

/// Parent virtual service: owns the listener ports, FQDNs and certificates
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParentVsNode {
    pub name: String,
    pub tenant: String,
    pub ports: Vec<ListenerPort>,
    pub fqdns: Vec<String>,
    pub certificates: Vec<CertificateNode>,
    pub children: Vec<ChildVsNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ListenerPort {
    pub port: u16,
    pub tls: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CertificateNode {
    pub name: String,
    pub secret: ObjectName,
    pub certificate: String,
    pub key: String,
}

/// Child virtual service for one route rule under one parent
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChildVsNode {
    pub name: String,
    pub route: ObjectName,
    pub rule_index: usize,
    pub vh_matches: Vec<VhMatch>,
    pub http_policy: Option<HttpPolicyNode>,
    pub pool_group: Option<PoolGroupNode>,
    pub pools: Vec<PoolNode>,
}

impl ChildVsNode {
    /// Longest path value across every match, used to order overlapping children
    pub fn longest_path(&self) -> usize {
        self.vh_matches
            .iter()
            .flat_map(|m| m.rules.iter())
            .map(|r| r.path.value.len())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VhMatch {
    pub host: String,
    pub rules: Vec<PathRule>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathRule {
    pub name: String,
    pub path: PathMatch,
    pub headers: Vec<HeaderMatch>,
    pub method: Option<String>,
    /// Listener ports this match is reachable on
    pub ports: Vec<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchCriteria {
    BeginsWith,
    Equals,
    RegexMatch,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathMatch {
    pub criteria: MatchCriteria,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeaderMatch {
    pub name: String,
    pub criteria: MatchCriteria,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HttpPolicyNode {
    pub name: String,
    pub request_rules: Vec<PolicyRule>,
    pub response_rules: Vec<PolicyRule>,
}

impl HttpPolicyNode {
    pub fn rule_count(&self) -> usize {
        self.request_rules.len() + self.response_rules.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PolicyRule {
    pub name: String,
    pub header_actions: Vec<HeaderAction>,
    pub redirect: Option<RedirectAction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeaderActionKind {
    #[serde(rename = "HTTP_ADD_HDR")]
    Add,
    #[serde(rename = "HTTP_REPLACE_HDR")]
    Replace,
    #[serde(rename = "HTTP_REMOVE_HDR")]
    Remove,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeaderAction {
    pub action: HeaderActionKind,
    pub name: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RedirectAction {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub status_code: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolGroupNode {
    pub name: String,
    pub members: Vec<PoolGroupMember>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolGroupMember {
    pub pool: String,
    pub ratio: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolNode {
    pub name: String,
    pub service: ObjectName,
    pub port: u16,
    pub target_port: u16,
    pub servers: Vec<Server>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Server {
    pub ip: String,
    pub port: u16,
}
