//! Gateway API resource bindings consumed by the load-balancer controller
//!
//! Only the subset of the upstream schema that the controller reads or
//! writes is modelled here:
//! - GatewayClass: which controller owns a class of gateways
//! - Gateway: listeners (port, protocol, hostname, TLS material)
//! - HTTPRoute: hostnames, match rules, filters and backends

pub mod condition;
pub mod v1;

pub use condition::Condition;
pub use v1::{Gateway, GatewayClass, HTTPRoute};
