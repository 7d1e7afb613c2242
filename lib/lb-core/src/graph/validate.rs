//! Minimal referential and structural checks before a resource contributes
//! to a graph

use super::matching::is_valid_hostname;
use lb_api::{Gateway, GatewayClass, HTTPRoute};
use std::collections::HashSet;

pub const PROTOCOL_HTTP: &str = "HTTP";
pub const PROTOCOL_HTTPS: &str = "HTTPS";

const SUPPORTED_FILTERS: [&str; 3] = ["RequestHeaderModifier", "ResponseHeaderModifier", "RequestRedirect"];

/// Why a resource, or part of one, was not accepted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: &str, message: impl Into<String>) -> Self {
        Self { reason: reason.to_string(), message: message.into() }
    }
}

/// Outcome of checking one listener
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerCheck {
    pub name: String,
    pub rejection: Option<Rejection>,
}

impl ListenerCheck {
    pub fn is_valid(&self) -> bool {
        self.rejection.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayValidation {
    pub rejection: Option<Rejection>,
    pub listeners: Vec<ListenerCheck>,
}

impl GatewayValidation {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }

    pub fn is_listener_valid(&self, name: &str) -> bool {
        self.listeners.iter().any(|l| l.name == name && l.is_valid())
    }
}

/// Whether this controller owns the class
pub fn is_claimed(class: &GatewayClass, controller_name: &str) -> bool {
    class.spec.controller_name == controller_name
}

/// Check every listener; the Gateway is accepted if at least one survives.
///
/// A listener repeating the (port, hostname) pair of an earlier valid
/// listener conflicts and is dropped.
pub fn validate_gateway(gateway: &Gateway) -> GatewayValidation {
    let mut seen_names = HashSet::new();
    let mut bound: HashSet<(u16, Option<&str>)> = HashSet::new();
    let mut listeners = Vec::with_capacity(gateway.spec.listeners.len());

    for listener in &gateway.spec.listeners {
        let rejection = if !seen_names.insert(listener.name.as_str()) {
            Some(Rejection::new("Invalid", format!("duplicate listener name {}", listener.name)))
        } else if listener.protocol != PROTOCOL_HTTP && listener.protocol != PROTOCOL_HTTPS {
            Some(Rejection::new(
                "UnsupportedProtocol",
                format!("protocol {} is not supported", listener.protocol),
            ))
        } else if listener.hostname.as_deref().map_or(false, |h| !is_valid_hostname(h)) {
            Some(Rejection::new("Invalid", "listener hostname is not a valid DNS name"))
        } else if listener.protocol == PROTOCOL_HTTPS && !has_terminating_tls(listener) {
            Some(Rejection::new(
                "InvalidCertificateRef",
                "HTTPS listener requires TLS termination with a certificate reference",
            ))
        } else if !bound.insert((listener.port, listener.hostname.as_deref())) {
            Some(Rejection::new(
                "HostnameConflict",
                format!("port {} and hostname already bound by another listener", listener.port),
            ))
        } else {
            None
        };
        listeners.push(ListenerCheck { name: listener.name.clone(), rejection });
    }

    let rejection = if listeners.iter().any(ListenerCheck::is_valid) {
        None
    } else {
        Some(Rejection::new("ListenersNotValid", "no valid listeners"))
    };

    GatewayValidation { rejection, listeners }
}

fn has_terminating_tls(listener: &lb_api::v1::Listener) -> bool {
    match &listener.tls {
        Some(tls) => {
            tls.mode.as_deref().map_or(true, |m| m == "Terminate") && !tls.certificate_refs.is_empty()
        }
        None => false,
    }
}

/// Route-level checks independent of any parent
pub fn validate_route(route: &HTTPRoute) -> Result<(), Rejection> {
    if let Some(host) = route.spec.hostnames.iter().find(|h| !is_valid_hostname(h)) {
        return Err(Rejection::new("UnsupportedValue", format!("invalid hostname {}", host)));
    }
    for rule in &route.spec.rules {
        if let Some(filter) = rule
            .filters
            .iter()
            .find(|f| !SUPPORTED_FILTERS.contains(&f.type_.as_str()))
        {
            return Err(Rejection::new(
                "UnsupportedValue",
                format!("filter {} is not supported", filter.type_),
            ));
        }
    }
    Ok(())
}
