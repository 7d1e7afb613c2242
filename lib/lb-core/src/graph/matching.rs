//! Pure hostname, path and naming rules used to shape graphs.
//!
//! Nothing in here reads shared state, so identical inputs always give the
//! same graph shape and the same object names.

use super::model::{ChildVsNode, MatchCriteria, PathMatch, PathRule};
use lb_api::v1::http_route::{HTTPHeaderMatch, HTTPPathMatch};
use sha2::{Digest, Sha256};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// RFC 1123 hostname, optionally prefixed by a single `*.` wildcard label
pub fn is_valid_hostname(hostname: &str) -> bool {
    let host = hostname.strip_prefix("*.").unwrap_or(hostname);
    if host.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}

/// The hostname traffic must carry to satisfy both a listener and a route.
///
/// A listener without hostname accepts anything; wildcards match one or more
/// leading labels, and the more specific side wins.
pub fn intersect_hostname(listener: Option<&str>, route: &str) -> Option<String> {
    let listener = match listener {
        None => return Some(route.to_string()),
        Some(l) => l,
    };
    if listener.eq_ignore_ascii_case(route) {
        return Some(route.to_string());
    }
    if let Some(suffix) = listener.strip_prefix('*') {
        if route.len() > suffix.len() && route.ends_with(suffix) {
            return Some(route.to_string());
        }
    }
    if let Some(suffix) = route.strip_prefix('*') {
        if listener.len() > suffix.len() && listener.ends_with(suffix) {
            return Some(listener.to_string());
        }
    }
    None
}

/// Effective hostnames of a route against a set of listener hostnames,
/// in route declaration order with duplicates removed.
///
/// A route without hostnames inherits the listeners' own hostnames.
pub fn effective_hostnames(route_hostnames: &[String], listeners: &[Option<&str>]) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    let mut push = |host: String| {
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    };

    if route_hostnames.is_empty() {
        for host in listeners.iter().flatten() {
            push(host.to_string());
        }
    } else {
        for route_host in route_hostnames {
            for listener in listeners {
                if let Some(host) = intersect_hostname(*listener, route_host) {
                    push(host);
                }
            }
        }
    }
    hosts
}

pub fn path_match(path: Option<&HTTPPathMatch>) -> PathMatch {
    let value = path
        .and_then(|p| p.value.clone())
        .unwrap_or_else(|| "/".to_string());
    let criteria = match path.and_then(|p| p.type_.as_deref()) {
        Some("Exact") => MatchCriteria::Equals,
        Some("RegularExpression") => MatchCriteria::RegexMatch,
        _ => MatchCriteria::BeginsWith,
    };
    PathMatch { criteria, value }
}

pub fn header_criteria(header: &HTTPHeaderMatch) -> MatchCriteria {
    match header.type_.as_deref() {
        Some("RegularExpression") => MatchCriteria::RegexMatch,
        _ => MatchCriteria::Equals,
    }
}

/// Longest path first; stable, so equal lengths keep declaration order
pub fn sort_path_rules(rules: &mut [PathRule]) {
    rules.sort_by(|a, b| b.path.value.len().cmp(&a.path.value.len()));
}

/// Longest path first; stable, so equal lengths keep route and rule order
pub fn sort_children(children: &mut [ChildVsNode]) {
    children.sort_by(|a, b| b.longest_path().cmp(&a.longest_path()));
}

/// Deterministic child name for one rule of one route under a parent
pub fn child_name(parent: &str, route_namespace: &str, route_name: &str, rule_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(route_namespace.as_bytes());
    hasher.update(b"/");
    hasher.update(route_name.as_bytes());
    hasher.update(b"/");
    hasher.update(rule_index.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}--{}", parent, &digest[..16])
}
