//! Rendering of an object graph into load balancer request bodies

use crate::client::{LbObject, ObjectRef, ObjectType};
use crate::error::{CoreError, Result};
use crate::graph::model::*;
use crate::key::ModelKey;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

pub const MARKER_CLUSTER: &str = "clustername";
pub const MARKER_MODEL: &str = "model";
pub const MARKER_CHECKSUM: &str = "checksum";

/// Identity stamped on every rendered object
#[derive(Clone, Debug)]
pub struct RenderContext {
    pub cluster: String,
    pub tenant: String,
    pub created_by: String,
}

/// Query-style reference to a named object, resolved by the load balancer
pub fn ref_url(object_type: ObjectType, name: &str) -> String {
    format!("/api/{}?name={}", object_type.api_path(), name)
}

/// Every remote object one graph requires. Leaves come before the objects
/// referencing them; the plan orders operations regardless.
pub fn render(graph: &ObjectGraph, ctx: &RenderContext) -> Result<Vec<LbObject>> {
    let mut renderer = Renderer { ctx, model_key: &graph.model_key, objects: Vec::new() };
    let root = &graph.root;

    for cert in &root.certificates {
        renderer.push(ObjectType::SslKeyAndCertificate, &cert.name, certificate_body(cert), vec![])?;
    }

    let root_ref = ObjectRef::new(ObjectType::VirtualService, root.name.clone());
    for child in &root.children {
        for pool in &child.pools {
            renderer.push(ObjectType::Pool, &pool.name, pool_body(pool), vec![])?;
        }

        let mut references = vec![root_ref.clone()];
        if let Some(group) = &child.pool_group {
            let members: Vec<ObjectRef> = group
                .members
                .iter()
                .map(|m| ObjectRef::new(ObjectType::Pool, m.pool.clone()))
                .collect();
            renderer.push(ObjectType::PoolGroup, &group.name, pool_group_body(group), members)?;
            references.push(ObjectRef::new(ObjectType::PoolGroup, group.name.clone()));
        }
        if let Some(policy) = &child.http_policy {
            renderer.push(ObjectType::HttpPolicySet, &policy.name, policy_body(policy), vec![])?;
            references.push(ObjectRef::new(ObjectType::HttpPolicySet, policy.name.clone()));
        }
        renderer.push(ObjectType::VirtualService, &child.name, child_body(root, child), references)?;
    }

    let cert_refs = root
        .certificates
        .iter()
        .map(|c| ObjectRef::new(ObjectType::SslKeyAndCertificate, c.name.clone()))
        .collect();
    renderer.push(ObjectType::VirtualService, &root.name, root_body(root), cert_refs)?;

    Ok(renderer.objects)
}

struct Renderer<'a> {
    ctx: &'a RenderContext,
    model_key: &'a ModelKey,
    objects: Vec<LbObject>,
}

impl Renderer<'_> {
    fn push(&mut self, object_type: ObjectType, name: &str, mut body: Value, references: Vec<ObjectRef>) -> Result<()> {
        if self.objects.iter().any(|o| o.object_type == object_type && o.name == name) {
            return Err(CoreError::Invariant(format!(
                "{} rendered twice for {}",
                ObjectRef::new(object_type, name),
                self.model_key
            )));
        }

        if let Value::Object(map) = &mut body {
            map.insert("name".to_string(), json!(name));
            map.insert("tenant_ref".to_string(), json!(format!("/api/tenant?name={}", self.ctx.tenant)));
            map.insert("created_by".to_string(), json!(self.ctx.created_by));
            map.insert(
                "markers".to_string(),
                json!([
                    { "key": MARKER_CLUSTER, "values": [self.ctx.cluster] },
                    { "key": MARKER_MODEL, "values": [self.model_key.as_str()] },
                ]),
            );
        }

        let checksum = checksum(&body)?;
        if let Some(Value::Array(markers)) = body.get_mut("markers") {
            markers.push(json!({ "key": MARKER_CHECKSUM, "values": [checksum] }));
        }

        self.objects.push(LbObject {
            object_type,
            name: name.to_string(),
            model_key: self.model_key.clone(),
            body,
            references,
            checksum,
        });
        Ok(())
    }
}

/// Hex SHA-256 of the canonical JSON body; object keys serialize sorted
pub fn checksum(body: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(body)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn certificate_body(cert: &CertificateNode) -> Value {
    json!({
        "type": "SSL_CERTIFICATE_TYPE_VIRTUALSERVICE",
        "certificate": { "certificate": cert.certificate },
        "key": cert.key,
    })
}

fn pool_body(pool: &PoolNode) -> Value {
    let servers: Vec<Value> = pool
        .servers
        .iter()
        .map(|s| json!({ "ip": { "addr": s.ip, "type": "V4" }, "port": s.port }))
        .collect();
    json!({
        "default_server_port": pool.target_port,
        "servers": servers,
        "service_metadata": format!("{}:{}", pool.service, pool.port),
    })
}

fn pool_group_body(group: &PoolGroupNode) -> Value {
    let members: Vec<Value> = group
        .members
        .iter()
        .map(|m| json!({ "pool_ref": ref_url(ObjectType::Pool, &m.pool), "ratio": m.ratio }))
        .collect();
    json!({ "members": members })
}

fn policy_rules(rules: &[PolicyRule]) -> Vec<Value> {
    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            let mut body = json!({ "name": rule.name, "index": i + 1, "enable": true });
            if !rule.header_actions.is_empty() {
                let actions: Vec<Value> = rule
                    .header_actions
                    .iter()
                    .map(|a| {
                        let mut hdr = json!({ "name": a.name });
                        if let Some(value) = &a.value {
                            hdr["value"] = json!({ "val": value });
                        }
                        json!({ "action": a.action, "hdr": hdr })
                    })
                    .collect();
                body["hdr_action"] = json!(actions);
            }
            if let Some(redirect) = &rule.redirect {
                let mut action = json!({ "status_code": redirect.status_code });
                if let Some(protocol) = &redirect.protocol {
                    action["protocol"] = json!(protocol);
                }
                if let Some(host) = &redirect.host {
                    action["host"] = json!({
                        "type": "URI_PARAM_TYPE_TOKENIZED",
                        "tokens": [{ "type": "URI_TOKEN_TYPE_STRING", "str_value": host }],
                    });
                }
                if let Some(port) = redirect.port {
                    action["port"] = json!(port);
                }
                body["redirect_action"] = action;
            }
            body
        })
        .collect()
}

fn policy_body(policy: &HttpPolicyNode) -> Value {
    let mut body = json!({});
    if !policy.request_rules.is_empty() {
        body["http_request_policy"] = json!({ "rules": policy_rules(&policy.request_rules) });
    }
    if !policy.response_rules.is_empty() {
        body["http_response_policy"] = json!({ "rules": policy_rules(&policy.response_rules) });
    }
    body
}

fn path_criteria(criteria: MatchCriteria) -> &'static str {
    match criteria {
        MatchCriteria::BeginsWith => "BEGINS_WITH",
        MatchCriteria::Equals => "EQUALS",
        MatchCriteria::RegexMatch => "REGEX_MATCH",
    }
}

fn header_criteria(criteria: MatchCriteria) -> &'static str {
    match criteria {
        MatchCriteria::BeginsWith => "HDR_BEGINS_WITH",
        MatchCriteria::Equals => "HDR_EQUALS",
        MatchCriteria::RegexMatch => "HDR_REGEX_MATCH",
    }
}

fn path_rule_body(rule: &PathRule) -> Value {
    let mut matches = json!({
        "path": { "match_criteria": path_criteria(rule.path.criteria), "match_str": [rule.path.value] },
        "vs_port": { "match_criteria": "IS_IN", "ports": rule.ports },
    });
    if !rule.headers.is_empty() {
        let hdrs: Vec<Value> = rule
            .headers
            .iter()
            .map(|h| json!({ "hdr": h.name, "match_criteria": header_criteria(h.criteria), "value": [h.value] }))
            .collect();
        matches["hdrs"] = json!(hdrs);
    }
    if let Some(method) = &rule.method {
        matches["method"] = json!({
            "match_criteria": "IS_IN",
            "methods": [format!("HTTP_METHOD_{}", method.to_ascii_uppercase())],
        });
    }
    json!({ "name": rule.name, "matches": matches })
}

fn child_body(root: &ParentVsNode, child: &ChildVsNode) -> Value {
    let vh_matches: Vec<Value> = child
        .vh_matches
        .iter()
        .map(|m| {
            let rules: Vec<Value> = m.rules.iter().map(path_rule_body).collect();
            json!({ "host": m.host, "rules": rules })
        })
        .collect();

    let mut body = json!({
        "type": "VS_TYPE_VH_CHILD",
        "vh_parent_vs_ref": ref_url(ObjectType::VirtualService, &root.name),
        "vh_matches": vh_matches,
        "service_metadata": format!("{}#{}", child.route, child.rule_index),
    });
    if let Some(group) = &child.pool_group {
        body["pool_group_ref"] = json!(ref_url(ObjectType::PoolGroup, &group.name));
    }
    if let Some(policy) = &child.http_policy {
        body["http_policies"] = json!([{
            "index": 11,
            "http_policy_set_ref": ref_url(ObjectType::HttpPolicySet, &policy.name),
        }]);
    }
    body
}

fn root_body(root: &ParentVsNode) -> Value {
    let services: Vec<Value> = root
        .ports
        .iter()
        .map(|p| json!({ "port": p.port, "enable_ssl": p.tls }))
        .collect();
    let cert_refs: Vec<String> = root
        .certificates
        .iter()
        .map(|c| ref_url(ObjectType::SslKeyAndCertificate, &c.name))
        .collect();
    let mut seen = HashSet::new();
    let fqdns: Vec<Value> = root
        .fqdns
        .iter()
        .filter(|f| seen.insert(f.as_str()))
        .map(|f| json!({ "fqdn": f }))
        .collect();

    json!({
        "type": "VS_TYPE_VH_PARENT",
        "vh_type": "VS_TYPE_VH_ENHANCED",
        "services": services,
        "ssl_key_and_certificate_refs": cert_refs,
        "dns_info": fqdns,
    })
}
