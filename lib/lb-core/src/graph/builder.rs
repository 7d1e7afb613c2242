//! Graph builder: turns one ingestion key into rebuilt Gateway graphs
//!
//! Every affected Gateway is rebuilt from the current index as a whole and
//! swapped into the store in one step, so the sync engine never observes a
//! half-built graph.

use super::matching::{
    child_name, effective_hostnames, header_criteria, intersect_hostname, path_match, sort_children,
    sort_path_rules,
};
use super::model::*;
use super::store::ObjectGraphStore;
use super::validate::{
    is_claimed, validate_gateway, validate_route, GatewayValidation, Rejection, PROTOCOL_HTTPS,
};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::index::{backend_service, parent_gateway, ClusterIndex, IndexState};
use crate::key::{IngestionKey, ModelKey, ObjectName, ResourceKind};
use crate::ledger::ResourceVersionLedger;
use crate::metrics::SyncMetrics;
use crate::queue::WorkQueue;
use crate::status::{
    StatusPublisher, StatusUpdate, CONDITION_ACCEPTED, CONDITION_RESOLVED_REFS,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use lb_api::v1::gateway::{ListenerStatus, RouteGroupKind};
use lb_api::v1::http_route::{HTTPRouteFilter, HTTPRouteRule, ParentReference};
use lb_api::v1::API_GROUP;
use lb_api::{Condition, Gateway, HTTPRoute};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Children and listener bookkeeping contributed by one route to one Gateway
struct RouteContribution {
    children: Vec<ChildVsNode>,
    listeners: BTreeSet<String>,
}

/// What a rebuild decided for one Gateway, applied once the index is released
enum Rebuild {
    Put(ObjectGraph),
    Retract(ModelKey),
    Unchanged,
}

/// GraphBuilder resolves the Gateways affected by a change and rebuilds them
pub struct GraphBuilder {
    tenant: String,
    cluster: String,
    controller_name: String,
    index: Arc<ClusterIndex>,
    ledger: Arc<ResourceVersionLedger>,
    store: Arc<ObjectGraphStore>,
    status: StatusPublisher,
    graph_queue: Arc<WorkQueue<ModelKey>>,
    metrics: SyncMetrics,
    build_lock: Mutex<()>,
}

impl GraphBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &ControllerConfig,
        index: Arc<ClusterIndex>,
        ledger: Arc<ResourceVersionLedger>,
        store: Arc<ObjectGraphStore>,
        status: StatusPublisher,
        graph_queue: Arc<WorkQueue<ModelKey>>,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            tenant: config.tenant.clone(),
            cluster: config.cluster_name.clone(),
            controller_name: config.controller_name.clone(),
            index,
            ledger,
            store,
            status,
            graph_queue,
            metrics,
            build_lock: Mutex::new(()),
        }
    }

    pub fn model_key(&self, gateway: &ObjectName) -> ModelKey {
        ModelKey::for_gateway(&self.tenant, &self.cluster, gateway)
    }

    /// Rebuild everything `key` affects.
    ///
    /// Returns the model keys whose graph changed. Outside of full-sync mode
    /// those keys are also queued for REST sync.
    pub async fn process(&self, key: &IngestionKey, full_sync: bool) -> Result<Vec<ModelKey>> {
        let _guard = self.build_lock.lock().await;
        let referencing = match key.kind {
            ResourceKind::HTTPRoute => self.store.gateways_referencing_route(&key.object).await,
            ResourceKind::Service | ResourceKind::Endpoints => {
                self.store.gateways_referencing_service(&key.object).await
            }
            _ => Vec::new(),
        };

        // Nothing below awaits while the index is read-locked.
        let mut updates = Vec::new();
        let (gateways, rebuilds, version) = {
            let state = self.index.read().await;
            let gateways = self.affected_gateways(&state, key, referencing, &mut updates);
            let mut rebuilds = Vec::with_capacity(gateways.len());
            for gateway in &gateways {
                rebuilds.push(self.rebuild_gateway(&state, gateway, &mut updates));
            }
            (gateways, rebuilds, current_version(&state, key))
        };

        for update in updates {
            self.status.publish(update).await;
        }
        let mut changed = Vec::new();
        for rebuild in rebuilds {
            if let Some(model_key) = self.apply(rebuild).await {
                changed.push(model_key);
            }
        }

        match version {
            Some(version) => self.ledger.save(key, &version).await,
            None => self.ledger.delete(key).await,
        }

        self.metrics.graph_builds_total.inc();
        debug!(
            "Processed {} (full_sync={}): {} gateways, {} changed",
            key,
            full_sync,
            gateways.len(),
            changed.len()
        );

        if !full_sync {
            for model_key in &changed {
                self.graph_queue.add(model_key.clone());
            }
        }
        Ok(changed)
    }

    /// Drop graphs whose Gateway is not among `live`; returns the dropped keys
    pub async fn prune(&self, live: &BTreeSet<ModelKey>) -> Vec<ModelKey> {
        let _guard = self.build_lock.lock().await;
        let mut pruned = Vec::new();
        for key in self.store.keys().await {
            if !live.contains(&key) && self.store.delete(&key).await {
                info!("Pruned graph for {}", key);
                pruned.push(key);
            }
        }
        pruned
    }

    /// Gateways owned by this controller in the current index
    pub async fn owned_gateways(&self) -> BTreeSet<ObjectName> {
        let state = self.index.read().await;
        state
            .gateways()
            .filter(|(_, gw)| {
                state
                    .gateway_class(&gw.spec.gateway_class_name)
                    .map_or(false, |class| is_claimed(&class, &self.controller_name))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Gateways touched by `key`; `referencing` are those whose stored graph
    /// already uses the route or service
    fn affected_gateways(
        &self,
        state: &IndexState,
        key: &IngestionKey,
        referencing: Vec<ObjectName>,
        updates: &mut Vec<StatusUpdate>,
    ) -> BTreeSet<ObjectName> {
        let mut gateways: BTreeSet<ObjectName> = referencing.into_iter().collect();
        match key.kind {
            ResourceKind::GatewayClass => {
                if let Some(class) = state.gateway_class(key.name()) {
                    if is_claimed(&class, &self.controller_name) {
                        updates.push(StatusUpdate::GatewayClass {
                            name: key.name().to_string(),
                            conditions: vec![Condition::new(
                                CONDITION_ACCEPTED,
                                true,
                                "Accepted",
                                "GatewayClass is managed by this controller",
                                class.metadata.generation,
                            )],
                        });
                    }
                }
                gateways.extend(state.gateways_for_class(key.name()));
            }
            ResourceKind::Gateway => {
                gateways.insert(key.object.clone());
            }
            ResourceKind::HTTPRoute => {
                if let Some(route) = state.route(&key.object) {
                    gateways.extend(
                        route
                            .spec
                            .parent_refs
                            .iter()
                            .filter_map(|p| parent_gateway(key.namespace(), p)),
                    );
                }
            }
            ResourceKind::Service | ResourceKind::Endpoints => {
                for route in state.routes_for_service(&key.object) {
                    let namespace = route.metadata.namespace.clone().unwrap_or_default();
                    gateways.extend(
                        route
                            .spec
                            .parent_refs
                            .iter()
                            .filter_map(|p| parent_gateway(&namespace, p)),
                    );
                }
            }
            ResourceKind::Secret => {
                gateways.extend(state.gateways_for_secret(&key.object));
            }
        }
        gateways
    }

    /// Store the outcome of a rebuild; returns the key if the stored graph changed
    async fn apply(&self, rebuild: Rebuild) -> Option<ModelKey> {
        match rebuild {
            Rebuild::Put(graph) => {
                let model_key = graph.model_key.clone();
                self.store.put(graph).await.then_some(model_key)
            }
            Rebuild::Retract(model_key) => {
                if self.store.delete(&model_key).await {
                    info!("Retracted graph for {}", model_key);
                    Some(model_key)
                } else {
                    None
                }
            }
            Rebuild::Unchanged => None,
        }
    }

    /// Rebuild one Gateway's graph from the index
    fn rebuild_gateway(&self, state: &IndexState, name: &ObjectName, updates: &mut Vec<StatusUpdate>) -> Rebuild {
        let model_key = self.model_key(name);

        let gateway = match state.gateway(name) {
            Some(gateway) => gateway,
            None => return Rebuild::Retract(model_key),
        };
        let claimed = state
            .gateway_class(&gateway.spec.gateway_class_name)
            .map_or(false, |class| is_claimed(&class, &self.controller_name));
        if !claimed {
            return Rebuild::Retract(model_key);
        }

        let generation = gateway.metadata.generation;
        let validation = validate_gateway(&gateway);
        if let Some(rejection) = &validation.rejection {
            info!("Gateway {} rejected: {}", name, rejection.message);
            updates.push(StatusUpdate::Gateway {
                gateway: name.clone(),
                conditions: vec![Condition::new(
                    CONDITION_ACCEPTED,
                    false,
                    &rejection.reason,
                    rejection.message.clone(),
                    generation,
                )],
                listeners: Some(listener_statuses(&gateway, &validation, &BTreeMap::new(), &BTreeSet::new())),
                addresses: None,
            });
            return Rebuild::Unchanged;
        }

        let root_name = format!("{}--{}-{}-EVH", self.cluster, name.namespace, name.name);
        let (certificates, unresolved_listeners) =
            Self::certificates(state, &gateway, &validation, name, &root_name);

        let mut children = Vec::new();
        let mut attached: BTreeMap<String, i32> = BTreeMap::new();
        for route in state.routes_for_gateway(name) {
            let contribution = self.attach_route(state, name, &gateway, &validation, &root_name, &route, updates);
            for listener in contribution.listeners {
                *attached.entry(listener).or_default() += 1;
            }
            children.extend(contribution.children);
        }
        sort_children(&mut children);

        let mut fqdns: Vec<String> = Vec::new();
        for host in children.iter().flat_map(|c| c.vh_matches.iter().map(|m| &m.host)) {
            if !fqdns.contains(host) {
                fqdns.push(host.clone());
            }
        }

        let mut ports: Vec<ListenerPort> = gateway
            .spec
            .listeners
            .iter()
            .filter(|l| validation.is_listener_valid(&l.name))
            .map(|l| ListenerPort { port: l.port, tls: l.protocol == PROTOCOL_HTTPS })
            .collect();
        ports.sort();
        ports.dedup();

        updates.push(StatusUpdate::Gateway {
            gateway: name.clone(),
            conditions: vec![Condition::new(CONDITION_ACCEPTED, true, "Accepted", "", generation)],
            listeners: Some(listener_statuses(&gateway, &validation, &attached, &unresolved_listeners)),
            addresses: None,
        });

        Rebuild::Put(ObjectGraph {
            model_key: model_key.clone(),
            gateway: name.clone(),
            root: ParentVsNode {
                name: root_name,
                tenant: self.tenant.clone(),
                ports,
                fqdns,
                certificates,
                children,
            },
        })
    }

    /// Certificates of valid HTTPS listeners, and listeners with missing secrets
    fn certificates(
        state: &IndexState,
        gateway: &Gateway,
        validation: &GatewayValidation,
        name: &ObjectName,
        root_name: &str,
    ) -> (Vec<CertificateNode>, BTreeSet<String>) {
        let mut certificates: Vec<CertificateNode> = Vec::new();
        let mut unresolved = BTreeSet::new();

        for listener in gateway.spec.listeners.iter().filter(|l| {
            l.protocol == PROTOCOL_HTTPS && validation.is_listener_valid(&l.name)
        }) {
            let refs = listener.tls.iter().flat_map(|tls| tls.certificate_refs.iter());
            for cert_ref in refs {
                if cert_ref.kind.as_deref().map_or(false, |k| k != "Secret") {
                    unresolved.insert(listener.name.clone());
                    continue;
                }
                let secret_name = ObjectName::new(
                    cert_ref.namespace.as_deref().unwrap_or(&name.namespace),
                    cert_ref.name.as_str(),
                );
                let data = state.secret(&secret_name).and_then(|s| s.data.clone());
                let (cert, key) = match data.as_ref().map(|d| (d.get("tls.crt"), d.get("tls.key"))) {
                    Some((Some(cert), Some(key))) => (
                        String::from_utf8_lossy(&cert.0).into_owned(),
                        String::from_utf8_lossy(&key.0).into_owned(),
                    ),
                    _ => {
                        unresolved.insert(listener.name.clone());
                        continue;
                    }
                };
                let cert_name = format!("{}--{}-{}", root_name, secret_name.namespace, secret_name.name);
                if certificates.iter().all(|c| c.name != cert_name) {
                    certificates.push(CertificateNode {
                        name: cert_name,
                        secret: secret_name,
                        certificate: cert,
                        key,
                    });
                }
            }
        }
        (certificates, unresolved)
    }

    /// Children one route contributes to one Gateway, plus per-parent status
    #[allow(clippy::too_many_arguments)]
    fn attach_route(
        &self,
        state: &IndexState,
        gateway_name: &ObjectName,
        gateway: &Gateway,
        validation: &GatewayValidation,
        root_name: &str,
        route: &HTTPRoute,
        updates: &mut Vec<StatusUpdate>,
    ) -> RouteContribution {
        let route_name = ObjectName::new(
            route.metadata.namespace.clone().unwrap_or_default(),
            route.metadata.name.clone().unwrap_or_default(),
        );
        let generation = route.metadata.generation;
        let parents: Vec<&ParentReference> = route
            .spec
            .parent_refs
            .iter()
            .filter(|p| parent_gateway(&route_name.namespace, p).as_ref() == Some(gateway_name))
            .collect();

        let mut contribution = RouteContribution { children: Vec::new(), listeners: BTreeSet::new() };

        if let Err(rejection) = validate_route(route) {
            info!("HTTPRoute {} rejected: {}", route_name, rejection.message);
            for parent in parents {
                updates.push(route_parent_status(&route_name, parent, Err(&rejection), Ok(()), generation));
            }
            return contribution;
        }

        // Host -> listener ports, across every parent ref naming this Gateway.
        let mut hosts: Vec<(String, BTreeSet<u16>)> = Vec::new();
        let mut outcomes: Vec<(&ParentReference, std::result::Result<(), Rejection>)> = Vec::new();

        for parent in parents {
            let listeners: Vec<&lb_api::v1::Listener> = gateway
                .spec
                .listeners
                .iter()
                .filter(|l| validation.is_listener_valid(&l.name))
                .filter(|l| parent.section_name.as_ref().map_or(true, |s| *s == l.name))
                .filter(|l| parent.port.map_or(true, |p| p == l.port))
                .collect();
            if listeners.is_empty() {
                outcomes.push((
                    parent,
                    Err(Rejection::new("NoMatchingParent", "no valid listener matches the parent reference")),
                ));
                continue;
            }

            let listener_hosts: Vec<Option<&str>> = listeners.iter().map(|l| l.hostname.as_deref()).collect();
            let effective = effective_hostnames(&route.spec.hostnames, &listener_hosts);
            if effective.is_empty() {
                outcomes.push((
                    parent,
                    Err(Rejection::new(
                        "NoMatchingListenerHostname",
                        "no route hostname matches an attached listener",
                    )),
                ));
                continue;
            }

            for host in effective {
                let ports: Vec<u16> = listeners
                    .iter()
                    .filter(|l| intersect_hostname(l.hostname.as_deref(), &host).is_some())
                    .map(|l| {
                        contribution.listeners.insert(l.name.clone());
                        l.port
                    })
                    .collect();
                match hosts.iter_mut().find(|(h, _)| *h == host) {
                    Some((_, existing)) => existing.extend(ports),
                    None => hosts.push((host, ports.into_iter().collect())),
                }
            }
            outcomes.push((parent, Ok(())));
        }

        let mut unresolved = Vec::new();
        if !hosts.is_empty() {
            for (index, rule) in route.spec.rules.iter().enumerate() {
                let child = self.build_child(state, root_name, &route_name, index, rule, &hosts, &mut unresolved);
                contribution.children.push(child);
            }
        }

        let resolved = if unresolved.is_empty() {
            Ok(())
        } else {
            Err(Rejection::new(
                "BackendNotFound",
                format!("unresolved backends: {}", unresolved.join(", ")),
            ))
        };
        for (parent, outcome) in outcomes {
            updates.push(route_parent_status(
                &route_name,
                parent,
                outcome.as_ref().map(|_| ()),
                resolved.clone(),
                generation,
            ));
        }
        contribution
    }

    #[allow(clippy::too_many_arguments)]
    fn build_child(
        &self,
        state: &IndexState,
        root_name: &str,
        route: &ObjectName,
        rule_index: usize,
        rule: &HTTPRouteRule,
        hosts: &[(String, BTreeSet<u16>)],
        unresolved: &mut Vec<String>,
    ) -> ChildVsNode {
        let name = child_name(root_name, &route.namespace, &route.name, rule_index);

        let vh_matches = hosts
            .iter()
            .map(|(host, ports)| {
                let ports: Vec<u16> = ports.iter().copied().collect();
                let mut rules: Vec<PathRule> = if rule.matches.is_empty() {
                    vec![PathRule {
                        name: format!("{}-match-0", name),
                        path: path_match(None),
                        headers: Vec::new(),
                        method: None,
                        ports: ports.clone(),
                    }]
                } else {
                    rule.matches
                        .iter()
                        .enumerate()
                        .map(|(i, m)| PathRule {
                            name: format!("{}-match-{}", name, i),
                            path: path_match(m.path.as_ref()),
                            headers: m
                                .headers
                                .iter()
                                .map(|h| HeaderMatch {
                                    name: h.name.clone(),
                                    criteria: header_criteria(h),
                                    value: h.value.clone(),
                                })
                                .collect(),
                            method: m.method.clone(),
                            ports: ports.clone(),
                        })
                        .collect()
                };
                sort_path_rules(&mut rules);
                VhMatch { host: host.clone(), rules }
            })
            .collect();

        let mut pools = Vec::new();
        let mut members = Vec::new();
        for backend in &rule.backend_refs {
            let weight = backend.weight.unwrap_or(1);
            if weight <= 0 {
                continue;
            }
            let pool = backend_service(&route.namespace, backend)
                .and_then(|service| resolve_pool(state, &name, service, backend.port));
            match pool {
                Some(pool) => {
                    members.push(PoolGroupMember { pool: pool.name.clone(), ratio: weight as u32 });
                    pools.push(pool);
                }
                None => unresolved.push(format!(
                    "{}/{}",
                    backend.namespace.as_deref().unwrap_or(&route.namespace),
                    backend.name
                )),
            }
        }
        let pool_group = (!members.is_empty()).then(|| PoolGroupNode { name: name.clone(), members });

        ChildVsNode {
            http_policy: build_policy(&name, &rule.filters),
            name,
            route: route.clone(),
            rule_index,
            vh_matches,
            pool_group,
            pools,
        }
    }
}

fn route_parent_status(
    route: &ObjectName,
    parent: &ParentReference,
    accepted: std::result::Result<(), &Rejection>,
    resolved: std::result::Result<(), Rejection>,
    generation: Option<i64>,
) -> StatusUpdate {
    let accepted = match accepted {
        Ok(()) => Condition::new(CONDITION_ACCEPTED, true, "Accepted", "", generation),
        Err(r) => Condition::new(CONDITION_ACCEPTED, false, &r.reason, r.message.clone(), generation),
    };
    let resolved = match resolved {
        Ok(()) => Condition::new(CONDITION_RESOLVED_REFS, true, "ResolvedRefs", "", generation),
        Err(r) => Condition::new(CONDITION_RESOLVED_REFS, false, &r.reason, r.message, generation),
    };
    StatusUpdate::RouteParent {
        route: route.clone(),
        parent: parent.clone(),
        conditions: vec![accepted, resolved],
    }
}

fn current_version(state: &IndexState, key: &IngestionKey) -> Option<String> {
    match key.kind {
        ResourceKind::GatewayClass => state.gateway_class(key.name())?.metadata.resource_version.clone(),
        ResourceKind::Gateway => state.gateway(&key.object)?.metadata.resource_version.clone(),
        ResourceKind::HTTPRoute => state.route(&key.object)?.metadata.resource_version.clone(),
        ResourceKind::Service => state.service(&key.object)?.metadata.resource_version.clone(),
        ResourceKind::Endpoints => state.endpoints(&key.object)?.metadata.resource_version.clone(),
        ResourceKind::Secret => state.secret(&key.object)?.metadata.resource_version.clone(),
    }
}

/// Pool for a Service backend, or `None` if the service, port or ready
/// endpoints cannot be resolved
fn resolve_pool(state: &IndexState, child: &str, service: ObjectName, port: Option<u16>) -> Option<PoolNode> {
    let svc = state.service(&service)?;
    let svc_ports = svc.spec.as_ref()?.ports.as_ref()?;
    let svc_port = match port {
        Some(port) => svc_ports.iter().find(|p| p.port == i32::from(port))?,
        None if svc_ports.len() == 1 => &svc_ports[0],
        None => return None,
    };

    let fallback_target = match &svc_port.target_port {
        Some(IntOrString::Int(port)) => u16::try_from(*port).ok()?,
        _ => u16::try_from(svc_port.port).ok()?,
    };

    let endpoints = state.endpoints(&service)?;
    let mut servers = Vec::new();
    for subset in endpoints.subsets.iter().flatten() {
        let subset_ports = subset.ports.as_deref().unwrap_or_default();
        let ep_port = subset_ports.iter().find(|p| match (&svc_port.name, &p.name) {
            (Some(a), Some(b)) => a == b,
            _ => subset_ports.len() == 1,
        });
        let Some(ep_port) = ep_port.and_then(|p| u16::try_from(p.port).ok()) else {
            continue;
        };
        for address in subset.addresses.iter().flatten() {
            servers.push(Server { ip: address.ip.clone(), port: ep_port });
        }
    }
    if servers.is_empty() {
        return None;
    }
    servers.sort();
    servers.dedup();

    let port = u16::try_from(svc_port.port).ok()?;
    Some(PoolNode {
        name: format!("{}-{}-{}-{}", child, service.namespace, service.name, port),
        target_port: servers.first().map_or(fallback_target, |s| s.port),
        service,
        port,
        servers,
    })
}

/// HTTP policy for a rule's filters; `None` when the rule has no filters that
/// produce actions
fn build_policy(name: &str, filters: &[HTTPRouteFilter]) -> Option<HttpPolicyNode> {
    let mut request_actions = Vec::new();
    let mut response_actions = Vec::new();
    let mut redirect = None;

    for filter in filters {
        if let Some(modifier) = &filter.request_header_modifier {
            request_actions.extend(header_actions(modifier));
        }
        if let Some(modifier) = &filter.response_header_modifier {
            response_actions.extend(header_actions(modifier));
        }
        if let Some(r) = &filter.request_redirect {
            redirect.get_or_insert_with(|| RedirectAction {
                protocol: r.scheme.as_ref().map(|s| s.to_ascii_uppercase()),
                host: r.hostname.clone(),
                port: r.port,
                status_code: format!("HTTP_REDIRECT_STATUS_CODE_{}", r.status_code.unwrap_or(302)),
            });
        }
    }

    let mut request_rules = Vec::new();
    if !request_actions.is_empty() || redirect.is_some() {
        request_rules.push(PolicyRule { name: name.to_string(), header_actions: request_actions, redirect });
    }
    let mut response_rules = Vec::new();
    if !response_actions.is_empty() {
        response_rules.push(PolicyRule {
            name: name.to_string(),
            header_actions: response_actions,
            redirect: None,
        });
    }

    if request_rules.is_empty() && response_rules.is_empty() {
        return None;
    }
    Some(HttpPolicyNode { name: name.to_string(), request_rules, response_rules })
}

/// Header actions in add, replace, remove order
fn header_actions(modifier: &lb_api::v1::http_route::HTTPHeaderFilter) -> Vec<HeaderAction> {
    let add = modifier.add.iter().map(|h| HeaderAction {
        action: HeaderActionKind::Add,
        name: h.name.clone(),
        value: Some(h.value.clone()),
    });
    let set = modifier.set.iter().map(|h| HeaderAction {
        action: HeaderActionKind::Replace,
        name: h.name.clone(),
        value: Some(h.value.clone()),
    });
    let remove = modifier.remove.iter().map(|h| HeaderAction {
        action: HeaderActionKind::Remove,
        name: h.clone(),
        value: None,
    });
    add.chain(set).chain(remove).collect()
}

fn listener_statuses(
    gateway: &Gateway,
    validation: &GatewayValidation,
    attached: &BTreeMap<String, i32>,
    unresolved: &BTreeSet<String>,
) -> Vec<ListenerStatus> {
    let generation = gateway.metadata.generation;
    gateway
        .spec
        .listeners
        .iter()
        .zip(validation.listeners.iter())
        .map(|(listener, check)| {
            let accepted = match &check.rejection {
                None => Condition::new(CONDITION_ACCEPTED, true, "Accepted", "", generation),
                Some(r) => Condition::new(CONDITION_ACCEPTED, false, &r.reason, r.message.clone(), generation),
            };
            let resolved = if unresolved.contains(&listener.name) {
                Condition::new(
                    CONDITION_RESOLVED_REFS,
                    false,
                    "InvalidCertificateRef",
                    "certificate secret not found or incomplete",
                    generation,
                )
            } else {
                Condition::new(CONDITION_RESOLVED_REFS, true, "ResolvedRefs", "", generation)
            };
            ListenerStatus {
                name: listener.name.clone(),
                attached_routes: attached.get(&listener.name).copied().unwrap_or(0),
                supported_kinds: vec![RouteGroupKind {
                    group: Some(API_GROUP.to_string()),
                    kind: "HTTPRoute".to_string(),
                }],
                conditions: vec![accepted, resolved],
            }
        })
        .collect()
}
