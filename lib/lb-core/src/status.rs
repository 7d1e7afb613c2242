//! Status write-back onto GatewayClasses, Gateways and HTTPRoutes
//!
//! Updates are merged per resource while they wait on the status queue, so
//! a burst of rebuilds results in one write carrying the newest conditions.

use crate::index::ClusterIndex;
use crate::key::ObjectName;
use crate::queue::WorkQueue;
use crate::source::ClusterApi;
use lb_api::condition::set_condition;
use lb_api::v1::gateway::{GatewayAddress, GatewayStatus, ListenerStatus};
use lb_api::v1::gateway_class::GatewayClassStatus;
use lb_api::v1::http_route::{HTTPRouteStatus, ParentReference, RouteParentStatus};
use lb_api::Condition;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const CONDITION_ACCEPTED: &str = "Accepted";
pub const CONDITION_PROGRAMMED: &str = "Programmed";
pub const CONDITION_RESOLVED_REFS: &str = "ResolvedRefs";

/// Resource whose status is written
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusTarget {
    GatewayClass(String),
    Gateway(ObjectName),
    HTTPRoute(ObjectName),
}

impl fmt::Display for StatusTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusTarget::GatewayClass(name) => write!(f, "GatewayClass/{}", name),
            StatusTarget::Gateway(name) => write!(f, "Gateway/{}", name),
            StatusTarget::HTTPRoute(name) => write!(f, "HTTPRoute/{}", name),
        }
    }
}

/// One outcome to record
#[derive(Clone, Debug)]
pub enum StatusUpdate {
    GatewayClass {
        name: String,
        conditions: Vec<Condition>,
    },
    Gateway {
        gateway: ObjectName,
        conditions: Vec<Condition>,
        listeners: Option<Vec<ListenerStatus>>,
        addresses: Option<Vec<String>>,
    },
    RouteParent {
        route: ObjectName,
        parent: ParentReference,
        conditions: Vec<Condition>,
    },
}

impl StatusUpdate {
    pub fn target(&self) -> StatusTarget {
        match self {
            StatusUpdate::GatewayClass { name, .. } => StatusTarget::GatewayClass(name.clone()),
            StatusUpdate::Gateway { gateway, .. } => StatusTarget::Gateway(gateway.clone()),
            StatusUpdate::RouteParent { route, .. } => StatusTarget::HTTPRoute(route.clone()),
        }
    }
}

/// Merged, not yet written status for one target
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingStatus {
    pub conditions: Vec<Condition>,
    pub listeners: Option<Vec<ListenerStatus>>,
    pub addresses: Option<Vec<String>>,
    pub parents: Vec<(ParentReference, Vec<Condition>)>,
}

impl PendingStatus {
    fn merge(&mut self, update: StatusUpdate) {
        match update {
            StatusUpdate::GatewayClass { conditions, .. } => {
                for c in conditions {
                    set_condition(&mut self.conditions, c);
                }
            }
            StatusUpdate::Gateway { conditions, listeners, addresses, .. } => {
                for c in conditions {
                    set_condition(&mut self.conditions, c);
                }
                if listeners.is_some() {
                    self.listeners = listeners;
                }
                if addresses.is_some() {
                    self.addresses = addresses;
                }
            }
            StatusUpdate::RouteParent { parent, conditions, .. } => {
                match self.parents.iter_mut().find(|(p, _)| *p == parent) {
                    Some((_, existing)) => {
                        for c in conditions {
                            set_condition(existing, c);
                        }
                    }
                    None => self.parents.push((parent, conditions)),
                }
            }
        }
    }

    /// Condition of `type_` for the given route parent, if pending
    pub fn parent_condition(&self, parent_name: &str, type_: &str) -> Option<&Condition> {
        self.parents
            .iter()
            .find(|(p, _)| p.name == parent_name)
            .and_then(|(_, conditions)| conditions.iter().find(|c| c.type_ == type_))
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

struct PublisherInner {
    queue: Arc<WorkQueue<StatusTarget>>,
    pending: Mutex<HashMap<StatusTarget, PendingStatus>>,
    api: Arc<dyn ClusterApi>,
    index: Arc<ClusterIndex>,
    controller_name: String,
}

/// StatusPublisher queues status outcomes and writes them back to the cluster
#[derive(Clone)]
pub struct StatusPublisher {
    inner: Arc<PublisherInner>,
}

impl StatusPublisher {
    pub fn new(
        queue: Arc<WorkQueue<StatusTarget>>,
        api: Arc<dyn ClusterApi>,
        index: Arc<ClusterIndex>,
        controller_name: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                queue,
                pending: Mutex::new(HashMap::new()),
                api,
                index,
                controller_name: controller_name.into(),
            }),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<StatusTarget>> {
        &self.inner.queue
    }

    /// Merge `update` into the pending status of its target and queue it
    pub async fn publish(&self, update: StatusUpdate) {
        let target = update.target();
        self.inner
            .pending
            .lock()
            .await
            .entry(target.clone())
            .or_default()
            .merge(update);
        self.inner.queue.add(target);
    }

    pub async fn pending(&self, target: &StatusTarget) -> Option<PendingStatus> {
        self.inner.pending.lock().await.get(target).cloned()
    }

    /// Hold the pending map so publishers block until the guard drops
    #[cfg(test)]
    pub(crate) async fn hold(&self) -> tokio::sync::MutexGuard<'_, HashMap<StatusTarget, PendingStatus>> {
        self.inner.pending.lock().await
    }

    /// Write the pending status of `target`. Failures are logged and dropped;
    /// the next rebuild produces a fresh status.
    pub async fn process(&self, target: &StatusTarget) {
        let pending = match self.inner.pending.lock().await.remove(target) {
            Some(pending) => pending,
            None => return,
        };

        let status = match self.render(target, pending).await {
            Some(status) => status,
            None => {
                debug!("Skipping status for {}: object no longer exists", target);
                return;
            }
        };

        match self.inner.api.update_status(target, status).await {
            Ok(()) => debug!("Updated status of {}", target),
            Err(e) => warn!("Failed to update status of {}: {}", target, e),
        }
    }

    /// Merge pending conditions into the object's current status
    async fn render(&self, target: &StatusTarget, pending: PendingStatus) -> Option<serde_json::Value> {
        let state = self.inner.index.read().await;
        let value = match target {
            StatusTarget::GatewayClass(name) => {
                let class = state.gateway_class(name)?;
                let mut status = class.status.clone().unwrap_or_else(GatewayClassStatus::default);
                for c in pending.conditions {
                    set_condition(&mut status.conditions, c);
                }
                serde_json::to_value(status).ok()?
            }
            StatusTarget::Gateway(name) => {
                let gateway = state.gateway(name)?;
                let mut status = gateway.status.clone().unwrap_or_else(GatewayStatus::default);
                for c in pending.conditions {
                    set_condition(&mut status.conditions, c);
                }
                if let Some(listeners) = pending.listeners {
                    status.listeners = merge_listeners(&status.listeners, listeners);
                }
                if let Some(addresses) = pending.addresses {
                    status.addresses = addresses
                        .into_iter()
                        .map(|value| GatewayAddress { type_: Some("IPAddress".to_string()), value })
                        .collect();
                }
                serde_json::to_value(status).ok()?
            }
            StatusTarget::HTTPRoute(name) => {
                let route = state.route(name)?;
                let mut status = route.status.clone().unwrap_or_else(HTTPRouteStatus::default);
                for (parent, conditions) in pending.parents {
                    let entry = status
                        .parents
                        .iter_mut()
                        .find(|p| p.parent_ref == parent && p.controller_name == self.inner.controller_name);
                    match entry {
                        Some(existing) => {
                            for c in conditions {
                                set_condition(&mut existing.conditions, c);
                            }
                        }
                        None => status.parents.push(RouteParentStatus {
                            parent_ref: parent,
                            controller_name: self.inner.controller_name.clone(),
                            conditions,
                        }),
                    }
                }
                serde_json::to_value(status).ok()?
            }
        };
        Some(value)
    }
}

/// New listener statuses, keeping transition times from the previous ones
fn merge_listeners(previous: &[ListenerStatus], next: Vec<ListenerStatus>) -> Vec<ListenerStatus> {
    next.into_iter()
        .map(|mut listener| {
            if let Some(old) = previous.iter().find(|p| p.name == listener.name) {
                let mut conditions = old.conditions.clone();
                for c in listener.conditions {
                    set_condition(&mut conditions, c);
                }
                conditions.retain(|c| {
                    [CONDITION_ACCEPTED, CONDITION_RESOLVED_REFS, CONDITION_PROGRAMMED].contains(&c.type_.as_str())
                });
                listener.conditions = conditions;
            }
            listener
        })
        .collect()
}
