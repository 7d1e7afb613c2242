//! Keyed store of desired graphs

use super::model::ObjectGraph;
use crate::key::{ModelKey, ObjectName};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// ObjectGraphStore maps each model key to its current desired graph.
///
/// Graphs are immutable once published; an update swaps the `Arc`, so a
/// reader holds either the previous graph or the new one, never a mix.
pub struct ObjectGraphStore {
    graphs: RwLock<HashMap<ModelKey, Arc<ObjectGraph>>>,
}

impl ObjectGraphStore {
    pub fn new() -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &ModelKey) -> Option<Arc<ObjectGraph>> {
        self.graphs.read().await.get(key).cloned()
    }

    /// Publish a graph; returns true if it differs from the stored one
    pub async fn put(&self, graph: ObjectGraph) -> bool {
        let mut graphs = self.graphs.write().await;
        if let Some(existing) = graphs.get(&graph.model_key) {
            if **existing == graph {
                return false;
            }
        }
        debug!("Stored graph for {} ({} children)", graph.model_key, graph.root.children.len());
        graphs.insert(graph.model_key.clone(), Arc::new(graph));
        true
    }

    /// Remove a graph; returns true if one was stored
    pub async fn delete(&self, key: &ModelKey) -> bool {
        let removed = self.graphs.write().await.remove(key).is_some();
        if removed {
            debug!("Deleted graph for {}", key);
        }
        removed
    }

    pub async fn get_all(&self) -> Vec<Arc<ObjectGraph>> {
        self.graphs.read().await.values().cloned().collect()
    }

    pub async fn keys(&self) -> BTreeSet<ModelKey> {
        self.graphs.read().await.keys().cloned().collect()
    }

    /// Gateways whose graph currently contains children generated from `route`
    pub async fn gateways_referencing_route(&self, route: &ObjectName) -> Vec<ObjectName> {
        self.graphs
            .read()
            .await
            .values()
            .filter(|g| g.references_route(route))
            .map(|g| g.gateway.clone())
            .collect()
    }

    /// Gateways whose graph currently contains pools backed by `service`
    pub async fn gateways_referencing_service(&self, service: &ObjectName) -> Vec<ObjectName> {
        self.graphs
            .read()
            .await
            .values()
            .filter(|g| g.references_service(service))
            .map(|g| g.gateway.clone())
            .collect()
    }

    /// Gateways that currently have a graph
    pub async fn gateways(&self) -> Vec<ObjectName> {
        self.graphs.read().await.values().map(|g| g.gateway.clone()).collect()
    }
}

impl Default for ObjectGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::ParentVsNode;

    fn graph(key: &str, fqdn: &str) -> ObjectGraph {
        ObjectGraph {
            model_key: ModelKey::from(key),
            gateway: ObjectName::new("default", "gw"),
            root: ParentVsNode {
                name: "root".into(),
                tenant: "admin".into(),
                ports: vec![],
                fqdns: vec![fqdn.to_string()],
                certificates: vec![],
                children: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_put_reports_change() {
        let store = ObjectGraphStore::new();
        assert!(store.put(graph("admin/a", "foo.com")).await);
        assert!(!store.put(graph("admin/a", "foo.com")).await);
        assert!(store.put(graph("admin/a", "bar.com")).await);
        assert_eq!(store.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_readers_keep_previous_snapshot() {
        let store = ObjectGraphStore::new();
        store.put(graph("admin/a", "foo.com")).await;
        let before = store.get(&ModelKey::from("admin/a")).await.unwrap();

        store.put(graph("admin/a", "bar.com")).await;
        assert_eq!(before.root.fqdns, vec!["foo.com"]);

        let after = store.get(&ModelKey::from("admin/a")).await.unwrap();
        assert_eq!(after.root.fqdns, vec!["bar.com"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = ObjectGraphStore::new();
        store.put(graph("admin/a", "foo.com")).await;
        assert!(store.delete(&ModelKey::from("admin/a")).await);
        assert!(!store.delete(&ModelKey::from("admin/a")).await);
        assert!(store.keys().await.is_empty());
    }
}
