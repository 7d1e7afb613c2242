//! Realized-state cache mirroring the load balancer's inventory

use crate::client::{ObjectRef, ObjectType, RemoteObject};
use crate::key::ModelKey;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// Last confirmed state of one remote object
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub object_type: ObjectType,
    pub name: String,
    pub uuid: String,
    /// `None` when the object was adopted without a known checksum
    pub checksum: Option<String>,
    pub model_key: Option<ModelKey>,
    pub references: Vec<ObjectRef>,
    pub vip: Option<String>,
}

impl CacheEntry {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.object_type, self.name.clone())
    }

    pub fn is_child_vs(&self) -> bool {
        crate::client::is_child_vs(self.object_type, &self.references)
    }

    /// Entry for an inventory object; `None` if it lacks a type
    pub fn from_remote(remote: RemoteObject) -> Option<Self> {
        Some(Self {
            object_type: remote.object_type?,
            name: remote.name,
            uuid: remote.uuid,
            checksum: remote.checksum,
            model_key: remote.model_key,
            references: remote.references,
            vip: remote.vip,
        })
    }
}

/// RealizedStateCache holds what the load balancer is known to contain
pub struct RealizedStateCache {
    entries: RwLock<HashMap<ObjectRef, CacheEntry>>,
}

impl RealizedStateCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, object: &ObjectRef) -> Option<CacheEntry> {
        self.entries.read().await.get(object).cloned()
    }

    pub async fn put(&self, entry: CacheEntry) {
        debug!("Cached {}/{} ({})", entry.object_type, entry.name, entry.uuid);
        self.entries.write().await.insert(entry.object_ref(), entry);
    }

    pub async fn delete(&self, object: &ObjectRef) -> Option<CacheEntry> {
        self.entries.write().await.remove(object)
    }

    pub async fn get_all(&self) -> Vec<CacheEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn entries_for_model(&self, key: &ModelKey) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.model_key.as_ref() == Some(key))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.object_ref().cmp(&b.object_ref()));
        entries
    }

    /// Model keys owning at least one cached object
    pub async fn model_keys(&self) -> BTreeSet<ModelKey> {
        self.entries
            .read()
            .await
            .values()
            .filter_map(|e| e.model_key.clone())
            .collect()
    }

    /// Replace the whole cache with a fresh inventory
    pub async fn replace_all(&self, entries: Vec<CacheEntry>) {
        let mut map = self.entries.write().await;
        map.clear();
        for entry in entries {
            map.insert(entry.object_ref(), entry);
        }
        debug!("Cache refreshed with {} objects", map.len());
    }

    /// Replace every entry of one model key in a single step
    pub async fn replace_model(&self, key: &ModelKey, entries: Vec<CacheEntry>) {
        let mut map = self.entries.write().await;
        map.retain(|_, e| e.model_key.as_ref() != Some(key));
        for entry in entries {
            map.insert(entry.object_ref(), entry);
        }
    }
}

impl Default for RealizedStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(object_type: ObjectType, name: &str, model: &str) -> CacheEntry {
        CacheEntry {
            object_type,
            name: name.to_string(),
            uuid: format!("{}-uuid", name),
            checksum: Some("abc".to_string()),
            model_key: Some(ModelKey::from(model)),
            references: vec![],
            vip: None,
        }
    }

    #[tokio::test]
    async fn test_entries_for_model() {
        let cache = RealizedStateCache::new();
        cache.put(entry(ObjectType::Pool, "p1", "admin/a")).await;
        cache.put(entry(ObjectType::VirtualService, "vs", "admin/a")).await;
        cache.put(entry(ObjectType::Pool, "p2", "admin/b")).await;

        let a = cache.entries_for_model(&ModelKey::from("admin/a")).await;
        assert_eq!(a.len(), 2);
        assert_eq!(cache.model_keys().await.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_model_leaves_other_models() {
        let cache = RealizedStateCache::new();
        cache.put(entry(ObjectType::Pool, "p1", "admin/a")).await;
        cache.put(entry(ObjectType::Pool, "p2", "admin/b")).await;

        cache
            .replace_model(&ModelKey::from("admin/a"), vec![entry(ObjectType::Pool, "p3", "admin/a")])
            .await;

        assert!(cache.get(&ObjectRef::new(ObjectType::Pool, "p1")).await.is_none());
        assert!(cache.get(&ObjectRef::new(ObjectType::Pool, "p2")).await.is_some());
        assert!(cache.get(&ObjectRef::new(ObjectType::Pool, "p3")).await.is_some());
    }

    #[tokio::test]
    async fn test_replace_all() {
        let cache = RealizedStateCache::new();
        cache.put(entry(ObjectType::Pool, "p1", "admin/a")).await;
        cache.replace_all(vec![entry(ObjectType::Pool, "p2", "admin/a")]).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&ObjectRef::new(ObjectType::Pool, "p2")).await.is_some());
    }

    #[test]
    fn test_from_remote_requires_type() {
        let remote = RemoteObject { name: "x".into(), uuid: "u".into(), ..Default::default() };
        assert!(CacheEntry::from_remote(remote).is_none());
    }
}
