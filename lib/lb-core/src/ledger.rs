//! Last-seen version token per ingestion key

use crate::key::IngestionKey;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// ResourceVersionLedger remembers the newest version processed for each key
/// so identical notifications can be skipped
pub struct ResourceVersionLedger {
    versions: RwLock<HashMap<IngestionKey, String>>,
}

impl ResourceVersionLedger {
    pub fn new() -> Self {
        Self {
            versions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn save(&self, key: &IngestionKey, version: &str) {
        self.versions
            .write()
            .await
            .insert(key.clone(), version.to_string());
        debug!("Ledger {} at version {}", key, version);
    }

    pub async fn get(&self, key: &IngestionKey) -> Option<String> {
        self.versions.read().await.get(key).cloned()
    }

    pub async fn delete(&self, key: &IngestionKey) {
        self.versions.write().await.remove(key);
    }

    /// True when `version` equals the recorded token for `key`
    pub async fn is_unchanged(&self, key: &IngestionKey, version: Option<&str>) -> bool {
        match version {
            Some(version) => self.versions.read().await.get(key).map(String::as_str) == Some(version),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.versions.read().await.len()
    }
}

impl Default for ResourceVersionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ResourceKind;

    #[tokio::test]
    async fn test_unchanged_only_for_same_version() {
        let ledger = ResourceVersionLedger::new();
        let key = IngestionKey::new(ResourceKind::Gateway, "default", "gw");

        assert!(!ledger.is_unchanged(&key, Some("1")).await);
        ledger.save(&key, "1").await;
        assert!(ledger.is_unchanged(&key, Some("1")).await);
        assert!(!ledger.is_unchanged(&key, Some("2")).await);
        assert!(!ledger.is_unchanged(&key, None).await);
    }

    #[tokio::test]
    async fn test_delete_forgets_version() {
        let ledger = ResourceVersionLedger::new();
        let key = IngestionKey::new(ResourceKind::Service, "default", "svc");
        ledger.save(&key, "7").await;
        ledger.delete(&key).await;
        assert_eq!(ledger.get(&key).await, None);
        assert_eq!(ledger.len().await, 0);
    }
}
