//! Cache Collaborator
//!
//! Hash-map style store keyed by string, used for `memory:<id>` records and
//! `namespace:<name>` metadata. The contract mirrors redis hashes: field
//! set/get-all/delete plus an atomic increment, which is what keeps the
//! namespace counters correct under concurrent writers.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// External cache store collaborator.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Set multiple fields on a hash, creating it if absent.
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<()>;

    /// All fields of a hash, or None when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>>;

    /// Set one field on a hash.
    async fn hash_set_field(&self, key: &str, field: &str, value: String) -> Result<()>;

    /// Remove one field. Returns whether it existed.
    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool>;

    /// Atomically add `by` to an integer field (missing counts as 0) and
    /// return the new value. Must be a single atomic operation, not
    /// read-modify-write.
    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64>;

    /// Delete an entire key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Cache key for a stored record.
pub fn memory_key(id: &str) -> String {
    format!("memory:{id}")
}

/// Cache key for namespace metadata.
pub fn namespace_key(namespace: &str) -> String {
    format!("namespace:{namespace}")
}

/// Cache key for the roster hash mapping record id -> lifecycle state within
/// a namespace. Enables enumeration without a scan primitive.
pub fn roster_key(namespace: &str) -> String {
    format!("namespace:{namespace}:records")
}

/// In-process cache used by tests and single-node deployments.
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        let mut entries = self.entries.write().await;
        let hash = entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field, value);
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .get_mut(key)
            .map(|hash| hash.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        // Single write lock for the whole read-add-write, so concurrent
        // increments serialize.
        let mut entries = self.entries.write().await;
        let hash = entries.entry(key.to_string()).or_default();
        let current = hash
            .get(field)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + by;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_ops() {
        let cache = InMemoryCache::new();
        cache
            .hash_set("memory:1", vec![("a".into(), "1".into()), ("b".into(), "2".into())])
            .await
            .unwrap();
        let all = cache.hash_get_all("memory:1").await.unwrap().unwrap();
        assert_eq!(all.len(), 2);
        assert!(cache.hash_delete_field("memory:1", "a").await.unwrap());
        assert!(!cache.hash_delete_field("memory:1", "a").await.unwrap());
        assert!(cache.hash_get_all("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_increments_serialize() {
        let cache = Arc::new(InMemoryCache::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.hash_increment("namespace:x", "memory_count", 1).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let all = cache.hash_get_all("namespace:x").await.unwrap().unwrap();
        assert_eq!(all.get("memory_count").unwrap(), "32");
    }
}
