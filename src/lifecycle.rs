//! Lifecycle Manager
//!
//! Archive, restore, and permanent cleanup of records, plus storage
//! statistics. Archived records stay in the index with an Archived state so
//! default search skips them; Deleted is terminal. Bulk operations check a
//! cancel flag between records and are safe to resume, since each per-record
//! action is idempotent.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{memory_key, roster_key, CacheStore};
use crate::config::EmployeeDirectory;
use crate::error::{MemoryError, Result};
use crate::index::{VectorEntry, VectorIndex, VectorMetadata};
use crate::namespace::{derive_namespace, NamespaceRegistry};
use crate::record::LifecycleState;
use crate::store::CachedRecord;

/// Cooperative cancellation handle for bulk operations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Selection thresholds for cleanup. Unset fields fall back to engine
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct CleanupPolicy {
    pub max_memories: Option<usize>,
    pub min_importance: Option<f64>,
    pub max_age_days: Option<i64>,
    pub dry_run: bool,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub examined: usize,
    /// Ids selected for archival (age or count cap).
    pub archive_candidates: Vec<String>,
    /// Ids selected for permanent deletion (below importance threshold).
    pub delete_candidates: Vec<String>,
    pub archived: usize,
    pub deleted: usize,
    pub estimated_bytes_freed: u64,
    pub dry_run: bool,
    pub cancelled: bool,
}

/// Per-namespace storage statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub namespace: String,
    /// Lifetime writes (monotonic).
    pub lifetime_memory_count: u64,
    pub active: usize,
    pub archived: usize,
    pub indexed_vectors: usize,
    pub estimated_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<chrono::DateTime<Utc>>,
}

pub struct LifecycleManager {
    index: Arc<dyn VectorIndex>,
    cache: Arc<dyn CacheStore>,
    registry: Arc<NamespaceRegistry>,
    directory: Arc<EmployeeDirectory>,
}

impl LifecycleManager {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn CacheStore>,
        registry: Arc<NamespaceRegistry>,
        directory: Arc<EmployeeDirectory>,
    ) -> Self {
        Self {
            index,
            cache,
            registry,
            directory,
        }
    }

    fn namespace_for(&self, employee_id: &str, operation: &'static str) -> Result<String> {
        let profile = self
            .directory
            .lookup(employee_id)
            .ok_or_else(|| MemoryError::validation(employee_id, operation, "unknown employee id"))?;
        Ok(derive_namespace(employee_id, profile.role))
    }

    /// Remove records from default search scope without deleting them.
    pub async fn archive(&self, employee_id: &str, ids: &[String], reason: &str) -> Result<usize> {
        self.transition(employee_id, ids, LifecycleState::Archived, reason, "archive")
            .await
    }

    /// Bring archived records back into default search scope.
    pub async fn restore(&self, employee_id: &str, ids: &[String], reason: &str) -> Result<usize> {
        self.transition(employee_id, ids, LifecycleState::Active, reason, "restore")
            .await
    }

    async fn transition(
        &self,
        employee_id: &str,
        ids: &[String],
        target: LifecycleState,
        reason: &str,
        operation: &'static str,
    ) -> Result<usize> {
        let namespace = self.namespace_for(employee_id, operation)?;
        let mut changed = 0;
        for id in ids {
            let (mut cached, semantic) = self.load(employee_id, id, operation).await?;
            if cached.state == target {
                continue;
            }
            cached.state = target;
            self.persist_state(&namespace, &cached, &semantic, operation)
                .await?;
            changed += 1;
        }
        info!(
            employee_id = %employee_id,
            namespace = %namespace,
            changed,
            reason = %reason,
            "{operation} complete"
        );
        Ok(changed)
    }

    /// Load a record and its semantic vector. Missing records (never written
    /// or already permanently deleted) are a NotFoundError.
    async fn load(
        &self,
        employee_id: &str,
        id: &str,
        operation: &'static str,
    ) -> Result<(CachedRecord, Vec<f32>)> {
        let fields = self
            .cache
            .hash_get_all(&memory_key(id))
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, operation, e))?
            .ok_or_else(|| MemoryError::not_found(employee_id, operation, id))?;

        let cached: CachedRecord = fields
            .get("record")
            .and_then(|json| serde_json::from_str(json).ok())
            .ok_or_else(|| MemoryError::not_found(employee_id, operation, id))?;
        if cached.employee_id != employee_id {
            // Records in another agent's namespace are invisible, not merely
            // forbidden.
            return Err(MemoryError::not_found(employee_id, operation, id));
        }
        let semantic: Vec<f32> = fields
            .get("semantic")
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();
        Ok((cached, semantic))
    }

    /// Write the new state to the cache, roster, and index. The index upsert
    /// overwrites the entry with the same vector and updated metadata.
    async fn persist_state(
        &self,
        namespace: &str,
        cached: &CachedRecord,
        semantic: &[f32],
        operation: &'static str,
    ) -> Result<()> {
        let employee_id = cached.employee_id.clone();
        let record_json = serde_json::to_string(cached)
            .map_err(|e| MemoryError::storage(employee_id.clone(), operation, e.into()))?;
        self.cache
            .hash_set_field(&memory_key(&cached.id), "record", record_json)
            .await
            .map_err(|e| MemoryError::storage(employee_id.clone(), operation, e))?;

        let roster_state = match cached.state {
            LifecycleState::Active => "active",
            LifecycleState::Archived => "archived",
            LifecycleState::Deleted => "deleted",
        };
        self.cache
            .hash_set_field(&roster_key(namespace), &cached.id, roster_state.to_string())
            .await
            .map_err(|e| MemoryError::storage(employee_id.clone(), operation, e))?;

        let entry = VectorEntry {
            id: cached.id.clone(),
            values: semantic.to_vec(),
            metadata: VectorMetadata {
                employee_id: cached.employee_id.clone(),
                memory_type: cached.memory_type,
                content_hash: cached.content_hash.clone(),
                created_at: cached.metadata.timestamp,
                importance: cached.metadata.importance,
                tags: cached.metadata.tags.iter().cloned().collect(),
                department: cached.metadata.department.clone(),
                role: cached.metadata.role,
                encrypted: cached.metadata.encrypted,
                state: cached.state,
            },
        };
        self.index
            .upsert(namespace, vec![entry])
            .await
            .map_err(|e| MemoryError::storage(employee_id.clone(), operation, e))
    }

    /// Permanently remove a record from index, cache, and roster.
    async fn purge(&self, namespace: &str, employee_id: &str, id: &str) -> Result<u64> {
        const OP: &str = "cleanup";
        let bytes = self.estimate_record_bytes(id).await;
        self.index
            .delete(namespace, std::slice::from_ref(&id.to_string()))
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;
        self.cache
            .delete(&memory_key(id))
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;
        self.cache
            .hash_delete_field(&roster_key(namespace), id)
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;
        Ok(bytes)
    }

    async fn estimate_record_bytes(&self, id: &str) -> u64 {
        match self.cache.hash_get_all(&memory_key(id)).await {
            Ok(Some(fields)) => fields
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum(),
            _ => 0,
        }
    }

    /// Select and act on records below the importance threshold, beyond the
    /// age limit, or over the count cap. Low-importance records are deleted;
    /// age and count-cap violations are archived (recoverable). With
    /// `dry_run` the report lists candidates and nothing mutates.
    pub async fn cleanup(
        &self,
        employee_id: &str,
        policy: &CleanupPolicy,
        cancel: &CancelFlag,
    ) -> Result<CleanupReport> {
        const OP: &str = "cleanup";
        let namespace = self.namespace_for(employee_id, OP)?;

        let roster = self
            .cache
            .hash_get_all(&roster_key(&namespace))
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?
            .unwrap_or_default();

        // Deterministic examination order.
        let mut ids: Vec<String> = roster
            .iter()
            .filter(|(_, state)| state.as_str() != "deleted")
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();

        let now = Utc::now();
        let mut report = CleanupReport {
            dry_run: policy.dry_run,
            ..Default::default()
        };

        // First pass: classify. (id, importance, timestamp) for the cap check.
        let mut survivors: Vec<(String, f64, chrono::DateTime<Utc>)> = Vec::new();
        for id in &ids {
            report.examined += 1;
            let (cached, _) = match self.load(employee_id, id, OP).await {
                Ok(loaded) => loaded,
                Err(MemoryError::NotFound { .. }) => {
                    warn!(id = %id, namespace = %namespace, "roster entry without record; skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(min) = policy.min_importance {
                if cached.metadata.importance < min {
                    report.delete_candidates.push(id.clone());
                    continue;
                }
            }
            if let Some(max_age) = policy.max_age_days {
                if cached.metadata.timestamp < now - Duration::days(max_age) {
                    report.archive_candidates.push(id.clone());
                    continue;
                }
            }
            if cached.state == LifecycleState::Active {
                survivors.push((id.clone(), cached.metadata.importance, cached.metadata.timestamp));
            }
        }

        // Count cap on what remains active: evict lowest importance, oldest
        // first.
        if let Some(cap) = policy.max_memories {
            if survivors.len() > cap {
                survivors.sort_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.2.cmp(&b.2))
                });
                let overflow = survivors.len() - cap;
                for (id, _, _) in survivors.into_iter().take(overflow) {
                    report.archive_candidates.push(id);
                }
            }
        }

        if policy.dry_run {
            debug!(
                namespace = %namespace,
                deletes = report.delete_candidates.len(),
                archives = report.archive_candidates.len(),
                "cleanup dry run"
            );
            return Ok(report);
        }

        for id in report.delete_candidates.clone() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            report.estimated_bytes_freed += self.purge(&namespace, employee_id, &id).await?;
            report.deleted += 1;
        }
        for id in report.archive_candidates.clone() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            let (mut cached, semantic) = self.load(employee_id, &id, OP).await?;
            // Already-archived records are re-selected by the age check on
            // every run; only actual transitions count.
            if cached.state != LifecycleState::Archived {
                cached.state = LifecycleState::Archived;
                self.persist_state(&namespace, &cached, &semantic, OP).await?;
                report.archived += 1;
            }
        }

        info!(
            employee_id = %employee_id,
            namespace = %namespace,
            deleted = report.deleted,
            archived = report.archived,
            "cleanup complete"
        );
        Ok(report)
    }

    /// Storage statistics for one employee's namespace.
    pub async fn storage_stats(&self, employee_id: &str) -> Result<StorageStats> {
        const OP: &str = "stats";
        let namespace = self.namespace_for(employee_id, OP)?;

        let metadata = self
            .registry
            .describe(&namespace)
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?;

        let roster = self
            .cache
            .hash_get_all(&roster_key(&namespace))
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?
            .unwrap_or_default();

        let active = roster.values().filter(|s| s.as_str() == "active").count();
        let archived = roster.values().filter(|s| s.as_str() == "archived").count();

        let mut estimated_bytes = 0;
        for id in roster.keys() {
            estimated_bytes += self.estimate_record_bytes(id).await;
        }

        let index_stats = self
            .index
            .describe_stats()
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?;
        let indexed_vectors = index_stats
            .namespaces
            .get(&namespace)
            .map(|s| s.vector_count)
            .unwrap_or(0);

        Ok(StorageStats {
            namespace,
            lifetime_memory_count: metadata.as_ref().map(|m| m.memory_count).unwrap_or(0),
            active,
            archived,
            indexed_vectors,
            estimated_bytes,
            last_accessed: metadata.and_then(|m| m.last_accessed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::crypto::ConfidentialityGuard;
    use crate::embedding::{EmbeddingComposer, HashEmbedder};
    use crate::index::{InMemoryVectorIndex, QueryFilter, VectorQuery};
    use crate::record::RawMemory;
    use crate::retriever::{MemoryRetriever, SearchOptions};
    use crate::roles::Role;
    use crate::store::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        retriever: MemoryRetriever,
        lifecycle: LifecycleManager,
        index: Arc<dyn VectorIndex>,
    }

    fn fixture() -> Fixture {
        let composer = Arc::new(EmbeddingComposer::new(Arc::new(HashEmbedder::new(64)), None, 8));
        let guard = Arc::new(ConfidentialityGuard::new([5u8; 32]));
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
        let registry = Arc::new(NamespaceRegistry::new(cache.clone()));
        let directory = Arc::new(EmployeeDirectory::new().register(
            "emp_007",
            Role::DataScientist,
            "data",
        ));

        Fixture {
            store: MemoryStore::new(
                composer.clone(),
                guard.clone(),
                index.clone(),
                cache.clone(),
                registry.clone(),
                directory.clone(),
                true,
            ),
            retriever: MemoryRetriever::new(
                composer,
                guard,
                index.clone(),
                cache.clone(),
                registry.clone(),
                directory.clone(),
            ),
            lifecycle: LifecycleManager::new(index.clone(), cache, registry, directory),
            index,
        }
    }

    async fn index_metadata(index: &Arc<dyn VectorIndex>, id: &str) -> VectorMetadata {
        index
            .query(
                "emp_007_ds",
                VectorQuery {
                    vector: vec![0.0; 64],
                    top_k: 10,
                    filter: QueryFilter::default(),
                },
            )
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.id == id)
            .unwrap()
            .metadata
    }

    fn raw(content: &str, importance: f64) -> RawMemory {
        let mut raw = RawMemory {
            memory_type: "knowledge".to_string(),
            content: content.to_string(),
            ..Default::default()
        };
        raw.metadata.importance = Some(importance);
        raw
    }

    #[tokio::test]
    async fn archive_hides_and_restore_reveals() {
        let f = fixture();
        let id = f.store.store("emp_007", raw("pandas groupby tricks", 6.0)).await.unwrap();

        f.lifecycle
            .archive("emp_007", &[id.clone()], "quarterly sweep")
            .await
            .unwrap();
        let hidden = f
            .retriever
            .search("emp_007", "pandas groupby", SearchOptions::default())
            .await
            .unwrap();
        assert!(hidden.is_empty());

        f.lifecycle
            .restore("emp_007", &[id.clone()], "needed again")
            .await
            .unwrap();
        let visible = f
            .retriever
            .search("emp_007", "pandas groupby", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].record.id, id);
    }

    #[tokio::test]
    async fn content_hash_survives_archive_and_restore() {
        let f = fixture();
        let id = f
            .store
            .store("emp_007", raw("notebook conventions", 6.0))
            .await
            .unwrap();

        let before = index_metadata(&f.index, &id).await;
        assert!(!before.content_hash.is_empty());

        f.lifecycle
            .archive("emp_007", &[id.clone()], "quarterly sweep")
            .await
            .unwrap();
        f.lifecycle
            .restore("emp_007", &[id.clone()], "needed again")
            .await
            .unwrap();

        let after = index_metadata(&f.index, &id).await;
        assert_eq!(after.content_hash, before.content_hash);
        assert_eq!(after.state, LifecycleState::Active);
    }

    #[tokio::test]
    async fn repeated_cleanup_does_not_recount_archived() {
        let f = fixture();
        let mut old = raw("aging fact", 6.0);
        old.metadata.timestamp = Some(Utc::now() - Duration::days(400));
        f.store.store("emp_007", old).await.unwrap();

        let policy = CleanupPolicy {
            max_age_days: Some(365),
            ..Default::default()
        };
        let first = f
            .lifecycle
            .cleanup("emp_007", &policy, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(first.archived, 1);

        // The age check re-selects the archived record; nothing transitions.
        let second = f
            .lifecycle
            .cleanup("emp_007", &policy, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(second.archive_candidates.len(), 1);
        assert_eq!(second.archived, 0);
    }

    #[tokio::test]
    async fn restore_of_unknown_id_is_not_found() {
        let f = fixture();
        f.store.store("emp_007", raw("anything", 5.0)).await.unwrap();
        let err = f
            .lifecycle
            .restore("emp_007", &["no-such-id".to_string()], "oops")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutation() {
        let f = fixture();
        f.store.store("emp_007", raw("weak memory", 1.0)).await.unwrap();
        f.store.store("emp_007", raw("strong memory", 9.0)).await.unwrap();

        let policy = CleanupPolicy {
            min_importance: Some(3.0),
            dry_run: true,
            ..Default::default()
        };
        let report = f
            .lifecycle
            .cleanup("emp_007", &policy, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.delete_candidates.len(), 1);
        assert_eq!(report.deleted, 0);

        let stats = f.lifecycle.storage_stats("emp_007").await.unwrap();
        assert_eq!(stats.active, 2);
    }

    #[tokio::test]
    async fn cleanup_deletes_low_importance_and_respects_cap() {
        let f = fixture();
        f.store.store("emp_007", raw("junk one", 1.0)).await.unwrap();
        let keep_a = f.store.store("emp_007", raw("solid a", 8.0)).await.unwrap();
        let keep_b = f.store.store("emp_007", raw("solid b", 9.0)).await.unwrap();
        f.store.store("emp_007", raw("middling", 5.0)).await.unwrap();

        let policy = CleanupPolicy {
            min_importance: Some(3.0),
            max_memories: Some(2),
            ..Default::default()
        };
        let report = f
            .lifecycle
            .cleanup("emp_007", &policy, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.archived, 1);
        assert!(report.estimated_bytes_freed > 0);

        let stats = f.lifecycle.storage_stats("emp_007").await.unwrap();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.archived, 1);
        // The survivors are the high-importance pair.
        let results = f
            .retriever
            .search("emp_007", "solid", SearchOptions { top_k: 10, ..Default::default() })
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert!(ids.contains(&keep_a.as_str()));
        assert!(ids.contains(&keep_b.as_str()));
    }

    #[tokio::test]
    async fn cancelled_cleanup_stops_early() {
        let f = fixture();
        f.store.store("emp_007", raw("junk one", 1.0)).await.unwrap();
        f.store.store("emp_007", raw("junk two", 1.0)).await.unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let policy = CleanupPolicy {
            min_importance: Some(3.0),
            ..Default::default()
        };
        let report = f.lifecycle.cleanup("emp_007", &policy, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.deleted, 0);

        // Resume with a fresh flag; per-record deletes are idempotent.
        let report = f
            .lifecycle
            .cleanup("emp_007", &policy, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.deleted, 2);
    }
}
