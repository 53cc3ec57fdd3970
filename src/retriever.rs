//! Memory Retriever — read path
//!
//! Embeds the query, runs a filtered nearest-neighbor query in the agent's
//! namespace, enriches matches from the cache, and decrypts. Access counters
//! are bumped best-effort after the response is assembled; those failures are
//! logged, never raised.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{memory_key, CacheStore};
use crate::config::EmployeeDirectory;
use crate::crypto::ConfidentialityGuard;
use crate::embedding::EmbeddingComposer;
use crate::error::{MemoryError, Result};
use crate::index::{QueryFilter, VectorIndex, VectorQuery};
use crate::namespace::{derive_namespace, NamespaceRegistry};
use crate::record::{LifecycleState, MemoryRecord, MemoryType};
use crate::store::CachedRecord;

/// Structured filters for a search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub memory_types: Option<Vec<MemoryType>>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub min_importance: Option<f64>,
    /// Archived records are excluded from default search scope.
    pub include_archived: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            memory_types: None,
            time_range: None,
            min_importance: None,
            include_archived: false,
        }
    }
}

/// One enriched, decrypted candidate in index-score order.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub record: MemoryRecord,
    /// Raw similarity score from the index.
    pub score: f32,
}

/// Owns the read path.
pub struct MemoryRetriever {
    composer: Arc<EmbeddingComposer>,
    guard: Arc<ConfidentialityGuard>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<dyn CacheStore>,
    registry: Arc<NamespaceRegistry>,
    directory: Arc<EmployeeDirectory>,
}

impl MemoryRetriever {
    pub fn new(
        composer: Arc<EmbeddingComposer>,
        guard: Arc<ConfidentialityGuard>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn CacheStore>,
        registry: Arc<NamespaceRegistry>,
        directory: Arc<EmployeeDirectory>,
    ) -> Self {
        Self {
            composer,
            guard,
            index,
            cache,
            registry,
            directory,
        }
    }

    /// Search an employee's namespace. Results come back in index-score
    /// order; ranking against a task description is the ranker's job.
    pub async fn search(
        &self,
        employee_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<RetrievedMemory>> {
        const OP: &str = "search";

        let profile = self.directory.lookup(employee_id).ok_or_else(|| {
            MemoryError::validation(employee_id, OP, "unknown employee id")
        })?;
        let namespace = derive_namespace(employee_id, profile.role);

        let query_vector = self
            .composer
            .semantic(query)
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?;

        let mut filter = QueryFilter::active_for(employee_id);
        if options.include_archived {
            filter.states = vec![LifecycleState::Active, LifecycleState::Archived];
        }
        filter.memory_types = options.memory_types.clone();
        filter.min_importance = options.min_importance;
        if let Some((from, to)) = options.time_range {
            filter.created_after = Some(from);
            filter.created_before = Some(to);
        }

        let matches = self
            .index
            .query(
                &namespace,
                VectorQuery {
                    vector: query_vector,
                    top_k: options.top_k,
                    filter,
                },
            )
            .await
            .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?;

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            let fields = self
                .cache
                .hash_get_all(&memory_key(&m.id))
                .await
                .map_err(|e| MemoryError::retrieval(employee_id, OP, e))?;

            // A missing cache entry means expired/evicted: skip, don't abort.
            let Some(fields) = fields else {
                warn!(id = %m.id, namespace = %namespace, "cache miss during enrichment; skipping");
                continue;
            };
            let Some(record_json) = fields.get("record") else {
                warn!(id = %m.id, namespace = %namespace, "cache entry missing record field; skipping");
                continue;
            };
            let cached: CachedRecord = match serde_json::from_str(record_json) {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(id = %m.id, error = %e, "undecodable cached record; skipping");
                    continue;
                }
            };

            let access_count = fields
                .get("access_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let last_accessed = fields
                .get("last_accessed")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            let record = cached.into_record(&self.guard, employee_id, access_count, last_accessed)?;
            results.push(RetrievedMemory {
                record,
                score: m.score,
            });
        }

        debug!(
            employee_id = %employee_id,
            namespace = %namespace,
            returned = results.len(),
            "search complete"
        );

        self.bump_access_counters(&namespace, results.iter().map(|r| r.record.id.clone()).collect());
        Ok(results)
    }

    /// Fire-and-forget access bookkeeping. Errors are observable only in
    /// logs; the caller already has its results.
    fn bump_access_counters(&self, namespace: &str, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.registry);
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            let now = Utc::now().to_rfc3339();
            for id in ids {
                let key = memory_key(&id);
                if let Err(e) = cache.hash_increment(&key, "access_count", 1).await {
                    warn!(id = %id, error = %e, "access counter update failed");
                    continue;
                }
                if let Err(e) = cache.hash_set_field(&key, "last_accessed", now.clone()).await {
                    warn!(id = %id, error = %e, "last_accessed update failed");
                }
            }
            if let Err(e) = registry.touch(&namespace).await {
                warn!(namespace = %namespace, error = %e, "namespace touch failed");
            }
        });
    }
}
