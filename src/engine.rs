//! Memory Engine Facade
//!
//! Wires the collaborators together and exposes the request surface the API
//! layer calls: store, search, task context, expertise, stats, archive,
//! restore, cleanup, and analytics.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::cache::CacheStore;
use crate::config::{EmployeeDirectory, EngineConfig};
use crate::crypto::ConfidentialityGuard;
use crate::digest::{self, ExpertiseProfile, TaskContext};
use crate::embedding::{EmbeddingComposer, TextEmbedder};
use crate::error::{MemoryError, Result};
use crate::index::VectorIndex;
use crate::lifecycle::{CancelFlag, CleanupPolicy, CleanupReport, LifecycleManager, StorageStats};
use crate::namespace::{derive_namespace, NamespaceRegistry, PermissionMatrix};
use crate::ranker::{self, RankedMemory};
use crate::record::{MemoryType, RawMemory};
use crate::retriever::{MemoryRetriever, SearchOptions};
use crate::store::MemoryStore;

/// Search payload from the API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub employee_id: String,
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub memory_types: Option<Vec<MemoryType>>,
    #[serde(default)]
    pub relevance_threshold: Option<f64>,
}

fn default_limit() -> usize {
    10
}

/// Task-context payload from the API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextRequest {
    pub employee_id: String,
    pub task_description: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub time_range: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>,
}

/// Aggregate storage and usage figures across all known personas.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsReport {
    pub employees: usize,
    pub total_active: usize,
    pub total_archived: usize,
    pub total_indexed_vectors: usize,
    pub estimated_bytes: u64,
}

/// The assembled memory engine. One instance serves every persona; isolation
/// comes from per-agent namespaces, not separate engines.
pub struct MemoryEngine {
    store: MemoryStore,
    retriever: MemoryRetriever,
    lifecycle: LifecycleManager,
    registry: Arc<NamespaceRegistry>,
    directory: Arc<EmployeeDirectory>,
    config: EngineConfig,
}

impl MemoryEngine {
    pub fn new(
        config: EngineConfig,
        directory: EmployeeDirectory,
        embedder: Arc<dyn TextEmbedder>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let directory = Arc::new(directory);
        let composer = Arc::new(EmbeddingComposer::new(
            embedder,
            config.index_dimension,
            config.temporal_dimension,
        ));
        let guard = Arc::new(ConfidentialityGuard::new(config.encryption_key));
        let registry = Arc::new(NamespaceRegistry::new(cache.clone()));

        info!(
            employees = directory.len(),
            index_dimension = composer.index_dimension(),
            confidentiality = config.confidentiality_enabled,
            "memory engine assembled"
        );

        Self {
            store: MemoryStore::new(
                composer.clone(),
                guard.clone(),
                index.clone(),
                cache.clone(),
                registry.clone(),
                directory.clone(),
                config.confidentiality_enabled,
            ),
            retriever: MemoryRetriever::new(
                composer,
                guard,
                index.clone(),
                cache.clone(),
                registry.clone(),
                directory.clone(),
            ),
            lifecycle: LifecycleManager::new(index, cache, registry.clone(), directory.clone()),
            registry,
            directory,
            config,
        }
    }

    /// Store one memory; returns the generated id.
    pub async fn store_memory(&self, employee_id: &str, raw: RawMemory) -> Result<String> {
        self.store.store(employee_id, raw).await
    }

    /// Search and rank against the query text. Results below the relevance
    /// threshold (when given) are dropped.
    pub async fn search_memories(&self, request: SearchRequest) -> Result<Vec<RankedMemory>> {
        let options = SearchOptions {
            top_k: request.limit,
            memory_types: request.memory_types.clone(),
            ..Default::default()
        };
        let candidates = self
            .retriever
            .search(&request.employee_id, &request.query, options)
            .await?;
        let mut ranked = ranker::rank(candidates, &request.query);
        if let Some(threshold) = request.relevance_threshold {
            ranked.retain(|r| r.relevance >= threshold);
        }
        Ok(ranked)
    }

    /// Build a task-context digest from the memories most relevant to a task.
    pub async fn task_context(&self, request: ContextRequest) -> Result<TaskContext> {
        let options = SearchOptions {
            top_k: request.limit,
            time_range: request.time_range,
            ..Default::default()
        };
        let candidates = self
            .retriever
            .search(&request.employee_id, &request.task_description, options)
            .await?;
        let ranked = ranker::rank(candidates, &request.task_description);
        Ok(digest::summarize(&ranked, &request.task_description))
    }

    /// Analyze a persona's expertise in one domain. Candidates are the
    /// memories matching the domain by search, tag, or content mention.
    pub async fn expertise(&self, employee_id: &str, domain: &str) -> Result<ExpertiseProfile> {
        let options = SearchOptions {
            top_k: 50,
            ..Default::default()
        };
        let candidates = self.retriever.search(employee_id, domain, options).await?;
        let needle = domain.to_lowercase();
        let records: Vec<_> = candidates
            .into_iter()
            .map(|c| c.record)
            .filter(|r| {
                r.content.to_lowercase().contains(&needle)
                    || r.metadata.tags.iter().any(|t| t.to_lowercase() == needle)
            })
            .collect();
        Ok(digest::analyze(&records, domain))
    }

    /// Namespace stats for one persona.
    pub async fn namespace_stats(&self, employee_id: &str) -> Result<StorageStats> {
        self.lifecycle.storage_stats(employee_id).await
    }

    /// Permission grants for one persona's namespace.
    pub fn permissions(&self, employee_id: &str) -> Result<PermissionMatrix> {
        let profile = self.directory.lookup(employee_id).ok_or_else(|| {
            MemoryError::validation(employee_id, "permissions", "unknown employee id")
        })?;
        Ok(PermissionMatrix::for_role(profile.role))
    }

    pub async fn archive(&self, employee_id: &str, ids: &[String], reason: &str) -> Result<usize> {
        self.lifecycle.archive(employee_id, ids, reason).await
    }

    pub async fn restore(&self, employee_id: &str, ids: &[String], reason: &str) -> Result<usize> {
        self.lifecycle.restore(employee_id, ids, reason).await
    }

    /// Run cleanup with engine defaults filling any unset policy field.
    pub async fn cleanup(
        &self,
        employee_id: &str,
        policy: CleanupPolicy,
        cancel: &CancelFlag,
    ) -> Result<CleanupReport> {
        let policy = CleanupPolicy {
            max_memories: policy.max_memories.or(Some(self.config.default_max_memories)),
            min_importance: policy.min_importance.or(Some(self.config.default_min_importance)),
            max_age_days: policy.max_age_days.or(Some(self.config.default_max_age_days)),
            dry_run: policy.dry_run,
        };
        self.lifecycle.cleanup(employee_id, &policy, cancel).await
    }

    /// Aggregate storage/usage figures across every registered persona.
    pub async fn analytics(&self) -> Result<AnalyticsReport> {
        let mut report = AnalyticsReport::default();
        let ids: Vec<String> = self.directory.ids().cloned().collect();
        for employee_id in ids {
            report.employees += 1;
            let Some(profile) = self.directory.lookup(&employee_id) else {
                continue;
            };
            // Personas that never stored anything have no namespace yet.
            let namespace = derive_namespace(&employee_id, profile.role);
            if self
                .registry
                .describe(&namespace)
                .await
                .map_err(|e| MemoryError::retrieval(employee_id.clone(), "analytics", e))?
                .is_none()
            {
                continue;
            }
            let stats = self.lifecycle.storage_stats(&employee_id).await?;
            report.total_active += stats.active;
            report.total_archived += stats.archived;
            report.total_indexed_vectors += stats.indexed_vectors;
            report.estimated_bytes += stats.estimated_bytes;
        }
        Ok(report)
    }
}
