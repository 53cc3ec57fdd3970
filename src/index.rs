//! Vector Index Collaborator
//!
//! The ANN index is external; this module defines the contract the engine
//! relies on (namespaced upsert/query/delete/stats plus metadata filtering)
//! and a brute-force in-process implementation for tests and single-node use.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::record::{LifecycleState, MemoryType};
use crate::roles::Role;

/// Metadata stored with each vector. Never contains plaintext content; the
/// content hash lets writes be verified without decryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub employee_id: String,
    pub memory_type: MemoryType,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub importance: f64,
    pub tags: Vec<String>,
    pub department: String,
    pub role: Role,
    pub encrypted: bool,
    pub state: LifecycleState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Structured filter evaluated against [`VectorMetadata`].
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub employee_id: Option<String>,
    pub memory_types: Option<Vec<MemoryType>>,
    pub min_importance: Option<f64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Lifecycle states admitted by the query; empty means any.
    pub states: Vec<LifecycleState>,
}

impl QueryFilter {
    /// Default scope for searches: one employee, active records only.
    pub fn active_for(employee_id: &str) -> Self {
        Self {
            employee_id: Some(employee_id.to_string()),
            states: vec![LifecycleState::Active],
            ..Self::default()
        }
    }

    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        if let Some(employee_id) = &self.employee_id {
            if &metadata.employee_id != employee_id {
                return false;
            }
        }
        if let Some(types) = &self.memory_types {
            if !types.contains(&metadata.memory_type) {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if metadata.importance < min {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if metadata.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if metadata.created_at > before {
                return false;
            }
        }
        if !self.states.is_empty() && !self.states.contains(&metadata.state) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: QueryFilter,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NamespaceIndexStats {
    pub vector_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub namespaces: HashMap<String, NamespaceIndexStats>,
}

/// External vector index collaborator.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries by id within a namespace.
    async fn upsert(&self, namespace: &str, entries: Vec<VectorEntry>) -> Result<()>;

    /// Nearest matches under the filter, best first.
    async fn query(&self, namespace: &str, query: VectorQuery) -> Result<Vec<VectorMatch>>;

    /// Remove entries by id. Missing ids are ignored.
    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()>;

    async fn describe_stats(&self) -> Result<IndexStats>;
}

/// Brute-force index over per-namespace entry lists. Entries keep insertion
/// order, so equal scores resolve deterministically.
pub struct InMemoryVectorIndex {
    namespaces: Arc<RwLock<HashMap<String, Vec<VectorEntry>>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            namespaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn dot_product(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, namespace: &str, entries: Vec<VectorEntry>) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        let stored = namespaces.entry(namespace.to_string()).or_default();
        for entry in entries {
            stored.retain(|e| e.id != entry.id);
            stored.push(entry);
        }
        Ok(())
    }

    async fn query(&self, namespace: &str, query: VectorQuery) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().await;
        let Some(stored) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .filter(|entry| query.filter.matches(&entry.metadata))
            .map(|entry| VectorMatch {
                id: entry.id.clone(),
                score: Self::dot_product(&query.vector, &entry.values),
                metadata: entry.metadata.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among ties.
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(query.top_k);
        Ok(matches)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(stored) = namespaces.get_mut(namespace) {
            stored.retain(|e| !ids.contains(&e.id));
        }
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        let namespaces = self.namespaces.read().await;
        Ok(IndexStats {
            namespaces: namespaces
                .iter()
                .map(|(name, entries)| {
                    (
                        name.clone(),
                        NamespaceIndexStats {
                            vector_count: entries.len(),
                        },
                    )
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, values: Vec<f32>, importance: f64, memory_type: MemoryType) -> VectorEntry {
        VectorEntry {
            id: id.to_string(),
            values,
            metadata: VectorMetadata {
                employee_id: "emp_001".to_string(),
                memory_type,
                content_hash: String::new(),
                created_at: Utc::now(),
                importance,
                tags: Vec::new(),
                department: "engineering".to_string(),
                role: Role::SoftwareEngineer,
                encrypted: true,
                state: LifecycleState::Active,
            },
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert("ns", vec![entry("a", vec![1.0, 0.0], 5.0, MemoryType::Knowledge)])
            .await
            .unwrap();
        index
            .upsert("ns", vec![entry("a", vec![0.0, 1.0], 9.0, MemoryType::Knowledge)])
            .await
            .unwrap();
        let stats = index.describe_stats().await.unwrap();
        assert_eq!(stats.namespaces["ns"].vector_count, 1);
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(
                "ns",
                vec![
                    entry("close", vec![1.0, 0.0], 5.0, MemoryType::Experience),
                    entry("far", vec![0.0, 1.0], 5.0, MemoryType::Experience),
                    entry("filtered", vec![1.0, 0.0], 1.0, MemoryType::Experience),
                ],
            )
            .await
            .unwrap();

        let mut filter = QueryFilter::active_for("emp_001");
        filter.min_importance = Some(3.0);
        let matches = index
            .query(
                "ns",
                VectorQuery {
                    vector: vec![1.0, 0.0],
                    top_k: 10,
                    filter,
                },
            )
            .await
            .unwrap();

        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["close", "far"]);
    }

    #[tokio::test]
    async fn archived_excluded_from_active_scope() {
        let index = InMemoryVectorIndex::new();
        let mut archived = entry("old", vec![1.0, 0.0], 5.0, MemoryType::Decision);
        archived.metadata.state = LifecycleState::Archived;
        index.upsert("ns", vec![archived]).await.unwrap();

        let matches = index
            .query(
                "ns",
                VectorQuery {
                    vector: vec![1.0, 0.0],
                    top_k: 10,
                    filter: QueryFilter::active_for("emp_001"),
                },
            )
            .await
            .unwrap();
        assert!(matches.is_empty());
    }
}
