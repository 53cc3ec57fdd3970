//! Memory Store — write path
//!
//! validate -> embed -> encrypt -> index upsert -> cache write -> namespace
//! stats. Validation failures are rejected before any I/O. The index and
//! cache writes are two separate external calls with no transaction across
//! them; an index-ok/cache-failed write is retried once on the cache leg and
//! otherwise compensated by deleting the index entry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{memory_key, roster_key, CacheStore};
use crate::config::EmployeeDirectory;
use crate::crypto::{ConfidentialityGuard, EncryptedEnvelope};
use crate::embedding::{EmbeddingComposer, EmbeddingSet};
use crate::error::{MemoryError, Result};
use crate::index::{VectorEntry, VectorIndex, VectorMetadata};
use crate::namespace::{derive_namespace, NamespaceRegistry};
use crate::record::{
    validate, LifecycleState, MemoryContext, MemoryRecord, MemoryType, RawMemory, RecordMetadata,
};

/// A sensitive field as persisted in the cache: plaintext only when
/// confidentiality is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum StoredField {
    Plain { value: String },
    Encrypted { envelope: EncryptedEnvelope },
}

/// Full record representation written to the cache under `memory:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecord {
    pub id: String,
    pub employee_id: String,
    pub memory_type: MemoryType,
    pub content: StoredField,
    pub context: StoredField,
    pub metadata: RecordMetadata,
    pub state: LifecycleState,
    /// SHA-256 of the plaintext content, mirrored into the index metadata.
    #[serde(default)]
    pub content_hash: String,
}

impl CachedRecord {
    /// Decrypt sensitive fields and produce the caller-facing record.
    pub fn into_record(
        self,
        guard: &ConfidentialityGuard,
        employee_id: &str,
        access_count: u64,
        last_accessed: Option<chrono::DateTime<Utc>>,
    ) -> Result<MemoryRecord> {
        let content = match self.content {
            StoredField::Plain { value } => value,
            StoredField::Encrypted { envelope } => guard.decrypt(&envelope, employee_id)?,
        };
        let context_json = match self.context {
            StoredField::Plain { value } => value,
            StoredField::Encrypted { envelope } => guard.decrypt(&envelope, employee_id)?,
        };
        let context: MemoryContext =
            serde_json::from_str(&context_json).map_err(|e| MemoryError::Decryption {
                employee_id: employee_id.to_string(),
                operation: "decode_context",
                reason: e.to_string(),
            })?;

        Ok(MemoryRecord {
            id: self.id,
            employee_id: self.employee_id,
            memory_type: self.memory_type,
            content,
            context,
            metadata: self.metadata,
            state: self.state,
            access_count,
            last_accessed,
        })
    }
}

/// Owns the write path.
pub struct MemoryStore {
    composer: Arc<EmbeddingComposer>,
    guard: Arc<ConfidentialityGuard>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<dyn CacheStore>,
    registry: Arc<NamespaceRegistry>,
    directory: Arc<EmployeeDirectory>,
    confidentiality_enabled: bool,
}

impl MemoryStore {
    pub fn new(
        composer: Arc<EmbeddingComposer>,
        guard: Arc<ConfidentialityGuard>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn CacheStore>,
        registry: Arc<NamespaceRegistry>,
        directory: Arc<EmployeeDirectory>,
        confidentiality_enabled: bool,
    ) -> Self {
        Self {
            composer,
            guard,
            index,
            cache,
            registry,
            directory,
            confidentiality_enabled,
        }
    }

    /// Store one memory for an employee. Returns the generated record id.
    pub async fn store(&self, employee_id: &str, raw: RawMemory) -> Result<String> {
        const OP: &str = "store";

        let profile = self.directory.lookup(employee_id).ok_or_else(|| {
            MemoryError::validation(employee_id, OP, "unknown employee id")
        })?;
        let validated = validate(employee_id, raw)?;

        let namespace = derive_namespace(employee_id, profile.role);
        self.registry
            .create_namespace(employee_id, profile.role, &profile.department)
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;

        let embeddings = self
            .composer
            .compose(&validated.content, profile.role, validated.timestamp)
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;

        let context_json =
            serde_json::to_string(&validated.context).map_err(|e| MemoryError::Encryption {
                employee_id: employee_id.to_string(),
                operation: OP,
                reason: format!("context serialization: {e}"),
            })?;

        let (content_field, context_field) = if self.confidentiality_enabled {
            (
                StoredField::Encrypted {
                    envelope: self.guard.encrypt(&validated.content, employee_id)?,
                },
                StoredField::Encrypted {
                    envelope: self.guard.encrypt(&context_json, employee_id)?,
                },
            )
        } else {
            (
                StoredField::Plain {
                    value: validated.content.clone(),
                },
                StoredField::Plain {
                    value: context_json,
                },
            )
        };

        let id = Uuid::new_v4().to_string();
        let content_hash = hex::encode(Sha256::digest(validated.content.as_bytes()));

        let metadata = RecordMetadata {
            timestamp: validated.timestamp,
            importance: validated.importance,
            tags: validated.tags,
            department: profile.department.clone(),
            role: profile.role,
            confidence: validated.confidence,
            encrypted: self.confidentiality_enabled,
        };

        let entry = VectorEntry {
            id: id.clone(),
            values: embeddings.semantic.clone(),
            metadata: VectorMetadata {
                employee_id: employee_id.to_string(),
                memory_type: validated.memory_type,
                content_hash: content_hash.clone(),
                created_at: validated.timestamp,
                importance: validated.importance,
                tags: metadata.tags.iter().cloned().collect(),
                department: profile.department.clone(),
                role: profile.role,
                encrypted: self.confidentiality_enabled,
                state: LifecycleState::Active,
            },
        };

        self.index
            .upsert(&namespace, vec![entry])
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;

        let cached = CachedRecord {
            id: id.clone(),
            employee_id: employee_id.to_string(),
            memory_type: validated.memory_type,
            content: content_field,
            context: context_field,
            metadata,
            state: LifecycleState::Active,
            content_hash,
        };

        if let Err(e) = self
            .write_cache_record(&namespace, &cached, &embeddings)
            .await
        {
            // Index succeeded but the cache leg failed: the record would be
            // searchable yet not retrievable. Retry the cache leg once, then
            // compensate by deleting the index entry.
            warn!(
                id = %id,
                namespace = %namespace,
                error = %e,
                "cache write failed after index upsert; retrying"
            );
            if let Err(retry_err) = self
                .write_cache_record(&namespace, &cached, &embeddings)
                .await
            {
                warn!(
                    id = %id,
                    namespace = %namespace,
                    "cache retry failed; compensating with index delete"
                );
                if let Err(delete_err) = self.index.delete(&namespace, &[id.clone()]).await {
                    warn!(
                        id = %id,
                        namespace = %namespace,
                        error = %delete_err,
                        "compensating index delete failed; record is orphaned in the index"
                    );
                }
                return Err(MemoryError::storage(employee_id, OP, retry_err));
            }
        }

        self.registry
            .update_stats(&namespace)
            .await
            .map_err(|e| MemoryError::storage(employee_id, OP, e))?;

        debug!(id = %id, namespace = %namespace, "stored memory");
        Ok(id)
    }

    async fn write_cache_record(
        &self,
        namespace: &str,
        cached: &CachedRecord,
        embeddings: &EmbeddingSet,
    ) -> anyhow::Result<()> {
        let record_json = serde_json::to_string(cached)?;
        self.cache
            .hash_set(
                &memory_key(&cached.id),
                vec![
                    ("record".to_string(), record_json),
                    (
                        "semantic".to_string(),
                        serde_json::to_string(&embeddings.semantic)?,
                    ),
                    (
                        "task_contextual".to_string(),
                        serde_json::to_string(&embeddings.task_contextual)?,
                    ),
                    (
                        "temporal".to_string(),
                        serde_json::to_string(&embeddings.temporal)?,
                    ),
                    ("access_count".to_string(), "0".to_string()),
                ],
            )
            .await?;
        self.cache
            .hash_set_field(&roster_key(namespace), &cached.id, "active".to_string())
            .await?;
        Ok(())
    }
}
