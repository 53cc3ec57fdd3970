//! Namespace Registry
//!
//! Per-agent isolated partitions of the vector index and their
//! cross-visibility permissions. Namespace identifiers are pure functions of
//! (employee id, role), so they survive restarts without coordination.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{namespace_key, CacheStore};
use crate::roles::Role;

/// Stable namespace identifier for an (employee, role) pair.
pub fn derive_namespace(employee_id: &str, role: Role) -> String {
    format!("{}_{}", employee_id, role.abbrev())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    pub employee_id: String,
    pub role: Role,
    pub department: String,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    /// Lifetime write counter. Monotonic; never decremented.
    pub memory_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

/// Grant level for one visibility tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    Read,
    LimitedRead,
    ReadWrite,
}

/// Grants over the four visibility tiers for one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionMatrix {
    pub own: AccessLevel,
    pub department: AccessLevel,
    pub company_knowledge: AccessLevel,
    pub cross_department: AccessLevel,
}

impl PermissionMatrix {
    /// Leadership roles write department/company tiers and get limited
    /// cross-department reads; everyone else reads only.
    pub fn for_role(role: Role) -> Self {
        if role.is_leadership() {
            Self {
                own: AccessLevel::ReadWrite,
                department: AccessLevel::ReadWrite,
                company_knowledge: AccessLevel::ReadWrite,
                cross_department: AccessLevel::LimitedRead,
            }
        } else {
            Self {
                own: AccessLevel::ReadWrite,
                department: AccessLevel::Read,
                company_knowledge: AccessLevel::Read,
                cross_department: AccessLevel::None,
            }
        }
    }
}

/// Allocates and describes per-agent namespaces, persisting metadata in the
/// cache collaborator.
pub struct NamespaceRegistry {
    cache: Arc<dyn CacheStore>,
}

impl NamespaceRegistry {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Create the namespace for an (employee, role) pair, or return the
    /// existing metadata. Idempotent.
    pub async fn create_namespace(
        &self,
        employee_id: &str,
        role: Role,
        department: &str,
    ) -> Result<NamespaceMetadata> {
        let namespace = derive_namespace(employee_id, role);
        if let Some(existing) = self.describe(&namespace).await? {
            return Ok(existing);
        }

        let metadata = NamespaceMetadata {
            employee_id: employee_id.to_string(),
            role,
            department: department.to_string(),
            namespace: namespace.clone(),
            created_at: Utc::now(),
            memory_count: 0,
            last_accessed: None,
        };

        self.cache
            .hash_set(
                &namespace_key(&namespace),
                vec![
                    ("employee_id".to_string(), metadata.employee_id.clone()),
                    ("role".to_string(), role.abbrev().to_string()),
                    ("department".to_string(), metadata.department.clone()),
                    ("created_at".to_string(), metadata.created_at.to_rfc3339()),
                    ("memory_count".to_string(), "0".to_string()),
                ],
            )
            .await
            .context("persisting namespace metadata")?;

        debug!(namespace = %namespace, "created namespace");
        Ok(metadata)
    }

    pub async fn describe(&self, namespace: &str) -> Result<Option<NamespaceMetadata>> {
        let Some(fields) = self
            .cache
            .hash_get_all(&namespace_key(namespace))
            .await
            .context("loading namespace metadata")?
        else {
            return Ok(None);
        };

        let role = fields
            .get("role")
            .and_then(|abbrev| Role::ALL.iter().find(|r| r.abbrev() == abbrev.as_str()))
            .copied()
            .context("namespace metadata missing role")?;

        Ok(Some(NamespaceMetadata {
            employee_id: fields.get("employee_id").cloned().unwrap_or_default(),
            role,
            department: fields.get("department").cloned().unwrap_or_default(),
            namespace: namespace.to_string(),
            created_at: fields
                .get("created_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            memory_count: fields
                .get("memory_count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            last_accessed: fields
                .get("last_accessed")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }))
    }

    /// Bump the namespace write counter and refresh last_accessed. The
    /// counter update is one atomic increment on the cache, safe under
    /// concurrent writers.
    pub async fn update_stats(&self, namespace: &str) -> Result<u64> {
        let key = namespace_key(namespace);
        let count = self
            .cache
            .hash_increment(&key, "memory_count", 1)
            .await
            .context("incrementing namespace counter")?;
        self.cache
            .hash_set_field(&key, "last_accessed", Utc::now().to_rfc3339())
            .await
            .context("refreshing last_accessed")?;
        Ok(count.max(0) as u64)
    }

    /// Refresh last_accessed without touching the counter.
    pub async fn touch(&self, namespace: &str) -> Result<()> {
        self.cache
            .hash_set_field(
                &namespace_key(namespace),
                "last_accessed",
                Utc::now().to_rfc3339(),
            )
            .await
            .context("refreshing last_accessed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use std::collections::HashSet;

    #[test]
    fn namespace_is_stable_and_collision_free() {
        assert_eq!(
            derive_namespace("emp_004", Role::SoftwareEngineer),
            derive_namespace("emp_004", Role::SoftwareEngineer)
        );

        let mut seen = HashSet::new();
        for id in ["emp_001", "emp_002", "emp_003"] {
            for role in Role::ALL {
                assert!(seen.insert(derive_namespace(id, role)));
            }
        }
    }

    #[test]
    fn leadership_gets_wider_grants() {
        let lead = PermissionMatrix::for_role(Role::Cto);
        assert_eq!(lead.department, AccessLevel::ReadWrite);
        assert_eq!(lead.cross_department, AccessLevel::LimitedRead);

        let engineer = PermissionMatrix::for_role(Role::SoftwareEngineer);
        assert_eq!(engineer.own, AccessLevel::ReadWrite);
        assert_eq!(engineer.department, AccessLevel::Read);
        assert_eq!(engineer.cross_department, AccessLevel::None);
    }

    #[tokio::test]
    async fn create_is_idempotent_and_stats_increment() {
        let cache = Arc::new(InMemoryCache::new());
        let registry = NamespaceRegistry::new(cache);

        let created = registry
            .create_namespace("emp_001", Role::QaEngineer, "engineering")
            .await
            .unwrap();
        assert_eq!(created.memory_count, 0);

        registry.update_stats(&created.namespace).await.unwrap();
        registry.update_stats(&created.namespace).await.unwrap();

        let again = registry
            .create_namespace("emp_001", Role::QaEngineer, "engineering")
            .await
            .unwrap();
        assert_eq!(again.memory_count, 2);
        assert!(again.last_accessed.is_some());
    }
}
