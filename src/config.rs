//! Engine Configuration
//!
//! Construction-time configuration plus the injected employee directory.
//! The encryption key is required up front: a key generated at startup would
//! make previously encrypted records permanently unreadable after a restart.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

use crate::roles::Role;

/// Environment variable holding the 64-hex-char master encryption key.
pub const MEMORY_KEY_ENV: &str = "AGENCY_MEMORY_KEY";

/// Static configuration for a [`crate::engine::MemoryEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target dimension of semantic/task-contextual vectors in the index.
    /// `None` adopts the embedder's native dimension; set it only when the
    /// index is pre-provisioned at a fixed size (vectors are then padded
    /// with zeros or truncated deterministically).
    pub index_dimension: Option<usize>,
    /// Dimension of the temporal vector.
    pub temporal_dimension: usize,
    /// Process-wide master key for AES-256-GCM. Must come from a durable
    /// secret store.
    pub encryption_key: [u8; 32],
    /// When false, content/context are stored in the clear.
    pub confidentiality_enabled: bool,
    /// Cleanup defaults, overridable per call.
    pub default_max_memories: usize,
    pub default_min_importance: f64,
    pub default_max_age_days: i64,
}

impl EngineConfig {
    pub fn new(encryption_key: [u8; 32]) -> Self {
        Self {
            index_dimension: None,
            temporal_dimension: 8,
            encryption_key,
            confidentiality_enabled: true,
            default_max_memories: 10_000,
            default_min_importance: 3.0,
            default_max_age_days: 365,
        }
    }

    /// Load the master key from `AGENCY_MEMORY_KEY`. Fails loudly when the
    /// variable is absent or malformed rather than falling back to a random
    /// key.
    pub fn from_env() -> Result<Self> {
        let hex_key = std::env::var(MEMORY_KEY_ENV)
            .with_context(|| format!("{} must be set (64 hex chars)", MEMORY_KEY_ENV))?;
        let bytes = hex::decode(hex_key.trim())
            .with_context(|| format!("{} is not valid hex", MEMORY_KEY_ENV))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("{} must decode to exactly 32 bytes", MEMORY_KEY_ENV))?;
        Ok(Self::new(key))
    }

    pub fn with_index_dimension(mut self, dimension: usize) -> Self {
        self.index_dimension = Some(dimension);
        self
    }

    pub fn with_confidentiality(mut self, enabled: bool) -> Self {
        self.confidentiality_enabled = enabled;
        self
    }
}

/// One persona known to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeProfile {
    pub role: Role,
    pub department: String,
}

/// Injected employee id -> role/department lookup. Replaces hidden global
/// tables so tests can substitute their own roster.
#[derive(Debug, Clone, Default)]
pub struct EmployeeDirectory {
    employees: HashMap<String, EmployeeProfile>,
}

impl EmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        employee_id: impl Into<String>,
        role: Role,
        department: impl Into<String>,
    ) -> Self {
        self.employees.insert(
            employee_id.into(),
            EmployeeProfile {
                role,
                department: department.into(),
            },
        );
        self
    }

    pub fn lookup(&self, employee_id: &str) -> Option<&EmployeeProfile> {
        self.employees.get(employee_id)
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.employees.keys()
    }
}
