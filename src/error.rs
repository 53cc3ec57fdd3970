//! Engine Error Taxonomy
//!
//! Every error carries the employee id and the operation that produced it,
//! so log lines are attributable without extra context.

use thiserror::Error;

/// Errors surfaced by the memory engine.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Bad memory type or empty content. Rejected before any I/O, never retried.
    #[error("validation failed for '{employee_id}' during {operation}: {reason}")]
    Validation {
        employee_id: String,
        operation: &'static str,
        reason: String,
    },

    /// Index or cache write failure on the primary write path.
    #[error("storage failure for '{employee_id}' during {operation}: {source}")]
    Storage {
        employee_id: String,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Index or cache read failure on the primary read path.
    #[error("retrieval failure for '{employee_id}' during {operation}: {source}")]
    Retrieval {
        employee_id: String,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Encryption of a sensitive field failed. Fatal for the record.
    #[error("encryption failed for '{employee_id}' during {operation}: {reason}")]
    Encryption {
        employee_id: String,
        operation: &'static str,
        reason: String,
    },

    /// Tag mismatch or malformed envelope. Distinct from NotFound so callers
    /// can tell "corrupted/key mismatch" from "absent".
    #[error("decryption failed for '{employee_id}' during {operation}: {reason}")]
    Decryption {
        employee_id: String,
        operation: &'static str,
        reason: String,
    },

    /// Restore or permanent delete targeting a nonexistent or deleted record.
    #[error("record '{id}' not found for '{employee_id}' during {operation}")]
    NotFound {
        employee_id: String,
        operation: &'static str,
        id: String,
    },
}

impl MemoryError {
    pub fn validation(
        employee_id: impl Into<String>,
        operation: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            employee_id: employee_id.into(),
            operation,
            reason: reason.into(),
        }
    }

    pub fn storage(
        employee_id: impl Into<String>,
        operation: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::Storage {
            employee_id: employee_id.into(),
            operation,
            source,
        }
    }

    pub fn retrieval(
        employee_id: impl Into<String>,
        operation: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::Retrieval {
            employee_id: employee_id.into(),
            operation,
            source,
        }
    }

    pub fn not_found(
        employee_id: impl Into<String>,
        operation: &'static str,
        id: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            employee_id: employee_id.into(),
            operation,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
