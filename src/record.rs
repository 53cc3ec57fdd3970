//! Memory Record types
//!
//! The data model for one stored unit of a persona's experience, plus the
//! pure validator that normalizes raw submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::MemoryError;
use crate::roles::Role;

/// The four kinds of memory a persona can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Experience,
    Knowledge,
    Decision,
    Interaction,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Experience,
        MemoryType::Knowledge,
        MemoryType::Decision,
        MemoryType::Interaction,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "experience" => Some(Self::Experience),
            "knowledge" => Some(Self::Knowledge),
            "decision" => Some(Self::Decision),
            "interaction" => Some(Self::Interaction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Experience => "experience",
            Self::Knowledge => "knowledge",
            Self::Decision => "decision",
            Self::Interaction => "interaction",
        }
    }
}

/// Type-specific structured context, tagged by memory kind. Each variant
/// carries its own typed fields plus an open extension map for forward
/// compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryContext {
    Experience {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_json::Value>,
    },
    Knowledge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_json::Value>,
    },
    Decision {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        alternatives: Vec<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_json::Value>,
    },
    Interaction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterpart: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_json::Value>,
    },
}

impl MemoryContext {
    /// Empty context of the right variant for a memory type.
    pub fn empty_for(memory_type: MemoryType) -> Self {
        match memory_type {
            MemoryType::Experience => Self::Experience {
                project: None,
                outcome: None,
                extra: BTreeMap::new(),
            },
            MemoryType::Knowledge => Self::Knowledge {
                domain: None,
                source: None,
                extra: BTreeMap::new(),
            },
            MemoryType::Decision => Self::Decision {
                rationale: None,
                alternatives: Vec::new(),
                extra: BTreeMap::new(),
            },
            MemoryType::Interaction => Self::Interaction {
                counterpart: None,
                channel: None,
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn memory_type(&self) -> MemoryType {
        match self {
            Self::Experience { .. } => MemoryType::Experience,
            Self::Knowledge { .. } => MemoryType::Knowledge,
            Self::Decision { .. } => MemoryType::Decision,
            Self::Interaction { .. } => MemoryType::Interaction,
        }
    }
}

/// Lifecycle state of a record. Deleted is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Archived,
    Deleted,
}

/// Metadata attached to every record after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub timestamp: DateTime<Utc>,
    /// Caller-assigned significance, clamped to [0, 10].
    pub importance: f64,
    pub tags: BTreeSet<String>,
    pub department: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub encrypted: bool,
}

/// A fully validated, decrypted memory record as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub employee_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub context: MemoryContext,
    pub metadata: RecordMetadata,
    pub state: LifecycleState,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

/// Raw submission as received from the API layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMemory {
    #[serde(rename = "type")]
    pub memory_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MemoryContext>,
    #[serde(default)]
    pub metadata: RawMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Output of validation: a normalized submission with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMemory {
    pub memory_type: MemoryType,
    pub content: String,
    pub context: MemoryContext,
    pub importance: f64,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub confidence: Option<f64>,
}

/// Normalize and check a raw submission. Pure: no I/O, no side effects.
///
/// Rejects unknown memory types and empty content; fills importance (5.0)
/// and timestamp (now) when absent; drops a context whose variant disagrees
/// with the declared type in favor of an empty one of the right kind.
pub fn validate(employee_id: &str, raw: RawMemory) -> Result<ValidatedMemory, MemoryError> {
    let memory_type = MemoryType::parse(raw.memory_type.trim()).ok_or_else(|| {
        MemoryError::validation(
            employee_id,
            "validate",
            format!("unknown memory type '{}'", raw.memory_type),
        )
    })?;

    if raw.content.trim().is_empty() {
        return Err(MemoryError::validation(
            employee_id,
            "validate",
            "content must not be empty",
        ));
    }

    let context = match raw.context {
        Some(ctx) if ctx.memory_type() == memory_type => ctx,
        Some(_) | None => MemoryContext::empty_for(memory_type),
    };

    Ok(ValidatedMemory {
        memory_type,
        content: raw.content,
        context,
        importance: raw.metadata.importance.unwrap_or(5.0).clamp(0.0, 10.0),
        timestamp: raw.metadata.timestamp.unwrap_or_else(Utc::now),
        tags: raw.metadata.tags,
        confidence: raw.metadata.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(memory_type: &str, content: &str) -> RawMemory {
        RawMemory {
            memory_type: memory_type.to_string(),
            content: content.to_string(),
            context: None,
            metadata: RawMetadata::default(),
        }
    }

    #[test]
    fn defaults_filled_in() {
        let validated = validate("emp_001", raw("experience", "x")).unwrap();
        assert_eq!(validated.importance, 5.0);
        let age = Utc::now() - validated.timestamp;
        assert!(age.num_seconds().abs() < 5);
    }

    #[test]
    fn unknown_type_rejected() {
        let err = validate("emp_001", raw("daydream", "x")).unwrap_err();
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn empty_content_rejected() {
        let err = validate("emp_001", raw("knowledge", "   ")).unwrap_err();
        assert!(matches!(err, MemoryError::Validation { .. }));
    }

    #[test]
    fn importance_clamped() {
        let mut submission = raw("decision", "chose postgres");
        submission.metadata.importance = Some(42.0);
        let validated = validate("emp_001", submission).unwrap();
        assert_eq!(validated.importance, 10.0);
    }

    #[test]
    fn mismatched_context_replaced() {
        let mut submission = raw("knowledge", "rust borrowck");
        submission.context = Some(MemoryContext::empty_for(MemoryType::Decision));
        let validated = validate("emp_001", submission).unwrap();
        assert_eq!(validated.context.memory_type(), MemoryType::Knowledge);
    }

    #[test]
    fn context_round_trips_with_extension_map() {
        let mut extra = BTreeMap::new();
        extra.insert("sprint".to_string(), serde_json::json!(14));
        let ctx = MemoryContext::Experience {
            project: Some("atlas".to_string()),
            outcome: None,
            extra,
        };
        let json = serde_json::to_string(&ctx).unwrap();
        let back: MemoryContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }
}
