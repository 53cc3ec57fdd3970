//! Agency Memory Engine
//!
//! Private, semantically searchable memory for a fixed set of autonomous
//! agent personas:
//! - Per-agent namespaces with role-based permissions
//! - Three-signal embedding composition (semantic, task-contextual, temporal)
//! - Field-level AES-GCM confidentiality keyed per agent
//! - Weighted multi-factor relevance ranking
//! - Archive/restore/cleanup lifecycle
//!
//! The vector index, cache store, and embedding model are external
//! collaborators behind traits; in-memory implementations are provided for
//! tests and single-node use.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod lifecycle;
pub mod namespace;
pub mod ranker;
pub mod record;
pub mod retriever;
pub mod roles;
pub mod store;
pub mod telemetry;

// Re-exports for convenience
pub use config::{EmployeeDirectory, EngineConfig};
pub use engine::MemoryEngine;
pub use error::MemoryError;
pub use record::{MemoryRecord, MemoryType, RawMemory};
pub use roles::Role;
