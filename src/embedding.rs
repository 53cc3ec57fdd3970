//! Embedding Composition
//!
//! Produces the three fixed-length vectors for a memory: semantic,
//! task-contextual (role-biased), and temporal. The embedding model itself is
//! an external collaborator behind [`TextEmbedder`]; this module owns prompt
//! composition, normalization, and deterministic resizing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::roles::Role;

/// Days for one e-fold of recency decay. Shared with the ranker.
pub const RECENCY_DECAY_DAYS: f64 = 30.0;

/// External embedding-inference collaborator: text in, fixed-length vector
/// out at the model's native dimension.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Native output dimension of the model.
    fn dimension(&self) -> usize;
}

/// The three vectors stored alongside every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSet {
    pub semantic: Vec<f32>,
    pub task_contextual: Vec<f32>,
    pub temporal: Vec<f32>,
}

/// Composes embeddings for records and queries.
pub struct EmbeddingComposer {
    embedder: Arc<dyn TextEmbedder>,
    index_dimension: Option<usize>,
    temporal_dimension: usize,
}

impl EmbeddingComposer {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        index_dimension: Option<usize>,
        temporal_dimension: usize,
    ) -> Self {
        Self {
            embedder,
            index_dimension,
            temporal_dimension,
        }
    }

    /// Dimension actually written to the index.
    pub fn index_dimension(&self) -> usize {
        self.index_dimension.unwrap_or_else(|| self.embedder.dimension())
    }

    /// Semantic vector for raw text, normalized and resized to the index
    /// dimension.
    pub async fn semantic(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = self
            .embedder
            .embed(text)
            .await
            .context("semantic embedding failed")?;
        normalize(&mut vector);
        Ok(self.resize(vector))
    }

    /// Role-biased vector: the role's fixed context sentence is prepended
    /// before embedding, pulling the vector toward that role's vocabulary.
    pub async fn task_contextual(&self, text: &str, role: Role) -> Result<Vec<f32>> {
        let prompt = format!("{} {}", role.context_sentence(), text);
        let mut vector = self
            .embedder
            .embed(&prompt)
            .await
            .context("task-contextual embedding failed")?;
        normalize(&mut vector);
        Ok(self.resize(vector))
    }

    /// Temporal vector, a pure closed-form function of the timestamp's age.
    /// Element 0 is the recency decay; 1-3 encode hour/weekday/month as
    /// fractions; the rest is a periodic fill derived from age.
    pub fn temporal(&self, timestamp: DateTime<Utc>) -> Vec<f32> {
        self.temporal_at(timestamp, Utc::now())
    }

    /// [`Self::temporal`] with an explicit "now", so the function stays
    /// deterministic under test.
    pub fn temporal_at(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Vec<f32> {
        let age_days = (now - timestamp).num_seconds().max(0) as f64 / 86_400.0;
        let mut vector = vec![0.0f32; self.temporal_dimension];

        if self.temporal_dimension > 0 {
            vector[0] = (-age_days / RECENCY_DECAY_DAYS).exp() as f32;
        }
        if self.temporal_dimension > 1 {
            vector[1] = timestamp.hour() as f32 / 24.0;
        }
        if self.temporal_dimension > 2 {
            vector[2] = timestamp.weekday().num_days_from_monday() as f32 / 7.0;
        }
        if self.temporal_dimension > 3 {
            vector[3] = timestamp.month0() as f32 / 12.0;
        }
        for (i, slot) in vector.iter_mut().enumerate().skip(4) {
            *slot = ((age_days / (i as f64 + 1.0)).sin() * 0.5 + 0.5) as f32;
        }
        vector
    }

    /// Compose all three vectors for a record.
    pub async fn compose(
        &self,
        text: &str,
        role: Role,
        timestamp: DateTime<Utc>,
    ) -> Result<EmbeddingSet> {
        let semantic = self.semantic(text).await?;
        let task_contextual = self.task_contextual(text, role).await?;
        let temporal = self.temporal(timestamp);
        Ok(EmbeddingSet {
            semantic,
            task_contextual,
            temporal,
        })
    }

    /// Deterministic resize to the configured index dimension: pad with
    /// zeros or truncate. No-op when no dimension is configured.
    fn resize(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if let Some(target) = self.index_dimension {
            vector.resize(target, 0.0);
        }
        vector
    }
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Deterministic, dependency-free embedder: each whitespace token is hashed
/// into the vector, then the result is normalized. Useful as a test double
/// and as a degraded fallback when no inference backend is reachable.
/// Related tokens do not cluster, but identical text always maps to the same
/// vector.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        // Matches the native dimension of all-MiniLM-L6-v2.
        Self::new(384)
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            for (i, pair) in digest.chunks_exact(2).enumerate() {
                let slot = (u16::from_le_bytes([pair[0], pair[1]]) as usize
                    + i * 31)
                    % self.dimension;
                let sign = if pair[0] & 1 == 0 { 1.0 } else { -1.0 };
                vector[slot] += sign;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn composer(index_dimension: Option<usize>) -> EmbeddingComposer {
        EmbeddingComposer::new(Arc::new(HashEmbedder::new(32)), index_dimension, 8)
    }

    #[tokio::test]
    async fn semantic_is_deterministic_and_normalized() {
        let composer = composer(None);
        let a = composer.semantic("microservices with docker").await.unwrap();
        let b = composer.semantic("microservices with docker").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn resize_pads_and_truncates() {
        let padded = composer(Some(48)).semantic("hello world").await.unwrap();
        assert_eq!(padded.len(), 48);
        assert!(padded[32..].iter().all(|x| *x == 0.0));

        let truncated = composer(Some(16)).semantic("hello world").await.unwrap();
        assert_eq!(truncated.len(), 16);
    }

    #[tokio::test]
    async fn role_prefix_changes_the_vector() {
        let composer = composer(None);
        let plain = composer.semantic("ship the release").await.unwrap();
        let biased = composer
            .task_contextual("ship the release", Role::DevopsEngineer)
            .await
            .unwrap();
        assert_ne!(plain, biased);
    }

    #[test]
    fn temporal_has_fixed_length_and_decays() {
        let composer = composer(None);
        let now = Utc::now();
        let fresh = composer.temporal_at(now, now);
        let month = composer.temporal_at(now - Duration::days(30), now);
        let quarter = composer.temporal_at(now - Duration::days(90), now);

        assert_eq!(fresh.len(), 8);
        assert!(fresh[0] > month[0]);
        assert!(month[0] > quarter[0]);
        assert!((fresh[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn temporal_calendar_fractions() {
        let composer = composer(None);
        let ts = DateTime::parse_from_rfc3339("2026-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let vector = composer.temporal_at(ts, ts);
        assert_eq!(vector[1], 12.0 / 24.0);
        assert_eq!(vector[3], 5.0 / 12.0);
    }
}
