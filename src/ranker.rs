//! Relevance Ranker
//!
//! Orders retrieved candidates against a task description with a weighted
//! blend of similarity, caller-assigned importance, task-type affinity, and
//! recency. The sort is stable so ties keep their retrieval order.

use chrono::{DateTime, Utc};

use crate::embedding::RECENCY_DECAY_DAYS;
use crate::record::{MemoryRecord, MemoryType};
use crate::retriever::RetrievedMemory;

const SIMILARITY_WEIGHT: f64 = 0.4;
const IMPORTANCE_WEIGHT: f64 = 0.3;
const TYPE_WEIGHT: f64 = 0.2;
const RECENCY_WEIGHT: f64 = 0.1;

/// A candidate with its composite relevance score.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub record: MemoryRecord,
    pub similarity: f32,
    pub relevance: f64,
}

/// How well a memory kind fits the task wording.
pub fn type_score(memory_type: MemoryType, task_description: &str) -> f64 {
    let task = task_description.to_lowercase();
    match memory_type {
        MemoryType::Experience => {
            if task.contains("implement") || task.contains("build") {
                0.9
            } else {
                0.7
            }
        }
        MemoryType::Knowledge => {
            if task.contains("learn") || task.contains("understand") {
                0.9
            } else {
                0.8
            }
        }
        MemoryType::Decision => {
            if task.contains("plan") || task.contains("decide") || task.contains("architecture") {
                0.9
            } else {
                0.6
            }
        }
        MemoryType::Interaction => 0.5,
    }
}

/// Exponential recency decay with a 30-day e-fold.
pub fn recency(timestamp: DateTime<Utc>) -> f64 {
    recency_at(timestamp, Utc::now())
}

pub fn recency_at(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - timestamp).num_seconds().max(0) as f64 / 86_400.0;
    (-age_days / RECENCY_DECAY_DAYS).exp()
}

/// Score and order candidates, best first.
pub fn rank(candidates: Vec<RetrievedMemory>, task_description: &str) -> Vec<RankedMemory> {
    rank_at(candidates, task_description, Utc::now())
}

pub fn rank_at(
    candidates: Vec<RetrievedMemory>,
    task_description: &str,
    now: DateTime<Utc>,
) -> Vec<RankedMemory> {
    let mut ranked: Vec<RankedMemory> = candidates
        .into_iter()
        .map(|candidate| {
            let relevance = SIMILARITY_WEIGHT * candidate.score as f64
                + IMPORTANCE_WEIGHT * (candidate.record.metadata.importance / 10.0)
                + TYPE_WEIGHT * type_score(candidate.record.memory_type, task_description)
                + RECENCY_WEIGHT * recency_at(candidate.record.metadata.timestamp, now);
            RankedMemory {
                similarity: candidate.score,
                relevance,
                record: candidate.record,
            }
        })
        .collect();

    // Vec::sort_by is stable; equal relevance preserves input order.
    ranked.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
