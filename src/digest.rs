//! Context Summarizer and Expertise Analyzer
//!
//! Aggregates ranked or filtered candidates into a task-context digest or a
//! per-domain expertise profile for prompt injection.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::ranker::RankedMemory;
use crate::record::{MemoryRecord, MemoryType};

const PREVIEW_CHARS: usize = 100;
const EXPERIENCE_PREVIEWS: usize = 3;
const KNOWLEDGE_PREVIEWS: usize = 3;
const DECISION_PREVIEWS: usize = 2;

/// Digest of the memories most relevant to a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub task_description: String,
    pub total_candidates: usize,
    pub experience_count: usize,
    pub knowledge_count: usize,
    pub decision_count: usize,
    pub interaction_count: usize,
    pub avg_relevance: f64,
    pub experience_previews: Vec<String>,
    pub knowledge_previews: Vec<String>,
    pub decision_previews: Vec<String>,
}

/// Truncate to a maximum character count on UTF-8 boundaries.
fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let cut: String = content.chars().take(max_chars).collect();
    format!("{cut}...")
}

/// Summarize ranked candidates into a task-context digest.
pub fn summarize(ranked: &[RankedMemory], task_description: &str) -> TaskContext {
    let mut context = TaskContext {
        task_description: task_description.to_string(),
        total_candidates: ranked.len(),
        experience_count: 0,
        knowledge_count: 0,
        decision_count: 0,
        interaction_count: 0,
        avg_relevance: 0.0,
        experience_previews: Vec::new(),
        knowledge_previews: Vec::new(),
        decision_previews: Vec::new(),
    };

    for candidate in ranked {
        let text = preview(&candidate.record.content, PREVIEW_CHARS);
        match candidate.record.memory_type {
            MemoryType::Experience => {
                context.experience_count += 1;
                if context.experience_previews.len() < EXPERIENCE_PREVIEWS {
                    context.experience_previews.push(text);
                }
            }
            MemoryType::Knowledge => {
                context.knowledge_count += 1;
                if context.knowledge_previews.len() < KNOWLEDGE_PREVIEWS {
                    context.knowledge_previews.push(text);
                }
            }
            MemoryType::Decision => {
                context.decision_count += 1;
                if context.decision_previews.len() < DECISION_PREVIEWS {
                    context.decision_previews.push(text);
                }
            }
            MemoryType::Interaction => context.interaction_count += 1,
        }
        context.avg_relevance += candidate.relevance;
    }

    if !ranked.is_empty() {
        context.avg_relevance /= ranked.len() as f64;
    }
    context
}

/// Per-domain expertise derived from a persona's memories.
#[derive(Debug, Clone, Serialize)]
pub struct ExpertiseProfile {
    pub domain: String,
    /// min(10, sum of experience+knowledge importance / 10)
    pub expertise_score: f64,
    /// Memories created in the last 30 days.
    pub recent_activity: usize,
    /// Up to five most frequent tags.
    pub key_skills: Vec<String>,
    /// min(10, avg importance * count / 5)
    pub confidence: f64,
}

/// Analyze candidates already filtered for a domain.
pub fn analyze(candidates: &[MemoryRecord], domain: &str) -> ExpertiseProfile {
    analyze_at(candidates, domain, Utc::now())
}

pub fn analyze_at(
    candidates: &[MemoryRecord],
    domain: &str,
    now: DateTime<Utc>,
) -> ExpertiseProfile {
    let importance_sum: f64 = candidates
        .iter()
        .filter(|r| {
            matches!(
                r.memory_type,
                MemoryType::Experience | MemoryType::Knowledge
            )
        })
        .map(|r| r.metadata.importance)
        .sum();

    let cutoff = now - Duration::days(30);
    let recent_activity = candidates
        .iter()
        .filter(|r| r.metadata.timestamp >= cutoff)
        .count();

    let mut tag_counts: HashMap<&str, usize> = HashMap::new();
    for record in candidates {
        for tag in &record.metadata.tags {
            *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    let mut tags: Vec<(&str, usize)> = tag_counts.into_iter().collect();
    // Frequency first, then alphabetical so the output is deterministic.
    tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let key_skills = tags.into_iter().take(5).map(|(t, _)| t.to_string()).collect();

    let confidence = if candidates.is_empty() {
        0.0
    } else {
        let avg_importance: f64 = candidates
            .iter()
            .map(|r| r.metadata.importance)
            .sum::<f64>()
            / candidates.len() as f64;
        (avg_importance * candidates.len() as f64 / 5.0).min(10.0)
    };

    ExpertiseProfile {
        domain: domain.to_string(),
        expertise_score: (importance_sum / 10.0).min(10.0),
        recent_activity,
        key_skills,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::record::{LifecycleState, MemoryContext, RecordMetadata};
    use crate::retriever::RetrievedMemory;
    use crate::roles::Role;

    fn record(
        id: &str,
        memory_type: MemoryType,
        content: &str,
        importance: f64,
        tags: &[&str],
        age_days: i64,
    ) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            employee_id: "emp_001".to_string(),
            memory_type,
            content: content.to_string(),
            context: MemoryContext::empty_for(memory_type),
            metadata: RecordMetadata {
                timestamp: Utc::now() - Duration::days(age_days),
                importance,
                tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
                department: "engineering".to_string(),
                role: Role::SoftwareEngineer,
                confidence: None,
                encrypted: true,
            },
            state: LifecycleState::Active,
            access_count: 0,
            last_accessed: None,
        }
    }

    fn ranked(record: MemoryRecord, relevance: f64) -> RankedMemory {
        RankedMemory {
            similarity: relevance as f32,
            relevance,
            record,
        }
    }

    #[test]
    fn summarize_counts_and_previews() {
        let long = "x".repeat(150);
        let candidates = vec![
            ranked(record("1", MemoryType::Experience, &long, 8.0, &[], 0), 0.9),
            ranked(record("2", MemoryType::Experience, "short", 5.0, &[], 0), 0.8),
            ranked(record("3", MemoryType::Experience, "third", 5.0, &[], 0), 0.7),
            ranked(record("4", MemoryType::Experience, "fourth", 5.0, &[], 0), 0.6),
            ranked(record("5", MemoryType::Knowledge, "fact", 5.0, &[], 0), 0.5),
            ranked(record("6", MemoryType::Decision, "chose", 5.0, &[], 0), 0.4),
        ];

        let context = summarize(&candidates, "implement the service");
        assert_eq!(context.experience_count, 4);
        assert_eq!(context.experience_previews.len(), 3);
        assert_eq!(context.knowledge_count, 1);
        assert_eq!(context.decision_previews.len(), 1);
        assert_eq!(context.experience_previews[0].chars().count(), 103);
        assert!((context.avg_relevance - 0.65).abs() < 1e-9);
    }

    #[test]
    fn preview_respects_utf8() {
        let text = "п".repeat(120);
        let cut = preview(&text, 100);
        assert_eq!(cut.chars().count(), 103);
    }

    #[test]
    fn expertise_formulas() {
        let candidates = vec![
            record("1", MemoryType::Experience, "a", 8.0, &["docker", "rust"], 3),
            record("2", MemoryType::Knowledge, "b", 6.0, &["docker"], 10),
            record("3", MemoryType::Interaction, "c", 9.0, &["standup"], 60),
        ];

        let profile = analyze(&candidates, "infrastructure");
        // Interaction importance excluded from expertise.
        assert!((profile.expertise_score - 1.4).abs() < 1e-9);
        assert_eq!(profile.recent_activity, 2);
        assert_eq!(profile.key_skills[0], "docker");
        // avg importance 23/3, confidence = avg * 3 / 5 = 4.6
        assert!((profile.confidence - 4.6).abs() < 1e-9);
    }

    #[test]
    fn empty_candidates_yield_zeroes() {
        let profile = analyze(&[], "anything");
        assert_eq!(profile.expertise_score, 0.0);
        assert_eq!(profile.confidence, 0.0);
        assert!(profile.key_skills.is_empty());
    }
}
