use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CandidateRecommendation, MemoryStatus};
use crate::error::{EngineError, ErrorDescriptor};

/// A recommendation that passed the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedRecommendation {
    pub candidate: CandidateRecommendation,
    pub status: MemoryStatus,
    /// `None` when memory is disabled and nothing was stored.
    pub record_id: Option<Uuid>,
    pub max_similarity: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Too close to advice given inside the cooldown window.
    Suppressed {
        max_similarity: f32,
        previous_at: DateTime<Utc>,
    },
    /// Could not be produced: bad candidate set or no fingerprint.
    Invalid { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub candidate: CandidateRecommendation,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimAction {
    None,
    FullReset,
    PartialReset,
}

/// What the capacity reclaimer did for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimReport {
    pub action: ReclaimAction,
    pub pool_size: usize,
    pub eligible_before: usize,
    pub eligible_after: usize,
    pub records_deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectResult {
    pub subject_id: String,
    pub accepted: Vec<AcceptedRecommendation>,
    pub rejected: Vec<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim: Option<ReclaimReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl SubjectResult {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            accepted: Vec::new(),
            rejected: Vec::new(),
            reclaim: None,
            error: None,
        }
    }

    pub fn failed(subject_id: impl Into<String>, error: &EngineError) -> Self {
        let mut result = Self::new(subject_id);
        result.error = Some(error.descriptor());
        result
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn stored_count(&self) -> usize {
        self.accepted
            .iter()
            .filter(|a| a.record_id.is_some())
            .count()
    }

    pub fn filtered_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::Suppressed { .. }))
            .count()
    }

    pub fn invalid_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectReason::Invalid { .. }))
            .count()
    }
}

/// Counts that separate "suppressed on purpose" from "could not be produced".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed_subjects: usize,
    pub stored_count: usize,
    pub filtered_count: usize,
    pub invalid_count: usize,
    pub failed_subject_count: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[SubjectResult]) -> Self {
        results.iter().fold(
            Self {
                processed_subjects: results.len(),
                ..Self::default()
            },
            |mut acc, r| {
                acc.stored_count += r.stored_count();
                acc.filtered_count += r.filtered_count();
                acc.invalid_count += r.invalid_count();
                if !r.is_success() {
                    acc.failed_subject_count += 1;
                }
                acc
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Pending,
    Partitioned,
    Running,
    Aggregated,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub phase: BatchPhase,
    pub group_count: usize,
    pub results: Vec<SubjectResult>,
    pub summary: BatchSummary,
    pub duration_ms: u64,
}
