//! Recommendation generator boundary.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{CandidateRecommendation, Subject, Target};
use crate::error::EngineError;

pub mod chat;
pub mod prompt;

pub use chat::ChatGenerator;

/// Earlier advice for one target, handed to the generator as context.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryNote {
    pub text: String,
    pub recorded_on: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct PromptContext {
    pub as_of: NaiveDate,
    /// Number of candidates the generator must return.
    pub expected_count: usize,
    /// Latest remembered advice per eligible target id.
    pub prior_memory: BTreeMap<String, Vec<MemoryNote>>,
}

#[async_trait]
pub trait RecommendationGenerator: Send + Sync + std::fmt::Debug {
    async fn generate(
        &self,
        subject: &Subject,
        eligible: &[Target],
        context: &PromptContext,
    ) -> Result<Vec<CandidateRecommendation>, EngineError>;
}

/// Rejects a candidate set unless it has exactly `expected` recommendations
/// for the given subject, each about a distinct eligible target.
pub fn validate_candidates(
    subject_id: &str,
    candidates: &[CandidateRecommendation],
    eligible: &[Target],
    expected: usize,
) -> Result<(), EngineError> {
    let invalid = |msg: String| -> Result<(), EngineError> {
        Err(EngineError::GeneratorValidation(msg))
    };

    if candidates.len() != expected {
        return invalid(format!(
            "expected {expected} candidates, got {}",
            candidates.len()
        ));
    }

    let eligible_ids: HashSet<&str> = eligible.iter().map(|t| t.target_id.as_str()).collect();
    let mut seen = HashSet::with_capacity(candidates.len());

    for candidate in candidates {
        if candidate.subject_id != subject_id {
            return invalid(format!(
                "candidate for target {} belongs to subject {}",
                candidate.target_id, candidate.subject_id
            ));
        }
        if !eligible_ids.contains(candidate.target_id.as_str()) {
            return invalid(format!(
                "target {} is not in the eligible pool",
                candidate.target_id
            ));
        }
        if !seen.insert(candidate.target_id.as_str()) {
            return invalid(format!("target {} recommended twice", candidate.target_id));
        }
        if candidate.action.trim().is_empty() {
            return invalid(format!(
                "recommendation for target {} has no action",
                candidate.target_id
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Origin, Priority};

    fn target(id: &str) -> Target {
        Target {
            target_id: id.to_string(),
            name: id.to_string(),
            monthly_sales: 0.0,
            metrics: None,
            open_claims: 0,
            pickups: None,
        }
    }

    fn candidate(target_id: &str) -> CandidateRecommendation {
        CandidateRecommendation {
            subject_id: "S1".into(),
            target_id: target_id.into(),
            target_name: target_id.into(),
            priority: Priority::High,
            action: format!("Call {target_id}"),
            justification: "Sales dropped".into(),
            origin: Origin::RiskAnalysis,
        }
    }

    #[test]
    fn test_valid_set() {
        let eligible = [target("A"), target("B"), target("C")];
        let set = [candidate("A"), candidate("B"), candidate("C")];
        assert!(validate_candidates("S1", &set, &eligible, 3).is_ok());
    }

    #[test]
    fn test_rejects_wrong_count_out_of_pool_and_duplicates() {
        let eligible = [target("A"), target("B"), target("C")];

        let short = [candidate("A"), candidate("B")];
        assert!(matches!(
            validate_candidates("S1", &short, &eligible, 3),
            Err(EngineError::GeneratorValidation(_))
        ));

        let foreign = [candidate("A"), candidate("B"), candidate("Z")];
        let err = validate_candidates("S1", &foreign, &eligible, 3).unwrap_err();
        assert!(err.to_string().contains("Z is not in the eligible pool"));

        let twice = [candidate("A"), candidate("A"), candidate("B")];
        assert!(validate_candidates("S1", &twice, &eligible, 3).is_err());

        let mut blank = candidate("C");
        blank.action = "  ".into();
        let set = [candidate("A"), candidate("B"), blank];
        assert!(validate_candidates("S1", &set, &eligible, 3).is_err());
    }

    #[test]
    fn test_rejects_foreign_subject() {
        let eligible = [target("A")];
        let mut other = candidate("A");
        other.subject_id = "S2".into();
        assert!(validate_candidates("S1", &[other], &eligible, 1).is_err());
    }
}
