use serde::{Deserialize, Serialize};

/// Urgency tier, ordered `Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    #[serde(alias = "MEDIA", alias = "medium")]
    Medium,
    #[serde(alias = "ALTA", alias = "high")]
    High,
    #[serde(alias = "CRÍTICA", alias = "CRITICA", alias = "critical")]
    Critical,
}

/// Where the generator says a recommendation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[serde(alias = "memoria", alias = "memory")]
    PriorMemory,
    #[serde(
        alias = "riesgo_critico",
        alias = "riesgo_alto",
        alias = "riesgo_medio",
        alias = "risk"
    )]
    RiskAnalysis,
    #[serde(alias = "problema_operacional", alias = "operational")]
    OperationalAnalysis,
    #[serde(alias = "oportunidad")]
    Opportunity,
}

/// A recommendation proposed by the generator for one (subject, target) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecommendation {
    pub subject_id: String,
    pub target_id: String,
    pub target_name: String,
    pub priority: Priority,
    pub action: String,
    pub justification: String,
    pub origin: Origin,
}

impl CandidateRecommendation {
    /// Text that gets fingerprinted and remembered.
    pub fn memory_text(&self) -> String {
        format!("{}: {}", self.action.trim(), self.justification.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
    }

    #[test]
    fn test_generator_labels_are_accepted() {
        let p: Priority = serde_json::from_str(r#""CRÍTICA""#).unwrap();
        assert_eq!(p, Priority::Critical);
        let o: Origin = serde_json::from_str(r#""problema_operacional""#).unwrap();
        assert_eq!(o, Origin::OperationalAnalysis);
        let o: Origin = serde_json::from_str(r#""riesgo_alto""#).unwrap();
        assert_eq!(o, Origin::RiskAnalysis);
    }
}
