//! Cooldown/similarity gate.
//!
//! A candidate is compared against the subject's bounded history. Advice that
//! is too close to something said inside the cooldown window is suppressed;
//! similar advice outside the window is let through as `repeated_no_change`;
//! everything else is `new`. Accepted candidates are written to the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::{HistoryScope, MemoryConfig};
use crate::domain::{CandidateRecommendation, MemoryRecord, MemoryStatus, NewMemoryRecord};
use crate::error::EngineError;
use crate::persistence::MemoryStore;
use crate::retry::{RetryPolicy, with_backoff};
use crate::similarity::{Similarity, SimilarityError, classify, similarity};

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Suppress {
        max_similarity: f32,
        previous_at: DateTime<Utc>,
    },
    Allow {
        status: MemoryStatus,
        max_similarity: Option<f32>,
    },
}

/// Pure decision for one fingerprint against a history slice.
///
/// Records whose dimension differs from `fingerprint` are treated as different.
/// When several records share the highest score the newest one (first in
/// `history`) decides the age.
pub fn evaluate(
    fingerprint: &[f32],
    history: &[MemoryRecord],
    now: DateTime<Utc>,
    threshold: f32,
    cooldown_days: i64,
) -> GateDecision {
    let mut best: Option<(f32, &MemoryRecord)> = None;

    for record in history {
        match similarity(fingerprint, &record.embedding) {
            Ok(score) => {
                if best.is_none_or(|(top, _)| score > top) {
                    best = Some((score, record));
                }
            }
            Err(err) => {
                let err = EngineError::from(err);
                debug!(
                    record_id = %record.id,
                    kind = ?err.kind(),
                    error = %err,
                    "Skipping incomparable record"
                );
            }
        }
    }

    match best {
        Some((score, record)) if classify(score, threshold) == Similarity::Similar => {
            let age_days = (now - record.created_at).num_days();
            if age_days < cooldown_days {
                GateDecision::Suppress {
                    max_similarity: score,
                    previous_at: record.created_at,
                }
            } else {
                GateDecision::Allow {
                    status: MemoryStatus::RepeatedNoChange,
                    max_similarity: Some(score),
                }
            }
        }
        other => GateDecision::Allow {
            status: MemoryStatus::New,
            max_similarity: other.map(|(score, _)| score),
        },
    }
}

#[derive(Debug)]
pub enum GateOutcome {
    /// Accepted and remembered.
    Stored {
        record: MemoryRecord,
        max_similarity: Option<f32>,
    },
    /// Accepted without consulting or writing memory.
    Passed,
    Suppressed {
        max_similarity: f32,
        previous_at: DateTime<Utc>,
    },
    /// No usable fingerprint; never stored.
    Invalid { message: String },
}

#[derive(Debug, Clone)]
pub struct Gate {
    store: Arc<dyn MemoryStore>,
    settings: MemoryConfig,
    retry: RetryPolicy,
}

impl Gate {
    pub fn new(store: Arc<dyn MemoryStore>, settings: MemoryConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            settings,
            retry,
        }
    }

    async fn bounded_history(
        &self,
        candidate: &CandidateRecommendation,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        let target = match self.settings.history_scope {
            HistoryScope::PerTarget => Some(candidate.target_id.as_str()),
            HistoryScope::Subject => None,
        };
        let store = &self.store;
        let subject_id = candidate.subject_id.as_str();
        let limit = Some(self.settings.history_limit);

        with_backoff(&self.retry, "history", move || {
            store.history(subject_id, target, limit)
        })
        .await
    }

    /// Decides on one candidate and stores it when allowed.
    ///
    /// `fingerprint` is `None` when no fingerprint was requested because memory
    /// is disabled. Only store failures are returned as errors.
    #[instrument(skip_all, fields(subject_id = %candidate.subject_id, target_id = %candidate.target_id))]
    pub async fn admit(
        &self,
        candidate: &CandidateRecommendation,
        fingerprint: Option<Result<Vec<f32>, EngineError>>,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, EngineError> {
        if !self.settings.enabled {
            return Ok(GateOutcome::Passed);
        }

        let fingerprint = match fingerprint {
            Some(Ok(vector)) if vector.is_empty() => {
                return Ok(GateOutcome::Invalid {
                    message: EngineError::from(SimilarityError::EmptyVector).to_string(),
                });
            }
            Some(Ok(vector)) => vector,
            Some(Err(err)) => {
                return Ok(GateOutcome::Invalid {
                    message: err.to_string(),
                });
            }
            None => {
                return Ok(GateOutcome::Invalid {
                    message: "No fingerprint was produced".into(),
                });
            }
        };

        let history = self.bounded_history(candidate).await?;
        let decision = evaluate(
            &fingerprint,
            &history,
            now,
            self.settings.similarity_threshold,
            self.settings.cooldown_days,
        );

        match decision {
            GateDecision::Suppress {
                max_similarity,
                previous_at,
            } => {
                debug!(max_similarity, %previous_at, "Suppressed inside cooldown");
                Ok(GateOutcome::Suppressed {
                    max_similarity,
                    previous_at,
                })
            }
            GateDecision::Allow {
                status,
                max_similarity,
            } => {
                let new_record = NewMemoryRecord {
                    subject_id: candidate.subject_id.clone(),
                    target_id: candidate.target_id.clone(),
                    text: candidate.memory_text(),
                    embedding: fingerprint,
                    created_at: now,
                    status,
                };
                let store = &self.store;
                let record = with_backoff(&self.retry, "insert", move || {
                    store.insert(new_record.clone())
                })
                .await?;

                debug!(%status, record_id = %record.id, "Stored recommendation");
                Ok(GateOutcome::Stored {
                    record,
                    max_similarity,
                })
            }
        }
    }
}
