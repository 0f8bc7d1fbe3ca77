//! Per-subject pipeline: reclaim, generate, validate, fingerprint, gate.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::gate::{Gate, GateOutcome};
use super::reclaimer::Reclaimer;
use crate::config::MemoryConfig;
use crate::domain::{
    AcceptedRecommendation, CandidateRecommendation, MemoryStatus, RejectReason, Rejection,
    Subject, SubjectResult, Target,
};
use crate::embedding::{Embedder, ensure_one_to_one};
use crate::error::EngineError;
use crate::generator::{MemoryNote, PromptContext, RecommendationGenerator, validate_candidates};
use crate::persistence::MemoryStore;
use crate::retry::{RetryPolicy, with_backoff};

/// Remembered advice shown to the generator per target.
const PRIOR_NOTES_PER_TARGET: usize = 3;
const PRIOR_NOTE_MAX_CHARS: usize = 150;

type Fingerprint = Option<Result<Vec<f32>, EngineError>>;

#[derive(Debug)]
pub struct SubjectPipeline {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn RecommendationGenerator>,
    gate: Gate,
    reclaimer: Reclaimer,
    settings: MemoryConfig,
    retry: RetryPolicy,
}

impl SubjectPipeline {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn RecommendationGenerator>,
        settings: MemoryConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gate: Gate::new(Arc::clone(&store), settings.clone(), retry),
            reclaimer: Reclaimer::new(Arc::clone(&store), settings.clone(), retry),
            store,
            embedder,
            generator,
            settings,
            retry,
        }
    }

    /// Runs one subject end to end. Failures end up in `SubjectResult::error`.
    pub async fn process(&self, subject: &Subject, now: DateTime<Utc>) -> SubjectResult {
        let mut result = SubjectResult::new(&subject.subject_id);
        self.process_into(subject, now, &mut result).await;
        result
    }

    /// Like [`Self::process`], but fills a result owned by the caller.
    ///
    /// Every stored record is pushed to `result` as soon as its insert
    /// completes, so a caller that drops this future (e.g. on a deadline)
    /// still sees what was persisted.
    #[instrument(skip_all, fields(subject_id = %subject.subject_id))]
    pub async fn process_into(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
        result: &mut SubjectResult,
    ) {
        if let Err(err) = self.run(subject, now, result).await {
            warn!(error = %err, kind = ?err.kind(), "Subject failed");
            result.error = Some(err.descriptor());
        } else {
            info!(
                accepted = result.accepted.len(),
                filtered = result.filtered_count(),
                invalid = result.invalid_count(),
                "Subject processed"
            );
        }
    }

    async fn run(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
        result: &mut SubjectResult,
    ) -> Result<(), EngineError> {
        let eligible = if self.settings.enabled {
            let (report, eligible) = self.reclaimer.reclaim(subject, now).await?;
            result.reclaim = Some(report);
            eligible
        } else {
            subject.targets.clone()
        };

        let expected = self.settings.required_count.min(eligible.len());
        if expected == 0 {
            info!("Subject has no targets to recommend");
            return Ok(());
        }

        let context = PromptContext {
            as_of: now.date_naive(),
            expected_count: expected,
            prior_memory: self.prior_memory(&subject.subject_id, &eligible).await?,
        };

        let generator = &self.generator;
        let (eligible_ref, context_ref) = (&eligible, &context);
        let candidates = with_backoff(&self.retry, "generate", move || {
            generator.generate(subject, eligible_ref, context_ref)
        })
        .await?;

        if let Err(err) = validate_candidates(&subject.subject_id, &candidates, &eligible, expected)
        {
            reject_all(result, candidates, &err);
            return Err(err);
        }

        let fingerprints = self.fingerprint(&candidates).await;
        let mut pending = candidates.into_iter().zip(fingerprints);
        while let Some((candidate, fingerprint)) = pending.next() {
            let outcome = match self.gate.admit(&candidate, fingerprint, now).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // The failed candidate and everything after it were never gated
                    let ungated = std::iter::once(candidate).chain(pending.map(|(c, _)| c));
                    reject_all(result, ungated, &err);
                    return Err(err);
                }
            };
            match outcome {
                GateOutcome::Stored {
                    record,
                    max_similarity,
                } => result.accepted.push(AcceptedRecommendation {
                    candidate,
                    status: record.status,
                    record_id: Some(record.id),
                    max_similarity,
                }),
                GateOutcome::Passed => result.accepted.push(AcceptedRecommendation {
                    candidate,
                    status: MemoryStatus::New,
                    record_id: None,
                    max_similarity: None,
                }),
                GateOutcome::Suppressed {
                    max_similarity,
                    previous_at,
                } => result.rejected.push(Rejection {
                    candidate,
                    reason: RejectReason::Suppressed {
                        max_similarity,
                        previous_at,
                    },
                }),
                GateOutcome::Invalid { message } => result.rejected.push(Rejection {
                    candidate,
                    reason: RejectReason::Invalid { message },
                }),
            }
        }

        Ok(())
    }

    /// Latest remembered advice for each eligible target.
    async fn prior_memory(
        &self,
        subject_id: &str,
        eligible: &[Target],
    ) -> Result<BTreeMap<String, Vec<MemoryNote>>, EngineError> {
        let mut notes: BTreeMap<String, Vec<MemoryNote>> = BTreeMap::new();
        if !self.settings.enabled {
            return Ok(notes);
        }

        let store = &self.store;
        let history = with_backoff(&self.retry, "history", move || {
            store.history(subject_id, None, None)
        })
        .await?;

        let eligible_ids: HashSet<&str> = eligible.iter().map(|t| t.target_id.as_str()).collect();
        for record in history {
            if !eligible_ids.contains(record.target_id.as_str()) {
                continue;
            }
            let entry = notes.entry(record.target_id.clone()).or_default();
            if entry.len() < PRIOR_NOTES_PER_TARGET {
                entry.push(MemoryNote {
                    text: record.text.chars().take(PRIOR_NOTE_MAX_CHARS).collect(),
                    recorded_on: record.created_at.date_naive(),
                });
            }
        }
        Ok(notes)
    }

    /// One fingerprint slot per candidate.
    ///
    /// Tries a single batch call first; if that keeps failing, embeds each
    /// candidate on its own so one bad item does not sink the others.
    async fn fingerprint(&self, candidates: &[CandidateRecommendation]) -> Vec<Fingerprint> {
        if !self.settings.enabled {
            return candidates.iter().map(|_| None).collect();
        }

        let texts: Vec<String> = candidates
            .iter()
            .map(CandidateRecommendation::memory_text)
            .collect();
        let embedder = &self.embedder;
        let texts_ref = &texts;

        let batch = with_backoff(&self.retry, "embed_batch", move || {
            embedder.embed_batch(texts_ref)
        })
        .await
        .and_then(|vectors| ensure_one_to_one(texts.len(), &vectors, None).map(|()| vectors));

        match batch {
            Ok(vectors) => vectors.into_iter().map(|v| Some(Ok(v))).collect(),
            Err(err) => {
                warn!(error = %err, "Batch embedding failed, embedding candidates one by one");
                let mut out = Vec::with_capacity(texts.len());
                for text in &texts {
                    let text = text.as_str();
                    out.push(Some(
                        with_backoff(&self.retry, "embed", move || embedder.embed(text)).await,
                    ));
                }
                out
            }
        }
    }
}

/// Records `candidates` as invalid because of `err`.
fn reject_all(
    result: &mut SubjectResult,
    candidates: impl IntoIterator<Item = CandidateRecommendation>,
    err: &EngineError,
) {
    let message = err.to_string();
    result
        .rejected
        .extend(candidates.into_iter().map(|candidate| Rejection {
            candidate,
            reason: RejectReason::Invalid {
                message: message.clone(),
            },
        }));
}
