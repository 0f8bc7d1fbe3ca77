//! Concurrent batch orchestrator.
//!
//! Subjects are split into fixed-size groups. Each group runs on its own task
//! (at most `max_concurrent_groups` at once) and processes its subjects one
//! after another under a shared deadline. Results come back in input order
//! whatever the completion order was.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

use super::pipeline::SubjectPipeline;
use crate::config::BatchConfig;
use crate::domain::{BatchPhase, BatchReport, BatchSummary, Subject, SubjectResult};
use crate::error::EngineError;

/// A group's members, tagged with their position in the input list.
type Group = Vec<(usize, Subject)>;
type GroupOutput = Vec<(usize, SubjectResult)>;

#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    pipeline: Arc<SubjectPipeline>,
    settings: BatchConfig,
}

/// Splits subjects into consecutive groups of `group_size` (the last may be smaller).
pub fn partition(subjects: Vec<Subject>, group_size: usize) -> Result<Vec<Group>, EngineError> {
    if group_size == 0 {
        return Err(EngineError::Partition("group size must be at least 1".into()));
    }

    let mut groups: Vec<Group> = Vec::with_capacity(subjects.len().div_ceil(group_size));
    for (index, subject) in subjects.into_iter().enumerate() {
        if index % group_size == 0 {
            groups.push(Vec::with_capacity(group_size));
        }
        if let Some(group) = groups.last_mut() {
            group.push((index, subject));
        }
    }
    Ok(groups)
}

async fn run_group(
    pipeline: Arc<SubjectPipeline>,
    group_index: usize,
    members: Group,
    now: DateTime<Utc>,
    timeout: Duration,
) -> GroupOutput {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut out = Vec::with_capacity(members.len());
    let mut timed_out = false;

    for (index, subject) in members {
        if timed_out {
            out.push((
                index,
                SubjectResult::failed(&subject.subject_id, &EngineError::GroupTimeout(timeout)),
            ));
            continue;
        }

        // Owned here so that work finished before the deadline is still reported
        let mut result = SubjectResult::new(&subject.subject_id);
        let processed =
            tokio::time::timeout_at(deadline, pipeline.process_into(&subject, now, &mut result))
                .await;
        if processed.is_err() {
            warn!(
                group = group_index,
                subject_id = %subject.subject_id,
                timeout_secs = timeout.as_secs(),
                stored = result.stored_count(),
                "Group deadline elapsed"
            );
            result.error = Some(EngineError::GroupTimeout(timeout).descriptor());
            timed_out = true;
        }
        out.push((index, result));
    }

    debug!(group = group_index, subjects = out.len(), "Group finished");
    out
}

/// Turns a finished group task into per-subject results, even if the task died.
fn collect_group(
    group_index: usize,
    roster: Vec<(usize, String)>,
    joined: Result<Result<GroupOutput, EngineError>, JoinError>,
) -> GroupOutput {
    let err = match joined {
        Ok(Ok(results)) => return results,
        Ok(Err(err)) => err,
        Err(join_err) => EngineError::GroupAborted(join_err.to_string()),
    };

    error!(group = group_index, error = %err, "Group aborted");
    roster
        .into_iter()
        .map(|(index, subject_id)| (index, SubjectResult::failed(subject_id, &err)))
        .collect()
}

impl BatchOrchestrator {
    pub fn new(pipeline: Arc<SubjectPipeline>, settings: BatchConfig) -> Self {
        Self { pipeline, settings }
    }

    #[instrument(skip_all, fields(subjects = subjects.len(), parallel = self.settings.parallel_enabled))]
    pub async fn run(&self, subjects: Vec<Subject>, now: DateTime<Utc>) -> BatchReport {
        let started = Instant::now();
        let ids: Vec<String> = subjects.iter().map(|s| s.subject_id.clone()).collect();
        debug!(phase = ?BatchPhase::Pending, "Batch created");

        let groups = match partition(subjects, self.settings.group_size) {
            Ok(groups) => groups,
            Err(err) => {
                error!(phase = ?BatchPhase::Failed, error = %err, "Batch failed");
                let results: Vec<SubjectResult> = ids
                    .iter()
                    .map(|id| SubjectResult::failed(id, &err))
                    .collect();
                return Self::report(BatchPhase::Failed, 0, results, started);
            }
        };
        let group_count = groups.len();
        debug!(phase = ?BatchPhase::Partitioned, group_count, "Subjects partitioned");

        debug!(phase = ?BatchPhase::Running, "Running groups");
        let outputs = self.execute(groups, now).await;

        let mut slots: Vec<Option<SubjectResult>> = ids.iter().map(|_| None).collect();
        for (index, result) in outputs {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }
        let results: Vec<SubjectResult> = slots
            .into_iter()
            .zip(&ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    SubjectResult::failed(id, &EngineError::GroupAborted("no result recorded".into()))
                })
            })
            .collect();
        debug!(phase = ?BatchPhase::Aggregated, "Results merged");

        let report = Self::report(BatchPhase::Done, group_count, results, started);
        info!(
            processed = report.summary.processed_subjects,
            stored = report.summary.stored_count,
            filtered = report.summary.filtered_count,
            invalid = report.summary.invalid_count,
            failed = report.summary.failed_subject_count,
            duration_ms = report.duration_ms,
            "Batch done"
        );
        report
    }

    /// Spawns one task per group. In sequential mode each task is awaited
    /// before the next is spawned, so both modes share the same isolation.
    async fn execute(&self, groups: Vec<Group>, now: DateTime<Utc>) -> GroupOutput {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_groups.max(1)));
        let timeout = Duration::from_secs(self.settings.group_timeout_secs);
        let parallel = self.settings.parallel_enabled;

        let mut outputs = Vec::new();
        let mut pending = Vec::with_capacity(groups.len());

        for (group_index, members) in groups.into_iter().enumerate() {
            let roster: Vec<(usize, String)> = members
                .iter()
                .map(|(index, s)| (*index, s.subject_id.clone()))
                .collect();
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::GroupAborted(e.to_string()))?;
                Ok::<_, EngineError>(run_group(pipeline, group_index, members, now, timeout).await)
            });

            if parallel {
                pending.push((group_index, roster, handle));
            } else {
                outputs.extend(collect_group(group_index, roster, handle.await));
            }
        }

        let joined = join_all(pending.into_iter().map(|(group_index, roster, handle)| async move {
            collect_group(group_index, roster, handle.await)
        }))
        .await;
        outputs.extend(joined.into_iter().flatten());
        outputs
    }

    fn report(
        phase: BatchPhase,
        group_count: usize,
        results: Vec<SubjectResult>,
        started: Instant,
    ) -> BatchReport {
        BatchReport {
            phase,
            group_count,
            summary: BatchSummary::from_results(&results),
            results,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
