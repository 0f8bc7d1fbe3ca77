//! Capacity reclaimer.
//!
//! Runs before generation so that a subject always has at least
//! `min(required_count, pool size)` eligible targets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use crate::config::MemoryConfig;
use crate::domain::{ReclaimAction, ReclaimReport, Subject, Target};
use crate::error::EngineError;
use crate::persistence::MemoryStore;
use crate::retry::{RetryPolicy, with_backoff};

#[derive(Debug, Clone)]
pub struct Reclaimer {
    store: Arc<dyn MemoryStore>,
    settings: MemoryConfig,
    retry: RetryPolicy,
}

impl Reclaimer {
    pub fn new(store: Arc<dyn MemoryStore>, settings: MemoryConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            settings,
            retry,
        }
    }

    async fn recent_counts(
        &self,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, EngineError> {
        let since = now - Duration::days(self.settings.prefilter_days());
        let store = &self.store;
        with_backoff(&self.retry, "count_recent_by_target", move || {
            store.count_recent_by_target(subject_id, since)
        })
        .await
    }

    /// Targets of the pool with no memory newer than the prefilter window.
    pub async fn eligible_targets(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<Vec<Target>, EngineError> {
        let recent = self.recent_counts(&subject.subject_id, now).await?;
        Ok(subject
            .targets
            .iter()
            .filter(|t| !recent.contains_key(&t.target_id))
            .cloned()
            .collect())
    }

    /// Frees targets when too few are eligible, then returns the eligible set.
    #[instrument(skip_all, fields(subject_id = %subject.subject_id))]
    pub async fn reclaim(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<(ReclaimReport, Vec<Target>), EngineError> {
        let pool_size = subject.targets.len();
        let required = self.settings.required_count.min(pool_size);
        let recent = self.recent_counts(&subject.subject_id, now).await?;
        let eligible_before = subject
            .targets
            .iter()
            .filter(|t| !recent.contains_key(&t.target_id))
            .count();

        let (action, records_deleted) = if pool_size == 0 || eligible_before >= required {
            (ReclaimAction::None, 0)
        } else if eligible_before == 0 {
            let store = &self.store;
            let subject_id = subject.subject_id.as_str();
            let deleted = with_backoff(&self.retry, "delete_all", move || {
                store.delete_all(subject_id)
            })
            .await?;
            (ReclaimAction::FullReset, deleted)
        } else {
            let blocked: HashSet<&str> = subject
                .targets
                .iter()
                .map(|t| t.target_id.as_str())
                .filter(|id| recent.contains_key(*id))
                .collect();
            let count = self
                .records_to_free(&subject.subject_id, &blocked, required - eligible_before)
                .await?;
            let store = &self.store;
            let subject_id = subject.subject_id.as_str();
            let deleted = with_backoff(&self.retry, "delete_oldest", move || {
                store.delete_oldest(subject_id, count)
            })
            .await?;
            (ReclaimAction::PartialReset, deleted)
        };

        let eligible = if action == ReclaimAction::None {
            subject
                .targets
                .iter()
                .filter(|t| !recent.contains_key(&t.target_id))
                .cloned()
                .collect()
        } else {
            self.eligible_targets(subject, now).await?
        };

        let report = ReclaimReport {
            action,
            pool_size,
            eligible_before,
            eligible_after: eligible.len(),
            records_deleted,
        };
        if action == ReclaimAction::None {
            debug!(eligible = eligible.len(), pool_size, "Enough eligible targets");
        } else {
            info!(
                ?action,
                eligible_before,
                eligible_after = report.eligible_after,
                records_deleted,
                "Reclaimed memory"
            );
        }

        Ok((report, eligible))
    }

    /// Smallest number of oldest records whose removal unblocks `needed` targets.
    ///
    /// A blocked target is freed once its newest record is deleted, so the
    /// answer is the position of the `needed`-th earliest "newest record".
    async fn records_to_free(
        &self,
        subject_id: &str,
        blocked: &HashSet<&str>,
        needed: usize,
    ) -> Result<usize, EngineError> {
        let store = &self.store;
        let mut history = with_backoff(&self.retry, "history", move || {
            store.history(subject_id, None, None)
        })
        .await?;
        history.reverse();

        let mut newest_position: HashMap<&str, usize> = HashMap::new();
        for (position, record) in history.iter().enumerate() {
            if let Some(target) = blocked.get(record.target_id.as_str()) {
                newest_position.insert(*target, position);
            }
        }

        let mut positions: Vec<usize> = newest_position.into_values().collect();
        positions.sort_unstable();
        Ok(positions
            .get(needed.min(positions.len()).saturating_sub(1))
            .map_or(needed, |p| p + 1))
    }
}
