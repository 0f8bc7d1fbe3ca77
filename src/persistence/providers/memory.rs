//! In-process memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{MemoryRecord, NewMemoryRecord};
use crate::error::EngineError;
use crate::persistence::MemoryStore;

/// Keeps records per subject in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    subjects: RwLock<HashMap<String, Vec<MemoryRecord>>>,
    next_seq: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all subjects.
    pub async fn len(&self) -> usize {
        self.subjects.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn oldest_first(a: &MemoryRecord, b: &MemoryRecord) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq))
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<MemoryRecord, EngineError> {
        let stored = MemoryRecord {
            id: Uuid::new_v4(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            subject_id: record.subject_id,
            target_id: record.target_id,
            text: record.text,
            embedding: record.embedding,
            created_at: record.created_at,
            status: record.status,
        };

        self.subjects
            .write()
            .await
            .entry(stored.subject_id.clone())
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn history(
        &self,
        subject_id: &str,
        target_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        let subjects = self.subjects.read().await;
        let mut records: Vec<MemoryRecord> = subjects
            .get(subject_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| target_id.is_none_or(|t| r.target_id == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        records.sort_by(|a, b| oldest_first(b, a));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn count_recent_by_target(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, EngineError> {
        let subjects = self.subjects.read().await;
        let mut counts = HashMap::new();
        for record in subjects.get(subject_id).into_iter().flatten() {
            if record.created_at > since {
                *counts.entry(record.target_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn delete_oldest(&self, subject_id: &str, count: usize) -> Result<usize, EngineError> {
        let mut subjects = self.subjects.write().await;
        let Some(records) = subjects.get_mut(subject_id) else {
            return Ok(0);
        };

        records.sort_by(oldest_first);
        let removed = count.min(records.len());
        records.drain(..removed);
        Ok(removed)
    }

    async fn delete_all(&self, subject_id: &str) -> Result<usize, EngineError> {
        Ok(self
            .subjects
            .write()
            .await
            .remove(subject_id)
            .map_or(0, |records| records.len()))
    }
}
