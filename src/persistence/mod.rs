use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::PersistenceConfig;
use crate::domain::{MemoryRecord, NewMemoryRecord};
use crate::error::EngineError;

pub mod providers;

pub use providers::memory::InMemoryStore;
pub use providers::postgres::PostgresStore;

/// Durable history of accepted recommendations, scoped by subject.
///
/// Implementations must tolerate concurrent callers working on different
/// subjects. Connectivity problems surface as [`EngineError::StoreUnavailable`].
#[async_trait]
pub trait MemoryStore: Send + Sync + std::fmt::Debug {
    /// Appends a record and returns it with its assigned id and sequence.
    async fn insert(&self, record: NewMemoryRecord) -> Result<MemoryRecord, EngineError>;

    /// Records of a subject, newest first, optionally for a single target.
    async fn history(
        &self,
        subject_id: &str,
        target_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, EngineError>;

    /// Number of records strictly newer than `since`, per target.
    ///
    /// Targets without such records are absent from the map.
    async fn count_recent_by_target(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, EngineError>;

    /// Removes the `count` oldest records of a subject (creation time, then
    /// insertion sequence). Returns how many were removed.
    async fn delete_oldest(&self, subject_id: &str, count: usize) -> Result<usize, EngineError>;

    /// Removes every record of a subject.
    async fn delete_all(&self, subject_id: &str) -> Result<usize, EngineError>;
}

/// Build the store selected by `persistence.provider`.
pub async fn connect(cfg: &PersistenceConfig) -> Result<Arc<dyn MemoryStore>> {
    match cfg.provider.as_str() {
        "memory" => {
            info!("Using in-process memory store; records are lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        }
        "postgres" => {
            let url = cfg
                .database_url
                .as_deref()
                .context("persistence.database_url is not set")?;
            let store = PostgresStore::new(url, cfg.max_connections)
                .await
                .context("Failed to connect to Postgres memory store")?;
            info!("Connected to Postgres memory store");
            Ok(Arc::new(store))
        }
        other => bail!("Unknown persistence provider: {other}"),
    }
}
