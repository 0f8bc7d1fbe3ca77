//! Where subjects and their target pools come from.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use crate::domain::Subject;
use crate::error::EngineError;

#[async_trait]
pub trait DataSource: Send + Sync + std::fmt::Debug {
    async fn fetch_subjects(&self, as_of: NaiveDate) -> Result<Vec<Subject>, EngineError>;
}

/// Reads a JSON array of subjects exported by the reporting pipeline.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for JsonFileSource {
    async fn fetch_subjects(&self, as_of: NaiveDate) -> Result<Vec<Subject>, EngineError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::DataSource(format!("Cannot read {}: {e}", self.path.display()))
        })?;
        let subjects: Vec<Subject> = serde_json::from_str(&raw).map_err(|e| {
            EngineError::DataSource(format!("Invalid subjects file {}: {e}", self.path.display()))
        })?;

        info!(
            path = %self.path.display(),
            %as_of,
            subjects = subjects.len(),
            "Loaded subjects"
        );
        Ok(subjects)
    }
}
