//! Error taxonomy shared by every engine component.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::similarity::SimilarityError;

/// Errors raised while producing, gating or storing recommendations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Two fingerprints could not be compared.
    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    /// The fingerprint provider failed or returned an unusable answer.
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// The memory store could not be reached or rejected the operation.
    #[error("Memory store unavailable: {0}")]
    StoreUnavailable(String),

    /// The recommendation generator failed at the transport or parsing level.
    #[error("Generator failure: {0}")]
    GeneratorFailure(String),

    /// The generator answered, but the candidate set is malformed.
    #[error("Generator returned an invalid candidate set: {0}")]
    GeneratorValidation(String),

    /// The group deadline elapsed before the subject finished.
    #[error("Group deadline of {}s elapsed", .0.as_secs())]
    GroupTimeout(Duration),

    /// The task running a group ended abnormally.
    #[error("Group aborted: {0}")]
    GroupAborted(String),

    /// Subjects could not be split into groups.
    #[error("Partitioning failed: {0}")]
    Partition(String),

    /// The subject data source failed.
    #[error("Data source error: {0}")]
    DataSource(String),
}

impl EngineError {
    /// Transient failures that a call site may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::EmbeddingFailure(_) | Self::GeneratorFailure(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Similarity(SimilarityError::DimensionMismatch { .. }) => {
                ErrorKind::DimensionMismatch
            }
            Self::Similarity(SimilarityError::EmptyVector) => ErrorKind::EmptyVector,
            Self::EmbeddingFailure(_) => ErrorKind::EmbeddingFailure,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::GeneratorFailure(_) => ErrorKind::GeneratorFailure,
            Self::GeneratorValidation(_) => ErrorKind::GeneratorValidation,
            Self::GroupTimeout(_) => ErrorKind::GroupTimeout,
            Self::GroupAborted(_) => ErrorKind::GroupAborted,
            Self::Partition(_) => ErrorKind::Partition,
            Self::DataSource(_) => ErrorKind::DataSource,
        }
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// Stable, serializable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DimensionMismatch,
    EmptyVector,
    EmbeddingFailure,
    StoreUnavailable,
    GeneratorFailure,
    GeneratorValidation,
    GroupTimeout,
    GroupAborted,
    Partition,
    DataSource,
}

/// Error entry attached to a subject result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}
