//! Fingerprint providers.
//!
//! The engine only sees the [`Embedder`] trait. Two providers ship with the crate:
//!
//! - [`HttpEmbedder`]: any OpenAI-compatible `/v1/embeddings` endpoint.
//! - [`LocalEmbedder`]: an on-device `fastembed` model.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::EngineError;

pub mod http;
pub mod local;

pub use http::HttpEmbedder;
pub use local::LocalEmbedder;

#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EngineError::EmbeddingFailure("Provider returned no vector".into()))
    }
}

/// Stand-in used when memory is disabled and no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Err(EngineError::EmbeddingFailure(
            "No embedding provider configured".into(),
        ))
    }
}

/// Fails unless the provider returned exactly one vector per input.
pub(crate) fn ensure_one_to_one(
    inputs: usize,
    vectors: &[Vec<f32>],
    dimensions: Option<usize>,
) -> Result<(), EngineError> {
    if vectors.len() != inputs {
        return Err(EngineError::EmbeddingFailure(format!(
            "Expected {inputs} vectors, provider returned {}",
            vectors.len()
        )));
    }
    let Some(expected) = dimensions else {
        return Ok(());
    };
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(EngineError::EmbeddingFailure(format!(
            "Expected {expected}-dimensional vectors, got {}",
            bad.len()
        ))),
        None => Ok(()),
    }
}

/// Build the provider selected by `embedding.provider`.
pub async fn from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match cfg.provider.as_str() {
        "http" => Ok(Arc::new(HttpEmbedder::new(cfg)?)),
        "local" => {
            let embedder = LocalEmbedder::new(&cfg.model)?;
            embedder.initialize().await?;
            Ok(Arc::new(embedder))
        }
        other => bail!("Unknown embedding provider: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_to_one_check() {
        assert!(ensure_one_to_one(2, &[vec![1.0], vec![2.0]], Some(1)).is_ok());
        assert!(ensure_one_to_one(3, &[vec![1.0], vec![2.0]], None).is_err());
        assert!(ensure_one_to_one(1, &[vec![1.0, 2.0]], Some(3)).is_err());
    }
}
