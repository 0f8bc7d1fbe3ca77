//! OpenAI-compatible embeddings client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Embedder, ensure_one_to_one};
use crate::config::EmbeddingConfig;
use crate::error::EngineError;

#[derive(Clone)]
pub struct HttpEmbedder {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: Option<usize>,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> anyhow::Result<Self> {
        let base_url = cfg
            .base_url
            .as_deref()
            .context("embedding.base_url is not set")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
        })
    }
}

fn embedding_error(err: &reqwest::Error) -> EngineError {
    EngineError::EmbeddingFailure(err.to_string())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if let Some(dimensions) = self.dimensions {
            body["dimensions"] = serde_json::json!(dimensions);
        }

        let mut rb = self.http.post(&self.url).json(&body);
        if let Some(k) = &self.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| embedding_error(&e))?;
        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| embedding_error(&e))?;

        parsed.data.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|i| i.embedding).collect();
        ensure_one_to_one(texts.len(), &vectors, self.dimensions)?;

        debug!(count = vectors.len(), model = %self.model, "Embedded batch");
        Ok(vectors)
    }
}
