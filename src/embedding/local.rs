//! On-device embeddings with `fastembed`.

use anyhow::{Result, bail};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{Embedder, ensure_one_to_one};
use crate::error::EngineError;

/// A model that is moved into blocking tasks and handed back afterwards.
///
/// The slot is empty while a task holds the model. If that task panics the
/// model is lost and the next call loads a fresh one.
struct ModelSlot<M> {
    inner: Mutex<Option<M>>,
}

impl<M: Send + 'static> ModelSlot<M> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    async fn is_loaded(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Runs `work` on the model in a blocking task, loading it first if needed.
    async fn run<R, L, W>(&self, load: L, work: W) -> Result<R, EngineError>
    where
        R: Send + 'static,
        L: FnOnce() -> Result<M, EngineError> + Send + 'static,
        W: FnOnce(&mut M) -> R + Send + 'static,
    {
        let mut guard = self.inner.lock().await;
        let taken = guard.take();

        let joined = tokio::task::spawn_blocking(move || {
            let mut model = match taken {
                Some(model) => model,
                None => load()?,
            };
            let out = work(&mut model);
            Ok::<_, EngineError>((out, model))
        })
        .await;

        match joined {
            Ok(Ok((out, model))) => {
                *guard = Some(model);
                Ok(out)
            }
            Ok(Err(err)) => Err(err),
            Err(join_err) => {
                warn!(error = %join_err, "Embedding task died, model will be reloaded");
                Err(EngineError::EmbeddingFailure(format!(
                    "Embedding task failed: {join_err}"
                )))
            }
        }
    }
}

pub struct LocalEmbedder {
    slot: ModelSlot<TextEmbedding>,
    kind: EmbeddingModel,
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model", &self.kind)
            .finish_non_exhaustive()
    }
}

fn load_model(kind: EmbeddingModel) -> Result<TextEmbedding, EngineError> {
    info!(model = ?kind, "Initializing fastembed model...");
    let mut options = InitOptions::new(kind);
    options.show_download_progress = false;
    TextEmbedding::try_new(options).map_err(|e| EngineError::EmbeddingFailure(e.to_string()))
}

impl LocalEmbedder {
    pub fn new(model_name: &str) -> Result<Self> {
        let kind = match model_name.to_ascii_lowercase().as_str() {
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            other => bail!("Unsupported local embedding model: {other}"),
        };

        Ok(Self {
            slot: ModelSlot::new(),
            kind,
        })
    }

    /// Loads (and on first use downloads) the model ahead of the first batch.
    pub async fn initialize(&self) -> Result<()> {
        if !self.slot.is_loaded().await {
            let kind = self.kind.clone();
            self.slot.run(move || load_model(kind), |_| ()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let kind = self.kind.clone();
        let inputs = texts.to_vec();
        let vectors = self
            .slot
            .run(
                move || load_model(kind),
                move |model| model.embed(inputs, None),
            )
            .await?
            .map_err(|e| EngineError::EmbeddingFailure(e.to_string()))?;

        ensure_one_to_one(texts.len(), &vectors, None)?;
        Ok(vectors)
    }
}
