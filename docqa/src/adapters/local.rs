//! Local ONNX embeddings; the model is downloaded into the cache dir on first use.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{DocQaError, Result};
use crate::ports::EmbeddingGateway;

pub struct FastEmbedder {
    name: String,
    model: EmbeddingModel,
    dimension: usize,
    cache_dir: Option<PathBuf>,
    engine: OnceCell<Arc<TextEmbedding>>,
}

impl FastEmbedder {
    pub fn new(name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let (model, dimension) = resolve_model(name)?;
        Ok(Self {
            name: name.to_string(),
            model,
            dimension,
            cache_dir,
            engine: OnceCell::new(),
        })
    }

    async fn engine(&self) -> Result<Arc<TextEmbedding>> {
        self.engine
            .get_or_try_init(|| async {
                info!(model = %self.name, "loading local embedding model");
                let mut options = InitOptions::new(self.model.clone()).with_show_download_progress(false);
                if let Some(dir) = &self.cache_dir {
                    options = options.with_cache_dir(dir.clone());
                }

                let engine = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
                    .await
                    .map_err(|e| DocQaError::Embedding(format!("model loader panicked: {e}")))?
                    .map_err(|e| DocQaError::Embedding(format!("failed to load model: {e}")))?;
                Ok(Arc::new(engine))
            })
            .await
            .cloned()
    }
}

fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminilml6v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        other => Err(DocQaError::Config(format!(
            "unsupported local embedding model: {other}"
        ))),
    }
}

#[async_trait]
impl EmbeddingGateway for FastEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let engine = self.engine().await?;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || engine.embed(texts, None))
            .await
            .map_err(|e| DocQaError::Embedding(format!("embedding task panicked: {e}")))?
            .map_err(|e| DocQaError::Embedding(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}
