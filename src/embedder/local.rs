//! Local embedding model backed by fastembed.
//!
//! - Model download into a configurable cache directory on first use
//! - Batch embedding on the blocking thread pool
//! - Provider tag is the canonical model name

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};

use super::{Embedder, EmbedderError};
use crate::embedding::Embedding;

/// Error type for model initialization
#[derive(Debug, thiserror::Error)]
pub enum LocalModelError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    half_precision: bool,
}

impl FastEmbedder {
    /// Load `model_name`, downloading into `cache_dir/models` if not cached.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, LocalModelError> {
        let model_enum = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            LocalModelError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options)
            .map_err(|e| LocalModelError::InitFailed(e.to_string()))?;

        log::info!("Loaded local embedding model '{}'", model_name);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_lowercase(),
            half_precision: false,
        })
    }

    /// Tag produced embeddings for half-precision serialization.
    pub fn with_half_precision(mut self, half_precision: bool) -> Self {
        self.half_precision = half_precision;
        self
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, LocalModelError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-base-en-v1.5-q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
            _ => Err(LocalModelError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let model = self.model.clone();
        let texts = documents.to_vec();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| anyhow::anyhow!("Failed to acquire model lock: {}", e))?;
            model.embed(texts, None)
        })
        .await
        .map_err(|e| EmbedderError::from(anyhow::Error::new(e)))??;

        Ok(vectors
            .into_iter()
            .map(|v| Embedding::new(v, self.model_name.clone()).with_precision(self.half_precision))
            .collect())
    }

    fn provider(&self) -> Option<&str> {
        Some(&self.model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = FastEmbedder::new("nonexistent-model", temp_dir.path().to_path_buf());
        assert!(matches!(result, Err(LocalModelError::InvalidModel(_))));
    }

    #[tokio::test]
    #[ignore = "requires model download"]
    async fn test_embedding_generation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let embedder = FastEmbedder::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf()).unwrap();

        let embeddings = embedder
            .embed(&["Hello, world!".to_string()])
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].dimensions(), 384);
        assert_eq!(embeddings[0].provider(), "all-minilm-l6-v2");
    }
}
