//! Embedder interface consumed by the store.
//!
//! The store never computes embeddings itself; it hands batches of text to an
//! injected [`Embedder`] and validates what comes back.
//!
//! - `hashing`: deterministic, network-free embedder for tests and offline use
//! - `local`: fastembed-backed ONNX model (feature `local-model`)

mod hashing;
#[cfg(feature = "local-model")]
mod local;

use async_trait::async_trait;

use crate::embedding::Embedding;

pub use hashing::HashEmbedder;
#[cfg(feature = "local-model")]
pub use local::{FastEmbedder, LocalModelError};

/// Turns batches of text into embeddings.
///
/// Implementations must return exactly one embedding per document, in input
/// order, all sharing one provider tag and one length.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError>;

    /// Provider tag of the embeddings this embedder produces, when known up
    /// front. Lets the store reuse stored embeddings for unchanged text from
    /// the first insert on. Without it, a store re-embeds unchanged text
    /// until the embedder has answered once and its tag is known.
    fn provider(&self) -> Option<&str> {
        None
    }
}

/// Opaque passthrough of whatever the embedder raised.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct EmbedderError(#[from] anyhow::Error);

impl EmbedderError {
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        EmbedderError(anyhow::Error::msg(message))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}
