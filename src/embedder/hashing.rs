//! Deterministic feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dimensions` buckets with a hash-derived sign, so equal strings always map
//! to equal vectors and texts sharing words land close together. No network,
//! no model download.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Embedder, EmbedderError};
use crate::embedding::Embedding;

/// Default vector length
const DEFAULT_DIMENSIONS: usize = 256;

pub struct HashEmbedder {
    dimensions: usize,
    provider: String,
    calls: AtomicUsize,
    documents: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            provider: format!("hash-sha256-{dimensions}"),
            calls: AtomicUsize::new(0),
            documents: AtomicUsize::new(0),
        }
    }

    /// Override the provider tag, e.g. to simulate a model swap.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of `embed` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of documents embedded so far, across all calls.
    pub fn documents_embedded(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Embedding {
        let mut vectors = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[0..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vectors[bucket] += sign;
        }

        Embedding::new(vectors, self.provider.clone())
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents.fetch_add(documents.len(), Ordering::SeqCst);

        Ok(documents.iter().map(|d| self.embed_one(d)).collect())
    }

    fn provider(&self) -> Option<&str> {
        Some(&self.provider)
    }
}
