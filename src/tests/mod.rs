
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedder::{Embedder, EmbedderError, HashEmbedder};
use crate::embedding::Embedding;
use crate::record::Record;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub value: String,
}

pub fn note(id: &str, text: &str) -> Record<Note> {
    Record::new(id, text, Note { value: id.to_string() })
}

/// Fixed, distinct dates so ordering never depends on the wall clock.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn ids(records: &[Record<Note>]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

/// In-memory store plus a handle on its embedder's counters.
pub fn memory_store() -> (Store<Note>, Arc<HashEmbedder>) {
    let embedder = Arc::new(HashEmbedder::default());
    let store = Store::in_memory(embedder.clone());
    (store, embedder)
}

pub fn open_at(dir: &Path, embedder: Arc<dyn Embedder>) -> Store<Note> {
    Store::open(Some(dir.to_path_buf()), embedder).expect("failed to open store")
}

/// The six-record fruit corpus; four mention apples.
pub fn fruit_records() -> Vec<Record<Note>> {
    vec![
        note("f1", "I like apples").with_date(at(1)),
        note("f2", "Apples are crunchy").with_date(at(2)),
        note("f3", "I like apples and oranges").with_date(at(3)),
        note("f4", "Green apples are sour").with_date(at(4)),
        note("f5", "Oranges are juicy").with_date(at(5)),
        note("f6", "Bananas are yellow").with_date(at(6)),
    ]
}

/// Delegates to a [`HashEmbedder`] until told to fail.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    failing: AtomicBool,
}

impl FlakyEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::default(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedderError::msg("embedding service unavailable"));
        }
        self.inner.embed(documents).await
    }

    fn provider(&self) -> Option<&str> {
        self.inner.provider()
    }
}

/// A [`HashEmbedder`] that does not advertise its provider up front.
pub struct UntaggedEmbedder {
    pub inner: HashEmbedder,
}

impl UntaggedEmbedder {
    pub fn new(provider: &str) -> Self {
        Self {
            inner: HashEmbedder::default().with_provider(provider),
        }
    }
}

#[async_trait]
impl Embedder for UntaggedEmbedder {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        self.inner.embed(documents).await
    }
}

/// Maps known texts to hand-picked vectors.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(pairs: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            vectors: pairs
                .into_iter()
                .map(|(text, values)| (text.to_string(), values))
                .collect(),
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        documents
            .iter()
            .map(|d| {
                self.vectors
                    .get(d)
                    .map(|v| Embedding::new(v.clone(), "fixed"))
                    .ok_or_else(|| EmbedderError::msg(format!("no vector for '{d}'")))
            })
            .collect()
    }

    fn provider(&self) -> Option<&str> {
        Some("fixed")
    }
}

/// Breaks the embedder contract in a configurable way.
pub enum BrokenEmbedder {
    /// Returns one embedding fewer than asked for
    DropsOne,
    /// Alternates between two provider tags
    MixedProviders,
    /// Alternates between two vector lengths
    MixedDimensions,
}

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, documents: &[String]) -> Result<Vec<Embedding>, EmbedderError> {
        let embeddings = documents.iter().enumerate().map(|(i, _)| match self {
            BrokenEmbedder::DropsOne => Embedding::new(vec![1.0, 0.0], "broken"),
            BrokenEmbedder::MixedProviders => {
                Embedding::new(vec![1.0, 0.0], format!("broken-{}", i % 2))
            }
            BrokenEmbedder::MixedDimensions => {
                Embedding::new(vec![1.0; 2 + i % 2], "broken")
            }
        });

        Ok(match self {
            BrokenEmbedder::DropsOne => embeddings.skip(1).collect(),
            _ => embeddings.collect(),
        })
    }
}
