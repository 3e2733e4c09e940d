//! In-memory vector index with cosine similarity search.
//!
//! Stores record embeddings keyed by record id, together with the content
//! hash of the text they were computed from.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::embedding::{cosine_similarity, Embedding};

/// Below this many entries scoring stays on the calling thread.
const PARALLEL_THRESHOLD: usize = 2048;

/// An entry in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// Hash of the prepared text that was embedded
    pub content_hash: u64,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: HashMap<String, VectorEntry>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the entry for `id`.
    pub fn insert(&mut self, id: &str, content_hash: u64, embedding: Embedding) {
        self.entries.insert(
            id.to_string(),
            VectorEntry {
                content_hash,
                embedding,
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> Option<VectorEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&VectorEntry> {
        self.entries.get(id)
    }

    /// Score every entry comparable with `query` (same provider and length).
    ///
    /// Entries from another provider are skipped, not scored as zero, so a
    /// swapped embedder never surfaces stale vectors. Results are sorted by
    /// descending similarity; equal scores keep no particular order.
    pub fn search(&self, query: &Embedding) -> Vec<(String, f32)> {
        let score = |(id, entry): (&String, &VectorEntry)| {
            if entry.embedding.is_comparable(query) {
                Some((id.clone(), cosine_similarity(query, &entry.embedding)))
            } else {
                None
            }
        };

        let mut results: Vec<(String, f32)> = if self.entries.len() >= PARALLEL_THRESHOLD {
            self.entries.par_iter().filter_map(score).collect()
        } else {
            self.entries.iter().filter_map(score).collect()
        };

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}
