//! BM25 Okapi full-text index.
//!
//! An inverted index from term to per-document term frequency, plus document
//! lengths for length normalization. Documents are keyed by record id.
//!
//! Scoring per query term present in a document:
//!
//! ```text
//! idf  = ln((N - df + 0.5) / (df + 0.5) + 1)
//! tf'  = tf * (k1 + 1) / (tf + k1 * (1 - b + b * dl / avgdl))
//! ```

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

/// Default term-frequency saturation
pub const DEFAULT_K1: f32 = 1.2;
/// Default length normalization
pub const DEFAULT_B: f32 = 0.75;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Tokenize text: lowercase, split on non-alphanumeric.
///
/// Every token is indexed, stop words included, so any text can be found by
/// its own words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinct query terms without stop words and single characters.
///
/// A query made only of such words falls back to all of its terms.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();

    let significant: Vec<String> = terms
        .iter()
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(t.as_str()))
        .cloned()
        .collect();

    if significant.is_empty() {
        terms
    } else {
        significant
    }
}

#[derive(Debug, Clone)]
struct DocStats {
    length: u32,
    /// Distinct terms, so removal touches only the postings it owns
    terms: Vec<String>,
}

/// Inverted index over record text.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    /// term -> (record id -> term frequency)
    postings: HashMap<String, HashMap<String, u32>>,
    docs: HashMap<String, DocStats>,
    total_length: u64,
    k1: f32,
    b: f32,
}

impl LexicalIndex {
    pub fn new(k1: f32, b: f32) -> Self {
        Self {
            postings: HashMap::new(),
            docs: HashMap::new(),
            total_length: 0,
            k1,
            b,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Index `text` under `id`, replacing any previous text for that id.
    pub fn insert(&mut self, id: &str, text: &str) {
        self.remove(id);

        let tokens = tokenize(text);
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.clone()).or_insert(0) += 1;
        }

        let terms: Vec<String> = frequencies.keys().cloned().collect();
        for (term, tf) in frequencies {
            self.postings
                .entry(term)
                .or_default()
                .insert(id.to_string(), tf);
        }

        let length = tokens.len() as u32;
        self.total_length += length as u64;
        self.docs.insert(id.to_string(), DocStats { length, terms });
    }

    /// Remove `id` from the index. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(stats) = self.docs.remove(id) else {
            return false;
        };

        for term in &stats.terms {
            if let Some(docs) = self.postings.get_mut(term) {
                docs.remove(id);
                if docs.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_length -= stats.length as u64;
        true
    }

    fn average_doc_length(&self) -> f32 {
        if self.docs.is_empty() {
            return 0.0;
        }
        self.total_length as f32 / self.docs.len() as f32
    }

    /// Score every document matching at least one query term.
    ///
    /// Returns `(record id, score)` sorted by descending score. Equal scores
    /// keep no particular order; callers apply their own tie-break.
    pub fn search(&self, query: &str) -> Vec<(String, f32)> {
        let query_terms = query_terms(query);

        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f32;
        let avgdl = self.average_doc_length().max(f32::EPSILON);
        let (k1, b) = (self.k1, self.b);

        let mut scores: HashMap<&str, f32> = HashMap::new();
        for term in &query_terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };

            let df = docs.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (id, tf) in docs {
                let dl = self.docs.get(id).map(|d| d.length).unwrap_or(0) as f32;
                let tf = *tf as f32;
                let tf_norm = (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avgdl));

                *scores.entry(id.as_str()).or_insert(0.0) += idf * tf_norm;
            }
        }

        let mut results: Vec<(String, f32)> = scores
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}
