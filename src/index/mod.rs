//! Search indexes kept in step with the live record set.
//!
//! - `lexical`: BM25 inverted index over record text
//! - `vector`: embeddings keyed by record id, cosine similarity scan
//! - `hybrid`: weighted reciprocal rank fusion of the two rankings
//! - `preprocess`: embedder input preparation and change detection

pub mod hybrid;
pub mod lexical;
mod preprocess;
pub mod vector;

pub use hybrid::{rrf_fusion, FusedResult, DEFAULT_SEMANTIC_WEIGHT};
pub use lexical::{tokenize, LexicalIndex};
pub use preprocess::{content_hash, prepare_for_embedding};
pub use vector::{VectorEntry, VectorIndex};
