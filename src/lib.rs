//! Embedded text store with BM25 full-text search and embedding similarity
//! search over the same records.

pub mod config;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod index;
pub mod lock;
pub mod persist;
pub mod record;
pub mod storage;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::StoreConfig;
pub use embedder::{Embedder, EmbedderError, HashEmbedder};
pub use embedding::{cosine_similarity, Embedding, EmbeddingWire};
pub use error::{EncodingError, StorageError, StoreError};
pub use record::{Payload, Record};
pub use store::Store;

#[cfg(feature = "local-model")]
pub use embedder::{FastEmbedder, LocalModelError};
