use crate::embedder::EmbedderError;

/// Top-level error returned by every [`crate::Store`] operation.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("invalid config: {0}")]
    Config(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(StorageError::Io(err))
    }
}

/// Failures of the backing directory.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store directory {0} is locked by another instance")]
    Locked(String),

    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("checksum mismatch: file header may be corrupted")]
    ChecksumMismatch,
}

/// Failures to encode or decode embeddings and records.
#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("vector payload of {len} bytes is not a multiple of {width}")]
    InvalidLength { len: usize, width: usize },

    #[error("embedding has neither `vectors` nor `vectorsHalfPrecision`")]
    MissingVectors,

    #[error("embedding has both `vectors` and `vectorsHalfPrecision`")]
    AmbiguousVectors,

    #[error("embedder returned {got} embeddings for {expected} documents")]
    EmbeddingCountMismatch { expected: usize, got: usize },

    #[error("embedder returned mixed providers: {0} and {1}")]
    MixedProviders(String, String),

    #[error("embedder returned mixed dimensions: {0} and {1}")]
    MixedDimensions(usize, usize),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
