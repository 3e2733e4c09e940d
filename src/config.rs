use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::index::{lexical, DEFAULT_SEMANTIC_WEIGHT};

/// Config file name inside the store directory
pub const CONFIG_FILE_NAME: &str = "passagedb.yaml";

/// Result limit when the caller passes none
const DEFAULT_LIMIT: usize = 10;
/// Embedder input is truncated to this many characters
const DEFAULT_MAX_EMBED_CHARS: usize = 2048;

/// Store tuning. Every field has a default, so a partial YAML file is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Search result limit used when the caller passes `None`
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Persist embeddings as 16-bit floats
    #[serde(default)]
    pub half_precision: bool,

    /// BM25 term-frequency saturation
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f32,

    /// BM25 length normalization [0.0, 1.0]
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f32,

    /// Default semantic weight for hybrid search [0.0, 1.0]
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Maximum characters of text handed to the embedder
    #[serde(default = "default_max_embed_chars")]
    pub max_embed_chars: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            half_precision: false,
            bm25_k1: lexical::DEFAULT_K1,
            bm25_b: lexical::DEFAULT_B,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            max_embed_chars: DEFAULT_MAX_EMBED_CHARS,
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_bm25_k1() -> f32 {
    lexical::DEFAULT_K1
}

fn default_bm25_b() -> f32 {
    lexical::DEFAULT_B
}

fn default_semantic_weight() -> f32 {
    DEFAULT_SEMANTIC_WEIGHT
}

fn default_max_embed_chars() -> usize {
    DEFAULT_MAX_EMBED_CHARS
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.default_limit == 0 {
            return Err(StoreError::Config(
                "default_limit must be greater than 0".to_string(),
            ));
        }

        if !(self.bm25_k1.is_finite() && self.bm25_k1 >= 0.0) {
            return Err(StoreError::Config(format!(
                "bm25_k1 must be a non-negative number, got {}",
                self.bm25_k1
            )));
        }

        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(StoreError::Config(format!(
                "bm25_b must be between 0.0 and 1.0, got {}",
                self.bm25_b
            )));
        }

        if !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(StoreError::Config(format!(
                "semantic_weight must be between 0.0 and 1.0, got {}",
                self.semantic_weight
            )));
        }

        // room for at least one character plus the ellipsis
        if self.max_embed_chars < 4 {
            return Err(StoreError::Config(format!(
                "max_embed_chars must be at least 4, got {}",
                self.max_embed_chars
            )));
        }

        Ok(())
    }

    /// Load `passagedb.yaml` from `dir`, or defaults when the file is absent.
    pub fn load_with(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_str = std::fs::read_to_string(&path)?;
        let config: Self = serde_yml::from_str(&config_str)
            .map_err(|e| StoreError::Config(format!("{} is malformed: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Write this config to `dir/passagedb.yaml`.
    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let config_str = serde_yml::to_string(self)
            .map_err(|e| StoreError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(dir.join(CONFIG_FILE_NAME), config_str)?;
        Ok(())
    }
}
