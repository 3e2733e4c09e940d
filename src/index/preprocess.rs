//! Text preprocessing for embedding generation.
//!
//! Prepares record text for the embedder:
//! 1. Trim whitespace
//! 2. Truncate to the configured length with an ellipsis
//!
//! The stored record text is never modified; only the embedder input is.

use sha2::{Digest, Sha256};

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Prepare `text` for embedding, truncating to at most `max_chars` characters.
pub fn prepare_for_embedding(text: &str, max_chars: usize) -> String {
    let text = text.trim();

    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.len());
    let truncated: String = text.chars().take(keep).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

/// Hash of the embedder input, used to detect unchanged text on re-insert.
///
/// SHA-256 rather than `DefaultHasher` because the value is persisted and
/// must not change between builds.
pub fn content_hash(prepared: &str) -> u64 {
    let digest = Sha256::digest(prepared.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(bytes)
}
