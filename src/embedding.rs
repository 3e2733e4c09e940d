//! Embedding value type.
//!
//! An [`Embedding`] is an immutable vector tagged with the provider that
//! produced it. It offers:
//! - cosine similarity against another embedding of the same provider
//! - a compact serde encoding: little-endian floats, base64 encoded, either
//!   full (f32) or half (f16) precision
//!
//! Wire shape:
//!
//! ```text
//! { "vectors": "<base64 LE f32>", "provider": "..." }
//! { "vectorsHalfPrecision": "<base64 LE f16>", "provider": "..." }
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Accumulator width for magnitude and dot product. Eight f32 lanes match a
/// 256-bit register and let the compiler vectorize the inner loop.
const LANES: usize = 8;

/// A fixed-length vector representing the meaning of a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EmbeddingWire", into = "EmbeddingWire")]
pub struct Embedding {
    vectors: Vec<f32>,
    provider: String,
    magnitude: f32,
    half_precision: bool,
}

impl Embedding {
    /// Create a full-precision embedding.
    pub fn new(vectors: Vec<f32>, provider: impl Into<String>) -> Self {
        let magnitude = dot(&vectors, &vectors).sqrt();
        Self {
            vectors,
            provider: provider.into(),
            magnitude,
            half_precision: false,
        }
    }

    /// Create an embedding that serializes with 16-bit floats.
    ///
    /// Values are rounded to f16 up front, so the in-memory embedding equals
    /// what a decode of its encoding yields.
    pub fn new_half_precision(vectors: Vec<f32>, provider: impl Into<String>) -> Self {
        Self::new(vectors, provider).with_precision(true)
    }

    /// Return the same embedding with the given serialization precision.
    ///
    /// Switching to half precision rounds every value through f16 and
    /// recomputes the magnitude. Switching back keeps the rounded values.
    pub fn with_precision(mut self, half_precision: bool) -> Self {
        if half_precision && !self.half_precision {
            for value in &mut self.vectors {
                *value = f16::from_f32(*value).to_f32();
            }
            self.magnitude = dot(&self.vectors, &self.vectors).sqrt();
        }
        self.half_precision = half_precision;
        self
    }

    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Cached L2 norm.
    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_half_precision(&self) -> bool {
        self.half_precision
    }

    /// Whether two embeddings live in the same vector space.
    pub fn is_comparable(&self, other: &Embedding) -> bool {
        self.provider == other.provider && self.vectors.len() == other.vectors.len()
    }

    /// Cosine similarity with `other`. See [`cosine_similarity`].
    pub fn similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(self, other)
    }

    /// Encode into the wire form.
    pub fn to_wire(&self) -> EmbeddingWire {
        if self.half_precision {
            EmbeddingWire {
                vectors: None,
                vectors_half_precision: Some(encode_f16(&self.vectors)),
                provider: self.provider.clone(),
            }
        } else {
            EmbeddingWire {
                vectors: Some(encode_f32(&self.vectors)),
                vectors_half_precision: None,
                provider: self.provider.clone(),
            }
        }
    }

    /// Decode from the wire form, picking the precision from the tag present.
    pub fn from_wire(wire: EmbeddingWire) -> Result<Self, EncodingError> {
        match (wire.vectors, wire.vectors_half_precision) {
            (Some(_), Some(_)) => Err(EncodingError::AmbiguousVectors),
            (None, None) => Err(EncodingError::MissingVectors),
            (Some(full), None) => Ok(Self::new(decode_f32(&full)?, wire.provider)),
            (None, Some(half)) => Ok(Self::new_half_precision(decode_f16(&half)?, wire.provider)),
        }
    }
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// Returns exactly `0.0` when the providers differ, the dimensions differ or
/// either magnitude is zero. The result is clamped to `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if !a.is_comparable(b) {
        return 0.0;
    }
    if a.magnitude == 0.0 || b.magnitude == 0.0 {
        return 0.0;
    }

    let similarity = dot(&a.vectors, &b.vectors) / (a.magnitude * b.magnitude);
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0)
}

/// Dot product over `LANES`-wide chunks plus a scalar tail.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    let mut acc = [0.0f32; LANES];
    for (ca, cb) in chunks_a.zip(chunks_b) {
        for lane in 0..LANES {
            acc[lane] += ca[lane] * cb[lane];
        }
    }

    let mut sum: f32 = acc.iter().sum();
    for (x, y) in tail_a.iter().zip(tail_b) {
        sum += x * y;
    }
    sum
}

/// Serialized form of an [`Embedding`]. Exactly one of the two vector fields
/// is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<String>,

    #[serde(
        rename = "vectorsHalfPrecision",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub vectors_half_precision: Option<String>,

    pub provider: String,
}

impl From<Embedding> for EmbeddingWire {
    fn from(embedding: Embedding) -> Self {
        embedding.to_wire()
    }
}

impl TryFrom<EmbeddingWire> for Embedding {
    type Error = EncodingError;

    fn try_from(wire: EmbeddingWire) -> Result<Self, Self::Error> {
        Embedding::from_wire(wire)
    }
}

fn encode_f32(values: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

fn encode_f16(values: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(values.len() * 2);
    for value in values {
        bytes.extend_from_slice(&f16::from_f32(*value).to_le_bytes());
    }
    STANDARD.encode(bytes)
}

fn decode_f32(encoded: &str) -> Result<Vec<f32>, EncodingError> {
    let bytes = STANDARD.decode(encoded)?;
    if bytes.len() % 4 != 0 {
        return Err(EncodingError::InvalidLength {
            len: bytes.len(),
            width: 4,
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn decode_f16(encoded: &str) -> Result<Vec<f32>, EncodingError> {
    let bytes = STANDARD.decode(encoded)?;
    if bytes.len() % 2 != 0 {
        return Err(EncodingError::InvalidLength {
            len: bytes.len(),
            width: 2,
        });
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
        .collect())
}
