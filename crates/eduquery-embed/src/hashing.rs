//! Deterministic feature-hashing encoder.

use eduquery_core::{Embedder, Result};

use crate::l2_normalize;

/// Bag-of-words encoder that hashes lower-cased alphanumeric tokens into a
/// fixed number of signed buckets.
///
/// Needs no model files. Texts sharing words get positive cosine
/// similarity, identical texts get identical vectors, and text without any
/// alphanumeric token maps to the zero vector.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an encoder with 384 buckets (the width of MiniLM).
    pub fn new() -> Self {
        Self::with_dimension(384)
    }

    /// Create an encoder with a custom bucket count.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }
        l2_normalize(embedding)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
