//! eduquery-embed - Sentence embedding backends
//!
//! # Backends
//!
//! - [`OnnxEmbedder`]: ONNX Runtime sentence encoder (e.g. all-MiniLM-L6-v2)
//!   with attention-masked mean pooling and L2 normalization.
//! - [`HashEmbedder`]: deterministic feature-hashing bag-of-words encoder,
//!   for offline use and tests.
//!
//! Both are explicit handles: load once, pass to the builder and the
//! retriever, drop when done.

mod hashing;
mod onnx;

pub use hashing::HashEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use eduquery_core::Embedder;

/// L2 normalize a vector in place; zero vectors are left untouched.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
