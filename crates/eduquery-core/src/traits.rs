//! Core traits defining the interfaces between components.

use std::path::Path;

use crate::config::ChunkingConfig;
use crate::error::{KbError, Result};

/// Embedding model trait.
///
/// Implementations must be deterministic per input for a given model
/// instance. The handle is loaded once by the caller and shared by the
/// builder and the retriever.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| KbError::embedding("No embedding returned"))
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Chunking strategy trait.
pub trait Chunker: Send + Sync {
    /// Split text into ordered, non-blank chunks.
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Result<Vec<String>>;
}

/// Format-specific document text extraction.
pub trait TextExtractor: Send + Sync {
    /// Lower-case file extensions (without the dot) this extractor handles.
    fn extensions(&self) -> &[&'static str];

    /// Extract plain UTF-8 text from the file at `path`.
    fn extract(&self, path: &Path) -> Result<String>;
}
