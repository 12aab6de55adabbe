//! eduquery-chunk - Text chunking
//!
//! Splits extracted document text into overlapping, size-bounded windows
//! suitable for embedding and lexical indexing.
//!
//! # Example
//!
//! ```rust
//! use eduquery_chunk::{Chunker, ChunkingConfig, RecursiveChunker};
//!
//! let chunker = RecursiveChunker::new();
//! let chunks = chunker
//!     .chunk("Hello world.", &ChunkingConfig::default())
//!     .unwrap();
//! assert_eq!(chunks, vec!["Hello world.".to_string()]);
//! ```

mod recursive;

pub use recursive::{RecursiveChunker, DEFAULT_SEPARATORS};

// Re-export types for convenience
pub use eduquery_core::{Chunker, ChunkingConfig};
