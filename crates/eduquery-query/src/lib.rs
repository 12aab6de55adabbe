//! eduquery-query - Retrieval and re-ranking
//!
//! Candidates come from two searches over one knowledge base: exact
//! nearest neighbors on the vector index and BM25 on the lexical index.
//! Their union is re-scored by cosine similarity to the query embedding.
//!
//! # Example
//!
//! ```rust,ignore
//! use eduquery_query::HybridRetriever;
//! use std::sync::Arc;
//!
//! let retriever = HybridRetriever::new(Arc::new(embedder));
//! let results = retriever.retrieve("what is calculus?", &kb, &RetrievalConfig::default())?;
//! ```

mod rerank;
mod retriever;

pub use rerank::{cosine_similarity, rerank, union_candidates};
pub use retriever::HybridRetriever;

// Re-export for convenience
pub use eduquery_core::{RetrievalConfig, RetrievalResult};
