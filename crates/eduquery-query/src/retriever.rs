//! Hybrid retriever.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use eduquery_core::{Embedder, Result, RetrievalConfig, RetrievalResult};
use eduquery_index::KnowledgeBase;

use crate::rerank::{rerank, union_candidates};

/// Dense + lexical retriever with cosine re-ranking.
///
/// Holds the embedding model shared with the builder; the knowledge base is
/// passed per call and only read.
pub struct HybridRetriever<E: ?Sized> {
    embedder: Arc<E>,
}

impl<E> HybridRetriever<E>
where
    E: Embedder + ?Sized,
{
    /// Create a retriever around an embedding model handle.
    pub fn new(embedder: Arc<E>) -> Self {
        Self { embedder }
    }

    /// Retrieve the `k_final` most relevant chunks for a query.
    ///
    /// An empty result means the knowledge base had no candidates at all;
    /// a missing knowledge base is reported by whoever loads it.
    pub fn retrieve(
        &self,
        query: &str,
        kb: &KnowledgeBase,
        config: &RetrievalConfig,
    ) -> Result<Vec<RetrievalResult>> {
        let start = Instant::now();

        info!("Retrieving from '{}' for: {:?}", kb.subject(), query);

        if kb.is_empty() {
            info!("Knowledge base '{}' has no chunks", kb.subject());
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_one(query)?;

        let dense = kb.vectors().search(&query_embedding, config.k_initial)?;
        let lexical = kb.lexical().top_k(query, config.k_initial);

        debug!(
            "Dense search returned {} candidates, lexical search returned {} candidates",
            dense.len(),
            lexical.len()
        );

        let candidates = union_candidates(&[&dense, &lexical]);
        if candidates.is_empty() {
            info!("No candidates in '{}'", kb.subject());
            return Ok(Vec::new());
        }

        let results = rerank(&query_embedding, &candidates, kb, config.k_final);

        info!(
            "Retrieval completed in {}ms, {} of {} candidates returned",
            start.elapsed().as_millis(),
            results.len(),
            candidates.len()
        );

        Ok(results)
    }

}

impl<E: ?Sized> Clone for HybridRetriever<E> {
    fn clone(&self) -> Self {
        Self {
            embedder: Arc::clone(&self.embedder),
        }
    }
}
