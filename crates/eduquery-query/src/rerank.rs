//! Candidate union and cosine re-ranking.

use std::collections::BTreeSet;

use tracing::warn;

use eduquery_core::{KbError, Result, RetrievalResult};
use eduquery_index::KnowledgeBase;

/// Merge candidate lists into unique chunk IDs, ascending.
pub fn union_candidates(lists: &[&[(usize, f32)]]) -> Vec<usize> {
    lists
        .iter()
        .flat_map(|list| list.iter().map(|(id, _)| *id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Cosine similarity, or 0.0 when either vector has zero norm or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn score_candidate(query: &[f32], query_norm: f32, kb: &KnowledgeBase, id: usize) -> Result<f32> {
    let vector = kb
        .vectors()
        .vector(id)
        .ok_or_else(|| KbError::scoring(id, "no stored vector"))?;
    if vector.len() != query.len() {
        return Err(KbError::scoring(
            id,
            format!("dimension {} vs query {}", vector.len(), query.len()),
        ));
    }
    if query_norm == 0.0 {
        return Err(KbError::scoring(id, "query embedding has zero norm"));
    }
    if vector.iter().all(|x| *x == 0.0) {
        return Err(KbError::scoring(id, "chunk embedding has zero norm"));
    }
    let score = cosine_similarity(query, vector);
    if !score.is_finite() {
        return Err(KbError::scoring(id, "non-finite similarity"));
    }
    Ok(score)
}

/// Score candidates against the query embedding and keep the best `k`.
///
/// Candidates whose score cannot be computed are logged and skipped.
/// Results are ordered by descending score, ties by ascending chunk ID.
pub fn rerank(
    query: &[f32],
    candidates: &[usize],
    kb: &KnowledgeBase,
    k: usize,
) -> Vec<RetrievalResult> {
    let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();

    let mut results: Vec<RetrievalResult> = Vec::with_capacity(candidates.len());
    for &id in candidates {
        let score = match score_candidate(query, query_norm, kb, id) {
            Ok(score) => score,
            Err(e) => {
                warn!("Skipping candidate in '{}': {}", kb.subject(), e);
                continue;
            }
        };
        let Some(chunk) = kb.chunk(id) else {
            warn!("Skipping candidate {} in '{}': no chunk", id, kb.subject());
            continue;
        };
        results.push(RetrievalResult {
            id,
            text: chunk.content,
            source: chunk.source,
            score,
        });
    }

    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    results.truncate(k);
    results
}
