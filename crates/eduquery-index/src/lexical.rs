//! In-memory BM25 index over chunk texts.
//!
//! Rebuilt from the chunk store whenever a knowledge base is loaded; it is
//! never written to disk.

use std::collections::HashMap;

/// Term frequency saturation.
const K1: f32 = 1.5;

/// Document length normalization.
const B: f32 = 0.75;

/// Split text into lowercase terms.
///
/// Terms are whitespace-separated words with leading and trailing
/// non-alphanumeric characters removed, so `"Calculus?"` and `"calculus"`
/// match.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Inverted index with Okapi BM25 scoring.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    /// term -> (doc id, term frequency), doc ids ascending
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lengths: Vec<u32>,
    total_len: u64,
}

impl LexicalIndex {
    /// Index documents; position in the iterator is the document ID.
    pub fn build<'a>(docs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for (id, text) in docs.into_iter().enumerate() {
            let terms = tokenize(text);
            let mut counts: HashMap<String, u32> = HashMap::new();
            for term in &terms {
                *counts.entry(term.clone()).or_insert(0) += 1;
            }
            for (term, tf) in counts {
                index.postings.entry(term).or_default().push((id, tf));
            }
            index.doc_lengths.push(terms.len() as u32);
            index.total_len += terms.len() as u64;
        }
        index
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Number of documents containing a term.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    fn avg_doc_len(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.doc_lengths.len() as f32
        }
    }

    fn idf(&self, df: usize) -> f32 {
        let n = self.doc_count() as f32;
        let df = df as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of every document for a query, indexed by document ID.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.doc_count()];
        let avg_len = self.avg_doc_len();
        if avg_len == 0.0 {
            return scores;
        }

        for term in tokenize(query) {
            let Some(postings) = self.postings.get(&term) else {
                continue;
            };
            let idf = self.idf(postings.len());
            for &(id, tf) in postings {
                let tf = tf as f32;
                let len_norm = 1.0 - B + B * self.doc_lengths[id] as f32 / avg_len;
                scores[id] += idf * tf * (K1 + 1.0) / (tf + K1 * len_norm);
            }
        }
        scores
    }

    /// Top `k` documents with a positive score, best first, ties by ID.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCS: [&str; 3] = [
        "Calculus is the study of change.",
        "Algebra deals with symbols and rules.",
        "Change in algebra: the rules of symbols change too.",
    ];

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("What is Calculus?  (really)"),
            vec!["what", "is", "calculus", "really"]
        );
        assert!(tokenize(" ... ").is_empty());
    }

    #[test]
    fn test_top_k_prefers_matching_document() {
        let index = LexicalIndex::build(DOCS);
        let top = index.top_k("calculus", 3);

        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, 0);
        assert!(top[0].1 > 0.0);
    }

    #[test]
    fn test_term_frequency_raises_score() {
        let index = LexicalIndex::build(DOCS);
        let top = index.top_k("change", 3);

        let ids: Vec<usize> = top.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![2, 0]);
    }

    #[test]
    fn test_no_match_yields_nothing() {
        let index = LexicalIndex::build(DOCS);
        assert!(index.top_k("photosynthesis", 3).is_empty());
        assert!(index.top_k("", 3).is_empty());
    }

    #[test]
    fn test_idf_is_positive_for_common_terms() {
        // "the" appears in two of three documents
        let index = LexicalIndex::build(DOCS);
        assert_eq!(index.doc_freq("the"), 2);
        assert!(index.idf(2) > 0.0);
        assert_eq!(index.top_k("the", 3).len(), 2);
    }

    #[test]
    fn test_empty_index() {
        let index = LexicalIndex::build(std::iter::empty());
        assert_eq!(index.doc_count(), 0);
        assert!(index.top_k("anything", 5).is_empty());
    }
}
