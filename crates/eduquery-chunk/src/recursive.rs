//! Recursive character chunker.
//!
//! Splits text on progressively finer separators until every fragment fits
//! the chunk size, then packs fragments greedily into overlapping chunks.

use tracing::debug;

use eduquery_core::{Chunker, ChunkingConfig, KbError, Result};

/// Separators from coarsest to finest. The empty separator means "split
/// anywhere" and is served by fixed-width slicing.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", ", ", " ", ""];

/// Recursive chunker that splits text by multiple separators.
///
/// Tries each separator in order until fragments are small enough:
/// 1. Double newline (paragraph breaks)
/// 2. Single newline
/// 3. Sentence boundaries (`. `, `? `, `! `)
/// 4. Clause and word boundaries (`, `, space)
/// 5. Fixed-width windows (last resort)
///
/// Separators stay attached to the fragment they end. Lengths are counted
/// in characters, not bytes. Every emitted chunk is at most `chunk_size`
/// characters: runs with no separator are cut into windows of exactly
/// `chunk_size` characters advancing by `chunk_size - chunk_overlap`
/// (at least one).
pub struct RecursiveChunker {
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker with the default separator ladder.
    pub fn new() -> Self {
        Self::with_separators(DEFAULT_SEPARATORS.iter().copied())
    }

    /// Create a chunker with a custom separator ladder, coarsest first.
    pub fn with_separators<I, S>(separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            separators: separators.into_iter().map(Into::into).collect(),
        }
    }

    /// Feed `text` to the packer, recursing on fragments that are too long.
    fn split_into(&self, text: &str, level: usize, packer: &mut Packer) {
        let separator = match self.separators.get(level) {
            Some(sep) if !sep.is_empty() => sep.as_str(),
            // Ladder exhausted or "split anywhere"
            _ => {
                packer.push_windows(text);
                return;
            }
        };

        for fragment in text.split_inclusive(separator) {
            if char_len(fragment) <= packer.size {
                packer.push(fragment);
            } else {
                self.split_into(fragment, level + 1, packer);
            }
        }
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
        if config.chunk_size == 0 {
            return Err(KbError::invalid_argument("chunk_size must be greater than 0"));
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut packer = Packer::new(config);
        self.split_into(text, 0, &mut packer);
        let chunks = packer.finish();

        debug!(
            "Chunked {} chars into {} chunks (size={}, overlap={})",
            char_len(text),
            chunks.len(),
            config.chunk_size,
            config.chunk_overlap
        );

        Ok(chunks)
    }
}

/// Greedy accumulator that turns fitting fragments into overlapping chunks.
struct Packer {
    size: usize,
    overlap: usize,
    stride: usize,

    /// Current chunk under construction (may start with an overlap seed).
    buffer: String,
    buffer_len: usize,

    /// Whether the buffer holds non-blank text beyond the seed.
    fresh: bool,

    /// Untrimmed text of the last closed chunk, source of the next seed.
    last_closed: String,

    chunks: Vec<String>,
}

impl Packer {
    fn new(config: &ChunkingConfig) -> Self {
        Self {
            size: config.chunk_size,
            overlap: config.chunk_overlap,
            stride: config.stride(),
            buffer: String::new(),
            buffer_len: 0,
            fresh: false,
            last_closed: String::new(),
            chunks: Vec::new(),
        }
    }

    /// Append a fragment of at most `size` characters.
    fn push(&mut self, fragment: &str) {
        let len = char_len(fragment);
        if len == 0 {
            return;
        }
        if self.buffer_len + len > self.size {
            self.make_room(len);
        }
        self.buffer.push_str(fragment);
        self.buffer_len += len;
        if !fragment.trim().is_empty() {
            self.fresh = true;
        }
    }

    /// Close the current chunk and reseed so that `incoming` characters fit.
    fn make_room(&mut self, incoming: usize) {
        if self.fresh {
            self.close();
        }
        let room = self.size.saturating_sub(incoming);
        self.seed(self.overlap.min(room));
    }

    fn close(&mut self) {
        let text = self.buffer.trim();
        if !text.is_empty() {
            self.chunks.push(text.to_string());
        }
        self.last_closed = std::mem::take(&mut self.buffer);
        self.buffer_len = 0;
        self.fresh = false;
    }

    fn seed(&mut self, max_chars: usize) {
        self.buffer = overlap_tail(&self.last_closed, max_chars);
        self.buffer_len = char_len(&self.buffer);
        self.fresh = false;
    }

    /// Cut an unsplittable run into fixed-width, overlapping windows.
    fn push_windows(&mut self, fragment: &str) {
        let chars: Vec<char> = fragment.chars().collect();
        if chars.len() <= self.size {
            self.push(fragment);
            return;
        }
        if self.fresh {
            self.close();
        }

        let mut start = 0;
        loop {
            let end = (start + self.size).min(chars.len());
            self.buffer = chars[start..end].iter().collect();
            self.buffer_len = end - start;
            self.fresh = !self.buffer.trim().is_empty();
            self.close();
            if end == chars.len() {
                break;
            }
            start += self.stride;
        }

        self.seed(self.overlap.min(self.size));
    }

    fn finish(mut self) -> Vec<String> {
        if self.fresh {
            self.close();
        }
        self.chunks
    }
}

/// Last `max_chars` characters of `text`, moved forward to a word start when
/// the cut would land inside a word.
fn overlap_tail(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let total = char_len(text);
    if max_chars >= total {
        return text.to_string();
    }

    let byte_start = text
        .char_indices()
        .nth(total - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let window = &text[byte_start..];
    let cut_mid_word = text[..byte_start]
        .chars()
        .next_back()
        .map_or(false, |c| !c.is_whitespace());

    if cut_mid_word {
        if let Some(pos) = window.find(char::is_whitespace) {
            return window[pos..].trim_start().to_string();
        }
    }
    window.to_string()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        const VOCAB: &[&str] = &[
            "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota",
            "kappa",
        ];
        (0..n)
            .map(|i| VOCAB[i % VOCAB.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = RecursiveChunker::new();
        let text = "Calculus is the study of change. Derivatives measure rate of change.";
        let chunks = chunker.chunk(text, &ChunkingConfig::default()).unwrap();

        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_empty_and_blank_input() {
        let chunker = RecursiveChunker::new();
        let config = ChunkingConfig::default();

        assert!(chunker.chunk("", &config).unwrap().is_empty());
        assert!(chunker.chunk(" \n\n \t ", &config).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let chunker = RecursiveChunker::new();
        let err = chunker.chunk("text", &ChunkingConfig::new(0, 0)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_sentence_separator_stays_with_fragment() {
        let chunker = RecursiveChunker::new();
        let config = ChunkingConfig::new(12, 0);

        let chunks = chunker
            .chunk("First one. Second one. Third.", &config)
            .unwrap();

        assert_eq!(chunks, vec!["First one.", "Second one.", "Third."]);
    }

    #[test]
    fn test_paragraphs_split_before_lines() {
        let chunker = RecursiveChunker::new();
        let config = ChunkingConfig::new(45, 0);

        let text = "Limits describe approach.\nThey are local.\n\nIntegrals accumulate area.";
        let chunks = chunker.chunk(text, &config).unwrap();

        assert_eq!(
            chunks,
            vec![
                "Limits describe approach.\nThey are local.",
                "Integrals accumulate area.",
            ]
        );
    }

    #[test]
    fn test_chunks_respect_size_and_are_not_blank() {
        let chunker = RecursiveChunker::new();
        let text = format!(
            "{}\n\n{}. {}\n{}",
            words(300),
            words(40),
            "x".repeat(700),
            words(90)
        );

        for (size, overlap) in [(1000, 200), (120, 30), (50, 0), (17, 16), (10, 40)] {
            let config = ChunkingConfig::new(size, overlap);
            let chunks = chunker.chunk(&text, &config).unwrap();

            assert!(!chunks.is_empty());
            for chunk in &chunks {
                assert!(
                    chunk.chars().count() <= size,
                    "chunk of {} chars exceeds {}",
                    chunk.chars().count(),
                    size
                );
                assert!(!chunk.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunker = RecursiveChunker::new();
        let config = ChunkingConfig::new(40, 10);
        let chunks = chunker.chunk(&words(60), &config).unwrap();

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            // Longest word-aligned prefix of `next` that closes `prev`
            let shared = (1..next.len().min(11))
                .filter(|&k| next.as_bytes()[k] == b' ')
                .filter(|&k| prev.ends_with(&next[..k]))
                .max();
            assert!(shared.is_some(), "{:?} does not continue {:?}", next, prev);
        }
    }

    #[test]
    fn test_no_overlap_reconstructs_words() {
        let chunker = RecursiveChunker::new();
        let text = format!("{}\n\n{}\n{}", words(120), words(33), words(7));
        let chunks = chunker.chunk(&text, &ChunkingConfig::new(64, 0)).unwrap();

        let rebuilt = chunks.join(" ");
        let original: Vec<&str> = text.split_whitespace().collect();
        let joined: Vec<&str> = rebuilt.split_whitespace().collect();
        assert_eq!(joined, original);
    }

    #[test]
    fn test_unsplittable_run_uses_fixed_windows() {
        let chunker = RecursiveChunker::new();
        let text = "x".repeat(2500);
        let chunks = chunker
            .chunk(&text, &ChunkingConfig::new(1000, 200))
            .unwrap();

        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![1000, 1000, 900]);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_terminates() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker
            .chunk("abcdefghijkl", &ChunkingConfig::new(5, 10))
            .unwrap();

        assert_eq!(chunks.first().map(String::as_str), Some("abcde"));
        assert_eq!(chunks.last().map(String::as_str), Some("hijkl"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let chunker = RecursiveChunker::new();
        let text = "ééééé ééééé ééééé";
        let chunks = chunker.chunk(text, &ChunkingConfig::new(12, 0)).unwrap();

        assert_eq!(chunks, vec!["ééééé ééééé", "ééééé"]);
    }

    #[test]
    fn test_deterministic() {
        let chunker = RecursiveChunker::new();
        let config = ChunkingConfig::new(80, 20);
        let text = format!("{}\n{}", words(200), words(50));

        assert_eq!(
            chunker.chunk(&text, &config).unwrap(),
            chunker.chunk(&text, &config).unwrap()
        );
    }

    #[test]
    fn test_custom_separators() {
        let chunker = RecursiveChunker::with_separators(["|", ""]);
        let chunks = chunker
            .chunk("aaa|bbb|ccc", &ChunkingConfig::new(4, 0))
            .unwrap();

        assert_eq!(chunks, vec!["aaa|", "bbb|", "ccc"]);
    }

    #[test]
    fn test_overlap_tail_snaps_to_word() {
        assert_eq!(overlap_tail("epsilon zeta ", 9), "zeta ");
        assert_eq!(overlap_tail("abc", 10), "abc");
        assert_eq!(overlap_tail("abcdef", 3), "def");
        assert_eq!(overlap_tail("abc def", 0), "");
    }
}
