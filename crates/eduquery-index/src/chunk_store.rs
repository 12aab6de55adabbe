//! Chunk text and provenance, persisted as `chunks.json`.

use serde::{Deserialize, Serialize};

use eduquery_core::{Chunk, Result};

/// Parallel arrays of chunk text and source path; index = chunk ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStore {
    pub chunks: Vec<String>,
    pub sources: Vec<String>,
}

impl ChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return its ID.
    pub fn push(&mut self, text: impl Into<String>, source: impl Into<String>) -> usize {
        self.chunks.push(text.into());
        self.sources.push(source.into());
        self.chunks.len() - 1
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether both arrays have the same length.
    pub fn is_consistent(&self) -> bool {
        self.chunks.len() == self.sources.len()
    }

    /// Get a chunk by ID.
    pub fn get(&self, id: usize) -> Option<Chunk> {
        Some(Chunk {
            id,
            content: self.chunks.get(id)?.clone(),
            source: self.sources.get(id)?.clone(),
        })
    }

    /// Chunk texts in ID order.
    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.chunks.iter().map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
