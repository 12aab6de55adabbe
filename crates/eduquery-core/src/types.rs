//! Core domain types.

use serde::{Deserialize, Serialize};

/// A source document handed to the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Path relative to the subject folder, used as provenance.
    pub path: String,

    /// Extracted plain text (may be empty).
    pub text: String,
}

impl SourceDocument {
    /// Create a new source document.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the subject's chunk sequence; stable until the next rebuild.
    pub id: usize,

    /// Chunk text content.
    pub content: String,

    /// Source document path.
    pub source: String,
}

/// A ranked passage returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Chunk ID within the subject's knowledge base.
    pub id: usize,

    /// Chunk text.
    pub text: String,

    /// Source document path.
    pub source: String,

    /// Relevance score (higher is better).
    pub score: f32,
}

/// Outcome of a successful subject build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Subject name.
    pub subject: String,

    /// Documents that produced at least one chunk.
    pub documents: usize,

    /// Documents skipped (unsupported, unreadable or empty).
    pub skipped: usize,

    /// Total chunks committed.
    pub chunks: usize,

    /// Embedding dimension of the vector index.
    pub dimension: usize,
}

/// Outcome of a multi-subject build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Subjects built successfully.
    pub built: Vec<BuildReport>,

    /// Subjects that failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl BuildSummary {
    /// Overall success means at least one subject was built.
    pub fn succeeded(&self) -> bool {
        !self.built.is_empty()
    }
}

/// Build state of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectStatus {
    /// Subject name.
    pub name: String,

    /// Whether both artifacts exist.
    pub built: bool,

    /// Chunk count when the knowledge base could be opened.
    pub chunks: Option<usize>,
}
