//! Error types for the knowledge base engine.

use thiserror::Error;

/// Result type alias using KbError.
pub type Result<T> = std::result::Result<T, KbError>;

/// Errors that can occur while building or querying knowledge bases.
#[derive(Error, Debug)]
pub enum KbError {
    /// No chunks could be extracted from any document of the subject.
    #[error("No extractable text for subject: {subject}")]
    EmptyCorpus { subject: String },

    /// The embedding backend failed.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// The subject has no complete knowledge base on disk.
    #[error("Knowledge base not found for subject: {subject}")]
    IndexNotFound { subject: String },

    /// Chunk store and vector index exist but cannot be used together.
    #[error("Corrupt knowledge base for {subject}: {reason}")]
    CorruptArtifact { subject: String, reason: String },

    /// A single candidate could not be scored.
    #[error("Could not score chunk {chunk_id}: {reason}")]
    ScoringDegradation { chunk_id: usize, reason: String },

    /// Subject folder does not exist under the data root.
    #[error("Subject not found: {name}")]
    SubjectNotFound { name: String },

    /// Conversation does not exist in the history store.
    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Document text extraction failed.
    #[error("Failed to extract text from {path}: {reason}")]
    Extraction { path: String, reason: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KbError {
    /// Create an empty corpus error.
    pub fn empty_corpus(subject: impl Into<String>) -> Self {
        Self::EmptyCorpus {
            subject: subject.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create an index-not-found error.
    pub fn index_not_found(subject: impl Into<String>) -> Self {
        Self::IndexNotFound {
            subject: subject.into(),
        }
    }

    /// Create a corrupt artifact error.
    pub fn corrupt(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Create a scoring degradation error.
    pub fn scoring(chunk_id: usize, reason: impl Into<String>) -> Self {
        Self::ScoringDegradation {
            chunk_id,
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when a rebuild (rather than a first build) would fix the error.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::CorruptArtifact { .. })
    }

    /// Get a stable error code for CLI and API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCorpus { .. } => "EMPTY_CORPUS",
            Self::Embedding { .. } => "EMBEDDING_FAILURE",
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::CorruptArtifact { .. } => "CORRUPT_ARTIFACT",
            Self::ScoringDegradation { .. } => "SCORING_DEGRADATION",
            Self::SubjectNotFound { .. } => "SUBJECT_NOT_FOUND",
            Self::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Extraction { .. } => "EXTRACTION_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KbError::index_not_found("Math");
        assert!(err.to_string().contains("Math"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(KbError::empty_corpus("x").error_code(), "EMPTY_CORPUS");
        assert_eq!(
            KbError::corrupt("x", "length mismatch").error_code(),
            "CORRUPT_ARTIFACT"
        );
        assert_eq!(KbError::embedding("boom").error_code(), "EMBEDDING_FAILURE");
    }

    #[test]
    fn test_corrupt_is_distinct_from_missing() {
        assert!(KbError::corrupt("Math", "bad footer").needs_rebuild());
        assert!(!KbError::index_not_found("Math").needs_rebuild());
    }
}
