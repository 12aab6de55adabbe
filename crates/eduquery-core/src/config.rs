//! Configuration types for the knowledge base engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KbError, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EduQueryConfig {
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Where subjects, indices and the conversation log live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root folder holding one directory per subject.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Root folder receiving one index directory per subject.
    #[serde(default = "default_indices_root")]
    pub indices_root: PathBuf,

    /// SQLite file for conversation history.
    #[serde(default = "default_history_db")]
    pub history_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            indices_root: default_indices_root(),
            history_db: default_history_db(),
        }
    }
}

/// Chunking configuration. Sizes are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target upper bound on chunk length.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Trailing characters of a chunk copied into the next one.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Create a chunking configuration.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Step between fixed-width windows; never zero.
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Directory containing `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Number of chunks embedded per call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Tokens kept per input; longer inputs are truncated.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Feed a zeroed `token_type_ids` input (BERT-style encoders).
    #[serde(default = "default_true")]
    pub token_type_ids: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            batch_size: 8,
            num_threads: 4,
            max_tokens: 256,
            token_type_ids: true,
        }
    }
}

impl EmbeddingConfig {
    /// Path to the ONNX model file.
    pub fn model_file(&self) -> PathBuf {
        self.model_path.join("model.onnx")
    }

    /// Path to the tokenizer definition.
    pub fn tokenizer_file(&self) -> PathBuf {
        self.model_path.join("tokenizer.json")
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates taken from each of the dense and lexical searches.
    #[serde(default = "default_k_initial")]
    pub k_initial: usize,

    /// Results kept after re-ranking.
    #[serde(default = "default_k_final")]
    pub k_final: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_initial: 5,
            k_final: 3,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_batch_size() -> usize {
    8
}

fn default_num_threads() -> usize {
    4
}

fn default_max_tokens() -> usize {
    256
}

fn default_k_initial() -> usize {
    5
}

fn default_k_final() -> usize {
    3
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_indices_root() -> PathBuf {
    PathBuf::from("indices")
}

fn default_history_db() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eduquery")
        .join("history.db")
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eduquery")
        .join("models")
        .join("all-MiniLM-L6-v2")
}

impl EduQueryConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KbError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("eduquery").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("eduquery.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings the engine cannot run with.
    ///
    /// An overlap at or above the chunk size is accepted; the chunker clamps
    /// its stride instead.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(KbError::config("chunking.chunk_size must be greater than 0"));
        }
        if self.embedding.batch_size == 0 {
            return Err(KbError::config("embedding.batch_size must be greater than 0"));
        }
        if self.retrieval.k_initial == 0 || self.retrieval.k_final == 0 {
            return Err(KbError::config("retrieval k values must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EduQueryConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.retrieval.k_initial, 5);
        assert_eq!(config.retrieval.k_final, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stride_never_zero() {
        assert_eq!(ChunkingConfig::new(1000, 200).stride(), 800);
        assert_eq!(ChunkingConfig::new(100, 100).stride(), 1);
        assert_eq!(ChunkingConfig::new(10, 50).stride(), 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EduQueryConfig = toml::from_str(
            r#"
            [retrieval]
            k_final = 5

            [paths]
            data_root = "notes"
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k_final, 5);
        assert_eq!(config.retrieval.k_initial, 5);
        assert_eq!(config.paths.data_root, PathBuf::from("notes"));
        assert_eq!(config.chunking.chunk_size, 1000);
    }

    #[test]
    fn test_load_rejects_zero_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eduquery.toml");
        std::fs::write(&path, "[chunking]\nchunk_size = 0\n").unwrap();

        let err = EduQueryConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
