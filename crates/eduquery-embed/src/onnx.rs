//! ONNX-based sentence encoder.

use std::path::Path;
use std::sync::Mutex;

use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use eduquery_core::{Embedder, EmbeddingConfig, KbError, Result};

use crate::l2_normalize;

/// Text used once at load time to discover the output width.
const PROBE_TEXT: &str = "dimension probe";

/// Sentence encoder running an ONNX export of a BERT-style model.
///
/// Token states are mean-pooled under the attention mask and L2-normalized,
/// which matches how sentence-transformers models are used for retrieval.
pub struct OnnxEmbedder {
    /// Inference session (`run` needs exclusive access).
    session: Mutex<Session>,

    tokenizer: Tokenizer,

    /// Width of the pooled output, discovered at load time.
    dimension: usize,

    /// Tokens kept per input.
    max_tokens: usize,

    /// Whether the model expects a `token_type_ids` input.
    token_type_ids: bool,
}

impl OnnxEmbedder {
    /// Load the model described by an embedding configuration.
    pub fn load(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(
            config.model_file(),
            config.tokenizer_file(),
            config.num_threads,
            config.max_tokens,
            config.token_type_ids,
        )
    }

    /// Create an embedder from model and tokenizer paths.
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        num_threads: usize,
        max_tokens: usize,
        token_type_ids: bool,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| KbError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| KbError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| KbError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| KbError::embedding(format!("Failed to load model: {}", e)))?;

        info!("Loading tokenizer from {:?}", tokenizer_path);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| KbError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        let mut embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: 0,
            max_tokens: max_tokens.max(1),
            token_type_ids,
        };

        embedder.dimension = embedder
            .run_batch(&[PROBE_TEXT])?
            .first()
            .map(Vec::len)
            .ok_or_else(|| KbError::embedding("Model returned no output for probe"))?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            embedder.dimension, embedder.max_tokens
        );

        Ok(embedder)
    }

    /// Tokenize, run inference and pool one batch.
    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| KbError::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens)
            .max(1);
        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        // Right-padded, truncated to max_len
        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for j in 0..ids.len().min(max_len) {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| KbError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor =
            Tensor::from_array((vec![batch_size, max_len], attention_mask.clone()))
                .map_err(|e| KbError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| KbError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = (if self.token_type_ids {
            let token_type_tensor =
                Tensor::from_array((vec![batch_size, max_len], vec![0i64; batch_size * max_len]))
                    .map_err(|e| {
                        KbError::embedding(format!("Failed to create token type tensor: {}", e))
                    })?;
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
        })
        .map_err(|e| KbError::embedding(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| KbError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| KbError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape: Vec<usize> = view.shape().to_vec();
        match shape.len() {
            // (batch, seq, hidden): token states, pool them
            3 => Ok(mean_pool(&view, &attention_mask, max_len)),
            // (batch, hidden): already pooled
            2 => Ok((0..shape[0])
                .map(|i| l2_normalize((0..shape[1]).map(|j| view[[i, j]]).collect()))
                .collect()),
            _ => Err(KbError::embedding(format!(
                "Unexpected output shape: {:?}",
                shape
            ))),
        }
    }
}

/// Mean pooling over the sequence axis, counting only unmasked tokens.
fn mean_pool(tensor: &ArrayViewD<'_, f32>, attention_mask: &[i64], max_len: usize) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let (batch_size, seq_len, hidden_dim) = (shape[0], shape[1], shape[2]);

    (0..batch_size)
        .map(|i| {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut valid = 0usize;
            for j in 0..seq_len.min(max_len) {
                if attention_mask[i * max_len + j] == 1 {
                    valid += 1;
                    for (k, slot) in sum.iter_mut().enumerate() {
                        *slot += tensor[[i, j, k]];
                    }
                }
            }
            if valid == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / valid as f32).collect())
        })
        .collect()
}

impl Embedder for OnnxEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.run_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
