//! Flat vector index with exact nearest-neighbor search.
//!
//! Binary layout (little-endian):
//!
//! ```text
//! [magic "EQVI"][version u32][dimension u32][count u64]
//! [chunk store digest: 32 bytes]
//! [count * dimension f32]
//! [BLAKE3 of everything above: 32 bytes]
//! ```

use eduquery_core::{KbError, Result};

const MAGIC: &[u8; 4] = b"EQVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32;
const FOOTER_LEN: usize = 32;

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Row-major collection of fixed-dimension vectors; row = chunk ID.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build an index from embeddings; the first vector fixes the dimension.
    ///
    /// A width mismatch means the embedding backend broke its contract and
    /// is reported as an internal error.
    pub fn from_embeddings(embeddings: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        let mut index = Self::new(dimension);
        index.data.reserve(dimension * embeddings.len());
        for embedding in &embeddings {
            index.add(embedding)?;
        }
        Ok(index)
    }

    /// Append one vector.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(KbError::internal(format!(
                "vector {} has dimension {}, index expects {}",
                self.len(),
                vector.len(),
                self.dimension
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored vector for a chunk ID.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        if id >= self.len() {
            return None;
        }
        let start = id * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Exact k-nearest-neighbor search under squared Euclidean distance.
    ///
    /// Returns `(id, distance)` pairs, nearest first, ties by ascending ID.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        // No vectors means no width to check against
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(KbError::invalid_argument(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension.max(1))
            .enumerate()
            .map(|(id, vector)| (id, squared_l2(query, vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize, binding the index to the chunk store it was built with.
    pub fn encode(&self, store_digest: &[u8; 32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4 + FOOTER_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        out.extend_from_slice(store_digest);
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        let footer = blake3::hash(&out);
        out.extend_from_slice(footer.as_bytes());
        out
    }

    /// Parse an encoded index, returning it with the chunk store digest.
    ///
    /// The error string describes why the bytes are unusable.
    pub fn decode(bytes: &[u8]) -> std::result::Result<(Self, [u8; 32]), String> {
        if bytes.len() < HEADER_LEN + FOOTER_LEN {
            return Err(format!("vector index truncated ({} bytes)", bytes.len()));
        }
        let (body, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
        if blake3::hash(body).as_bytes() != footer {
            return Err("vector index checksum mismatch".to_string());
        }
        if &body[0..4] != MAGIC {
            return Err("not a vector index file".to_string());
        }

        let version = u32::from_le_bytes(read_array(&body[4..8]));
        if version != FORMAT_VERSION {
            return Err(format!("unsupported vector index version {}", version));
        }
        let dimension = u32::from_le_bytes(read_array(&body[8..12])) as usize;
        let count = u64::from_le_bytes(read_array(&body[12..20])) as usize;
        let digest: [u8; 32] = read_array(&body[20..HEADER_LEN]);

        let payload = &body[HEADER_LEN..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| "vector index header overflows".to_string())?;
        if payload.len() != expected {
            return Err(format!(
                "vector index holds {} bytes of vectors, header declares {}",
                payload.len(),
                expected
            ));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(read_array(b)))
            .collect();
        Ok((Self { dimension, data }, digest))
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
