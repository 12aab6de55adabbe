//! A subject's persisted knowledge base and its atomic commit protocol.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use eduquery_core::{Chunk, KbError, Result};

use crate::{ChunkStore, FlatIndex, LexicalIndex};

/// Chunk text and provenance.
pub const CHUNK_STORE_FILE: &str = "chunks.json";

/// Embeddings, one row per chunk.
pub const VECTOR_INDEX_FILE: &str = "vector_index";

const TMP_SUFFIX: &str = ".tmp";

/// Chunk store, vector index and lexical index of one subject.
///
/// Construction checks that all three cover the same chunk IDs, so a value
/// of this type is always queryable.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    subject: String,
    chunks: ChunkStore,
    vectors: FlatIndex,
    lexical: LexicalIndex,
}

impl KnowledgeBase {
    /// Assemble a knowledge base from a chunk store and matching vectors.
    pub fn new(subject: impl Into<String>, chunks: ChunkStore, vectors: FlatIndex) -> Result<Self> {
        let subject = subject.into();
        if !chunks.is_consistent() || chunks.len() != vectors.len() {
            return Err(KbError::internal(format!(
                "subject '{}': {} chunks, {} sources, {} vectors",
                subject,
                chunks.chunks.len(),
                chunks.sources.len(),
                vectors.len()
            )));
        }
        let lexical = LexicalIndex::build(chunks.texts());
        Ok(Self {
            subject,
            chunks,
            vectors,
            lexical,
        })
    }

    /// Load a committed knowledge base from its subject directory.
    ///
    /// Missing files are `IndexNotFound`; files that cannot be read or do
    /// not agree with each other are `CorruptArtifact`.
    pub fn open(subject: &str, dir: &Path) -> Result<Self> {
        if !Self::is_complete(dir) {
            return Err(KbError::index_not_found(subject));
        }

        let chunk_bytes = read_artifact(subject, &dir.join(CHUNK_STORE_FILE))?;
        let chunks = ChunkStore::from_bytes(&chunk_bytes)
            .map_err(|e| KbError::corrupt(subject, format!("unreadable {}: {}", CHUNK_STORE_FILE, e)))?;
        if !chunks.is_consistent() {
            return Err(KbError::corrupt(
                subject,
                format!(
                    "{} chunks but {} sources",
                    chunks.chunks.len(),
                    chunks.sources.len()
                ),
            ));
        }

        let vector_bytes = read_artifact(subject, &dir.join(VECTOR_INDEX_FILE))?;
        let (vectors, digest) =
            FlatIndex::decode(&vector_bytes).map_err(|reason| KbError::corrupt(subject, reason))?;
        if vectors.len() != chunks.len() {
            return Err(KbError::corrupt(
                subject,
                format!("{} chunks but {} vectors", chunks.len(), vectors.len()),
            ));
        }
        if blake3::hash(&chunk_bytes).as_bytes() != &digest {
            return Err(KbError::corrupt(
                subject,
                "vector index was built from a different chunk store",
            ));
        }

        info!(
            "Loaded knowledge base '{}' ({} chunks, dim={})",
            subject,
            chunks.len(),
            vectors.dimension()
        );
        Self::new(subject, chunks, vectors)
    }

    /// Whether both artifact files exist in `dir`.
    pub fn is_complete(dir: &Path) -> bool {
        dir.join(CHUNK_STORE_FILE).is_file() && dir.join(VECTOR_INDEX_FILE).is_file()
    }

    /// Write both artifacts to `dir`, replacing any previous pair.
    ///
    /// Both files are written to temporaries and renamed into place, chunk
    /// store first. If any step fails, temporaries and final files are all
    /// removed, leaving the subject unbuilt.
    pub fn commit(&self, dir: &Path) -> Result<()> {
        let chunk_bytes = self.chunks.to_bytes()?;
        let digest = blake3::hash(&chunk_bytes);
        let vector_bytes = self.vectors.encode(digest.as_bytes());

        if let Err(e) = write_pair(dir, &chunk_bytes, &vector_bytes) {
            warn!("Commit of '{}' failed, discarding artifacts: {}", self.subject, e);
            discard(dir);
            return Err(e.into());
        }

        info!(
            "Committed knowledge base '{}' ({} chunks, {} bytes of vectors)",
            self.subject,
            self.len(),
            vector_bytes.len()
        );
        Ok(())
    }

    /// Delete both artifacts, ignoring files that are already gone.
    pub fn remove(dir: &Path) -> Result<()> {
        for name in [VECTOR_INDEX_FILE, CHUNK_STORE_FILE] {
            match fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn vectors(&self) -> &FlatIndex {
        &self.vectors
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, id: usize) -> Option<Chunk> {
        self.chunks.get(id)
    }
}

/// Read one artifact. A file that vanished since the completeness check
/// (a rebuild in progress) is `IndexNotFound`.
fn read_artifact(subject: &str, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => KbError::index_not_found(subject),
        _ => KbError::corrupt(subject, format!("cannot read {:?}: {}", path, e)),
    })
}

fn tmp_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", name, TMP_SUFFIX))
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn write_pair(dir: &Path, chunk_bytes: &[u8], vector_bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let chunk_tmp = tmp_path(dir, CHUNK_STORE_FILE);
    let vector_tmp = tmp_path(dir, VECTOR_INDEX_FILE);
    write_synced(&chunk_tmp, chunk_bytes)?;
    write_synced(&vector_tmp, vector_bytes)?;

    // A stale index must never sit next to the new chunk store
    match fs::remove_file(dir.join(VECTOR_INDEX_FILE)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(&chunk_tmp, dir.join(CHUNK_STORE_FILE))?;
    fs::rename(&vector_tmp, dir.join(VECTOR_INDEX_FILE))?;
    debug!("Renamed artifacts into place in {:?}", dir);
    Ok(())
}

fn discard(dir: &Path) {
    for name in [CHUNK_STORE_FILE, VECTOR_INDEX_FILE] {
        let _ = fs::remove_file(tmp_path(dir, name));
        let _ = fs::remove_file(dir.join(name));
    }
}
