//! Knowledge base construction for one subject.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use eduquery_chunk::RecursiveChunker;
use eduquery_core::{
    BuildReport, Chunker, ChunkingConfig, Embedder, KbError, Result, SourceDocument,
};
use eduquery_index::{ChunkStore, FlatIndex, KnowledgeBase};

use crate::extract::ExtractorSet;
use crate::files::{relative_name, walk_files};

/// Default number of chunks embedded per call.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Documents read from a subject folder.
#[derive(Debug, Default)]
pub struct CollectedDocuments {
    /// Documents in discovery order, possibly with empty text.
    pub documents: Vec<SourceDocument>,

    /// Files without a matching extractor.
    pub skipped: usize,
}

/// Builds and commits a subject's knowledge base.
///
/// Pipeline: extract, chunk, embed in batches, assemble the indexes in
/// memory, then commit both artifacts atomically.
pub struct KnowledgeBaseBuilder<E: ?Sized> {
    embedder: Arc<E>,
    chunker: Box<dyn Chunker>,
    extractors: ExtractorSet,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl<E> KnowledgeBaseBuilder<E>
where
    E: Embedder + ?Sized,
{
    /// Create a builder with the recursive chunker and the default
    /// extractors.
    pub fn new(embedder: Arc<E>, chunking: ChunkingConfig) -> Self {
        Self {
            embedder,
            chunker: Box::new(RecursiveChunker::new()),
            extractors: ExtractorSet::default(),
            chunking,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the embedding batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replace the chunker.
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// Replace the extractor set.
    pub fn with_extractors(mut self, extractors: ExtractorSet) -> Self {
        self.extractors = extractors;
        self
    }

    /// Read every supported file under a subject folder.
    ///
    /// Extraction failures are logged and yield empty text so the rest of
    /// the subject still builds.
    pub fn collect_documents(&self, subject_dir: &Path) -> CollectedDocuments {
        let mut collected = CollectedDocuments::default();

        for path in walk_files(subject_dir) {
            let Some(extractor) = self.extractors.for_path(&path) else {
                warn!("Skipping unsupported file {:?}", path);
                collected.skipped += 1;
                continue;
            };

            let text = extractor.extract(&path).unwrap_or_else(|e| {
                warn!("Failed to extract {:?}: {}", path, e);
                String::new()
            });
            collected
                .documents
                .push(SourceDocument::new(relative_name(&path, subject_dir), text));
        }

        collected
    }

    /// Chunk all documents into one store; chunk ID = position.
    pub fn chunk_documents(&self, documents: &[SourceDocument]) -> Result<ChunkStore> {
        let mut store = ChunkStore::new();
        for doc in documents {
            let chunks = self.chunker.chunk(&doc.text, &self.chunking)?;
            debug!("{}: {} chunks", doc.path, chunks.len());
            for chunk in chunks {
                store.push(chunk, doc.path.as_str());
            }
        }
        Ok(store)
    }

    /// Embed every chunk, `batch_size` at a time.
    pub fn embed_chunks(&self, store: &ChunkStore) -> Result<FlatIndex> {
        let texts: Vec<&str> = store.texts().collect();
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            let vectors = self.embedder.embed_batch(batch).map_err(|e| match e {
                KbError::Embedding { .. } => e,
                other => KbError::embedding(format!("batch {}: {}", i, other)),
            })?;
            if vectors.len() != batch.len() {
                return Err(KbError::embedding(format!(
                    "batch {}: {} vectors for {} texts",
                    i,
                    vectors.len(),
                    batch.len()
                )));
            }
            embeddings.extend(vectors);
        }

        FlatIndex::from_embeddings(embeddings)
    }

    /// Build a knowledge base in memory from already-extracted documents.
    pub fn build_from_documents(
        &self,
        subject: &str,
        documents: &[SourceDocument],
    ) -> Result<KnowledgeBase> {
        let chunks = self.chunk_documents(documents)?;
        if chunks.is_empty() {
            return Err(KbError::empty_corpus(subject));
        }

        info!(
            "Embedding {} chunks for '{}' in batches of {}",
            chunks.len(),
            subject,
            self.batch_size
        );
        let vectors = self.embed_chunks(&chunks)?;

        KnowledgeBase::new(subject, chunks, vectors)
    }

    /// Build a subject from its folder and commit the artifacts to
    /// `index_dir`, replacing any previous build.
    ///
    /// On failure no artifacts remain in `index_dir`, so the subject reads
    /// as unbuilt.
    pub fn build_subject(
        &self,
        subject: &str,
        subject_dir: &Path,
        index_dir: &Path,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        info!("Building '{}' from {:?}", subject, subject_dir);

        let collected = self.collect_documents(subject_dir);
        let kb = match self.build_from_documents(subject, &collected.documents) {
            Ok(kb) => kb,
            Err(e) => {
                if let Err(remove_err) = KnowledgeBase::remove(index_dir) {
                    warn!("Failed to clear artifacts of '{}': {}", subject, remove_err);
                }
                return Err(e);
            }
        };
        kb.commit(index_dir)?;

        let report = BuildReport {
            subject: subject.to_string(),
            documents: collected.documents.len(),
            skipped: collected.skipped,
            chunks: kb.len(),
            dimension: kb.vectors().dimension(),
        };
        info!(
            "Built '{}' in {}ms: {} documents, {} chunks",
            subject,
            start.elapsed().as_millis(),
            report.documents,
            report.chunks
        );
        Ok(report)
    }
}
