//! eduquery-kb - Subject knowledge bases
//!
//! Ties the pipeline together: documents are extracted per format, chunked,
//! embedded and committed as a knowledge base per subject; the registry
//! discovers subjects under a data root and answers retrieval calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use eduquery_kb::KnowledgeBaseRegistry;
//! use std::sync::Arc;
//!
//! let registry = KnowledgeBaseRegistry::from_config(&config, Arc::new(embedder));
//! let summary = registry.build_all(|subject, done| println!("{subject}: {:.0}%", done * 100.0));
//! let passages = registry.retrieve("what is a derivative?", "Math")?;
//! ```

mod builder;
mod extract;
mod files;
mod preprocess;
mod registry;

pub use builder::{CollectedDocuments, KnowledgeBaseBuilder, DEFAULT_BATCH_SIZE};
pub use extract::{
    DocxExtractor, ExtractorSet, PdfExtractor, PlainTextExtractor, PptxExtractor,
};
pub use preprocess::preprocess;
pub use registry::KnowledgeBaseRegistry;

// Re-export for convenience
pub use eduquery_core::{BuildReport, BuildSummary, SubjectStatus, TextExtractor};
