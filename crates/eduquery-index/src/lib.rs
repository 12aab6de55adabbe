//! eduquery-index - Knowledge base artifacts
//!
//! A subject's knowledge base is two files under its index directory:
//!
//! ```text
//! <indices_root>/<subject>/
//!     vector_index   # flat f32 vectors, one per chunk
//!     chunks.json    # {"chunks": [...], "sources": [...]}
//! ```
//!
//! The lexical (BM25) index is derived from the chunk store when a
//! knowledge base is opened and is never written to disk.

mod chunk_store;
mod flat;
mod knowledge_base;
mod lexical;

pub use chunk_store::ChunkStore;
pub use flat::{squared_l2, FlatIndex};
pub use knowledge_base::{KnowledgeBase, CHUNK_STORE_FILE, VECTOR_INDEX_FILE};
pub use lexical::{tokenize, LexicalIndex};
