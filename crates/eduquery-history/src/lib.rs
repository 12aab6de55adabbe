//! eduquery-history - Conversation history
//!
//! An append-only log of user and assistant messages grouped into
//! conversations, stored in SQLite. Retrieval never reads it.

mod schema;
mod sqlite;
mod types;

pub use sqlite::HistoryStore;
pub use types::{Conversation, ConversationSummary, Message, Role, PREVIEW_CHARS};
