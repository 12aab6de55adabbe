//! Conversation history records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use eduquery_core::KbError;

/// Characters of the first user message shown in a listing.
pub const PREVIEW_CHARS: usize = 30;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(KbError::invalid_argument(format!("unknown role {:?}", other))),
        }
    }
}

/// A conversation header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// ULID string.
    pub id: String,

    pub title: String,

    /// Subject the conversation was held against, if any.
    pub subject: Option<String>,

    /// Unix milliseconds.
    pub created_at: i64,

    /// Unix milliseconds of the last appended message.
    pub updated_at: i64,
}

/// A conversation with a preview for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,

    /// Start of the first user message, `...`-suffixed when cut.
    pub preview: Option<String>,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,

    /// Source documents the message drew on.
    pub context_sources: Vec<String>,

    /// Unix milliseconds.
    pub created_at: i64,
}

/// Shorten a message for a listing.
pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
