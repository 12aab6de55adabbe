//! SQLite-backed conversation history.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};
use ulid::Ulid;

use eduquery_core::{KbError, Result};

use crate::schema::SCHEMA;
use crate::types::{preview, Conversation, ConversationSummary, Message, Role};

/// Conversation history store.
///
/// One connection behind a blocking mutex. Timestamps come from a clock
/// that never repeats a value, so "most recently updated" is well defined
/// even for writes within the same millisecond.
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,

    /// Last timestamp handed out, Unix milliseconds.
    clock: Mutex<i64>,
}

impl HistoryStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| KbError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KbError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| KbError::database(format!("Failed to configure connection: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| KbError::database(format!("Failed to initialize schema: {}", e)))?;

        info!("History database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Mutex::new(0),
        })
    }

    /// Next timestamp, strictly greater than the previous one.
    fn tick(&self) -> Result<i64> {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let mut last = self.clock.lock().map_err(|e| KbError::database(e.to_string()))?;
        *last = wall.max(*last + 1);
        Ok(*last)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self.conn.lock().map_err(|e| KbError::database(e.to_string()))?;
        f(&mut conn)
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            title: row.get(1)?,
            subject: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn not_found(id: &str) -> KbError {
        KbError::ConversationNotFound { id: id.to_string() }
    }

    /// Start a conversation.
    pub fn create_conversation(&self, title: &str, subject: Option<&str>) -> Result<Conversation> {
        let now = self.tick()?;
        let conversation = Conversation {
            id: Ulid::new().to_string(),
            title: title.to_string(),
            subject: subject.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, title, subject, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation.id,
                    conversation.title,
                    conversation.subject,
                    conversation.created_at,
                    conversation.updated_at,
                ],
            )
            .map_err(|e| KbError::database(format!("Failed to create conversation: {}", e)))?;

            debug!("Created conversation: {}", conversation.id);
            Ok(())
        })?;

        Ok(conversation)
    }

    /// Get a conversation header.
    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, subject, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id],
                Self::row_to_conversation,
            )
            .optional()
            .map_err(|e| KbError::database(e.to_string()))
        })
    }

    /// Append a message and mark the conversation as updated.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        context_sources: &[String],
    ) -> Result<Message> {
        let now = self.tick()?;
        let sources = serde_json::to_string(context_sources)?;

        self.with_conn(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| KbError::database(e.to_string()))?;

            let updated = tx
                .execute(
                    "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                    params![now, conversation_id],
                )
                .map_err(|e| KbError::database(e.to_string()))?;
            if updated == 0 {
                return Err(Self::not_found(conversation_id));
            }

            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, context_sources, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id, role.as_str(), content, sources, now],
            )
            .map_err(|e| KbError::database(format!("Failed to append message: {}", e)))?;
            let id = tx.last_insert_rowid();

            tx.commit().map_err(|e| KbError::database(e.to_string()))?;

            debug!("Appended {} message {} to {}", role, id, conversation_id);
            Ok(Message {
                id,
                conversation_id: conversation_id.to_string(),
                role,
                content: content.to_string(),
                context_sources: context_sources.to_vec(),
                created_at: now,
            })
        })
    }

    /// All conversations, most recently updated first.
    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT c.id, c.title, c.subject, c.created_at, c.updated_at,
                           (SELECT content FROM messages
                            WHERE conversation_id = c.id AND role = 'user'
                            ORDER BY id ASC LIMIT 1)
                    FROM conversations c
                    ORDER BY c.updated_at DESC
                    "#,
                )
                .map_err(|e| KbError::database(e.to_string()))?;

            let summaries = stmt
                .query_map([], |row| {
                    let first: Option<String> = row.get(5)?;
                    Ok(ConversationSummary {
                        conversation: Self::row_to_conversation(row)?,
                        preview: first.as_deref().map(preview),
                    })
                })
                .map_err(|e| KbError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| KbError::database(e.to_string()))?;

            Ok(summaries)
        })
    }

    /// Messages of a conversation in the order they were appended.
    pub fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        if self.get_conversation(conversation_id)?.is_none() {
            return Err(Self::not_found(conversation_id));
        }

        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, conversation_id, role, content, context_sources, created_at
                    FROM messages WHERE conversation_id = ?1
                    ORDER BY id ASC
                    "#,
                )
                .map_err(|e| KbError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params![conversation_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })
                .map_err(|e| KbError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| KbError::database(e.to_string()))?;

            rows.into_iter()
                .map(|(id, conversation_id, role, content, sources, created_at)| {
                    let context_sources = match sources {
                        Some(json) => serde_json::from_str(&json)?,
                        None => Vec::new(),
                    };
                    Ok(Message {
                        id,
                        conversation_id,
                        role: role
                            .parse()
                            .map_err(|e: KbError| KbError::database(e.to_string()))?,
                        content,
                        context_sources,
                        created_at,
                    })
                })
                .collect()
        })
    }

    /// Change a conversation's title.
    pub fn rename_conversation(&self, id: &str, title: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE conversations SET title = ?1 WHERE id = ?2",
                    params![title, id],
                )
                .map_err(|e| KbError::database(e.to_string()))?;
            if updated == 0 {
                return Err(Self::not_found(id));
            }
            Ok(())
        })
    }

    /// Delete a conversation and its messages.
    pub fn delete_conversation(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM conversations WHERE id = ?1", params![id])
                .map_err(|e| KbError::database(e.to_string()))?;
            if deleted == 0 {
                return Err(Self::not_found(id));
            }

            debug!("Deleted conversation: {}", id);
            Ok(())
        })
    }

    /// Delete every conversation; returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM conversations", [])
                .map_err(|e| KbError::database(e.to_string()))?;

            info!("Cleared {} conversations", deleted);
            Ok(deleted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_get() {
        let store = HistoryStore::open_memory().unwrap();
        let created = store.create_conversation("Limits", Some("Math")).unwrap();

        let fetched = store.get_conversation(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get_conversation("missing").unwrap().is_none());
    }

    #[test]
    fn test_messages_in_append_order() {
        let store = HistoryStore::open_memory().unwrap();
        let conv = store.create_conversation("Limits", Some("Math")).unwrap();

        store
            .append_message(&conv.id, Role::User, "what is a limit?", &[])
            .unwrap();
        store
            .append_message(
                &conv.id,
                Role::Assistant,
                "A limit describes approach.",
                &["limits.docx".to_string()],
            )
            .unwrap();

        let messages = store.messages(&conv.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].context_sources, vec!["limits.docx"]);
        assert!(messages[0].id < messages[1].id);
    }

    #[test]
    fn test_unknown_conversation() {
        let store = HistoryStore::open_memory().unwrap();

        let err = store
            .append_message("nope", Role::User, "hello", &[])
            .unwrap_err();
        assert_eq!(err.error_code(), "CONVERSATION_NOT_FOUND");
        assert_eq!(
            store.messages("nope").unwrap_err().error_code(),
            "CONVERSATION_NOT_FOUND"
        );
        assert!(store.delete_conversation("nope").is_err());
        assert!(store.rename_conversation("nope", "x").is_err());
    }

    #[test]
    fn test_list_newest_first_with_preview() {
        let store = HistoryStore::open_memory().unwrap();
        let older = store.create_conversation("Older", None).unwrap();
        let newer = store.create_conversation("Newer", None).unwrap();

        // Appending moves the older conversation to the front
        store
            .append_message(
                &older.id,
                Role::User,
                "Explain the fundamental theorem of calculus please",
                &[],
            )
            .unwrap();

        let list = store.list_conversations().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].conversation.id, older.id);
        assert_eq!(
            list[0].preview.as_deref(),
            Some("Explain the fundamental theore...")
        );
        assert_eq!(list[1].conversation.id, newer.id);
        assert_eq!(list[1].preview, None);
    }

    #[test]
    fn test_rename_delete_clear() {
        let store = HistoryStore::open_memory().unwrap();
        let a = store.create_conversation("A", None).unwrap();
        let b = store.create_conversation("B", None).unwrap();
        store.append_message(&a.id, Role::User, "hi", &[]).unwrap();

        store.rename_conversation(&a.id, "Renamed").unwrap();
        assert_eq!(store.get_conversation(&a.id).unwrap().unwrap().title, "Renamed");

        store.delete_conversation(&a.id).unwrap();
        assert!(store.get_conversation(&a.id).unwrap().is_none());
        assert!(store.messages(&a.id).is_err());

        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.get_conversation(&b.id).unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/history.db");

        let id = {
            let store = HistoryStore::open(&path).unwrap();
            let conv = store.create_conversation("Saved", Some("Physics")).unwrap();
            store.append_message(&conv.id, Role::User, "force?", &[]).unwrap();
            conv.id
        };

        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.messages(&id).unwrap()[0].content, "force?");
    }
}
