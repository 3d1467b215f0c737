//! Conversation storage implementation.
//!
//! Provides SQLite-backed storage for conversations, their active message
//! set and the archive records written by compaction. Structural changes
//! (compaction and restoration) are applied through commit objects, each in
//! a single transaction guarded by the conversation's `version` column.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use parley_core::{Config, Conversation, Message, MessageArchive, ProviderKind};

/// Errors that can occur during conversation storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Concurrent modification of conversation {0}")]
    Conflict(String),

    #[error("Storage path error: {0}")]
    PathError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Summary information for conversation listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub model: String,
    pub provider: ProviderKind,
    pub context_window_size: u32,
    pub current_token_count: u32,
    pub message_count: u32,
    pub archived_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Everything a compaction writes, applied atomically.
#[derive(Debug, Clone)]
pub struct CompactionCommit {
    pub conversation_id: String,
    /// Version the plan was computed against
    pub expected_version: i64,
    /// Summary message replacing the archived block
    pub summary: Message,
    /// One record per archived message, linked to `summary`
    pub archives: Vec<MessageArchive>,
    /// Accountant's count over the post-compaction active set
    pub new_token_count: u32,
}

/// Everything a restoration writes, applied atomically.
#[derive(Debug, Clone)]
pub struct RestorationCommit {
    pub conversation_id: String,
    pub expected_version: i64,
    /// Messages rebuilt from archive records
    pub restored: Vec<Message>,
    /// Archive records consumed by the restoration
    pub archive_ids: Vec<String>,
    /// Summary messages to delete
    pub summary_ids: Vec<String>,
    pub new_token_count: u32,
}

/// Conversation storage trait for abstraction over storage backends.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a new conversation.
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Get a conversation by ID.
    async fn get_conversation(&self, id: &str) -> Result<Conversation>;

    /// List a user's conversations, most recently updated first.
    async fn list_conversations(&self, user_id: &str, limit: usize)
        -> Result<Vec<ConversationSummary>>;

    /// Delete a conversation with its messages and archives.
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Append a message at the end of the conversation.
    ///
    /// Assigns the next sequence number, adds the message's token count to
    /// the conversation total and bumps its version.
    async fn append_message(&self, message: Message) -> Result<Message>;

    /// Get the active messages in canonical order.
    async fn active_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Get the archive records in original order.
    async fn archived_messages(&self, conversation_id: &str) -> Result<Vec<MessageArchive>>;

    /// Apply a compaction: archive and remove the old messages, insert the
    /// summary and store the new token count.
    async fn apply_compaction(&self, commit: &CompactionCommit) -> Result<usize>;

    /// Apply a restoration: re-insert archived messages, delete the summaries
    /// and archive records and store the new token count.
    async fn apply_restoration(&self, commit: &RestorationCommit) -> Result<usize>;

    /// Overwrite the conversation's token count.
    async fn set_token_count(&self, id: &str, expected_version: i64, tokens: u32) -> Result<()>;
}

/// SQLite-backed conversation storage.
pub struct SqliteConversationStore {
    /// Database connection (wrapped in mutex for thread safety).
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteConversationStore {
    /// Create a new SQLite conversation store in `base_dir`.
    ///
    /// Creates the database and runs migrations if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let db_path = base_dir.join("conversations.db");
        let conn = Connection::open(&db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
            path: db_path,
        };

        store.run_migrations()?;

        Ok(store)
    }

    /// Open the store in the configured data directory.
    pub fn open(config: &Config) -> Result<Self> {
        let data_dir = config.data_dir();
        if data_dir.as_os_str().is_empty() {
            return Err(StoreError::PathError("Could not find data directory".into()));
        }
        Self::new(data_dir)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        // The table does not exist before the first migration.
        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            debug!("Applying migration 001_initial");
            let migration = include_str!("../migrations/001_initial.sql");
            conn.execute_batch(migration)?;
        }

        Ok(())
    }

    /// Format datetime for SQLite. Fixed width, so text order is time order.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            model: row.get(3)?,
            provider: parse_column(row, 4)?,
            context_window_size: row.get(5)?,
            current_token_count: row.get(6)?,
            version: row.get(7)?,
            created_at: datetime_column(row, 8)?,
            updated_at: datetime_column(row, 9)?,
        })
    }

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: parse_column(row, 2)?,
            content: row.get(3)?,
            token_count: row.get(4)?,
            is_summary: row.get(5)?,
            sequence: row.get(6)?,
            created_at: datetime_column(row, 7)?,
        })
    }

    fn row_to_archive(row: &Row<'_>) -> rusqlite::Result<MessageArchive> {
        Ok(MessageArchive {
            id: row.get(0)?,
            original_message_id: row.get(1)?,
            conversation_id: row.get(2)?,
            role: parse_column(row, 3)?,
            content: row.get(4)?,
            token_count: row.get(5)?,
            is_summary: row.get(6)?,
            sequence: row.get(7)?,
            original_created_at: datetime_column(row, 8)?,
            archived_at: datetime_column(row, 9)?,
            summary_message_id: row.get(10)?,
        })
    }

    fn insert_message(tx: &Transaction<'_>, message: &Message) -> Result<()> {
        tx.execute(
            r#"
            INSERT INTO messages (
                id, conversation_id, role, content, token_count,
                is_summary, sequence, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                message.id,
                message.conversation_id,
                message.role.as_str(),
                message.content,
                message.token_count,
                message.is_summary,
                message.sequence,
                Self::format_datetime(&message.created_at),
            ],
        )?;
        Ok(())
    }

    /// Store the new token count if nobody else changed the conversation.
    fn bump_version(
        tx: &Transaction<'_>,
        conversation_id: &str,
        expected_version: i64,
        tokens: u32,
    ) -> Result<()> {
        let rows = tx.execute(
            r#"
            UPDATE conversations SET
                current_token_count = ?3,
                version = version + 1,
                updated_at = ?4
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                conversation_id,
                expected_version,
                tokens,
                Self::format_datetime(&Utc::now()),
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::Conflict(conversation_id.to_string()));
        }
        Ok(())
    }
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = parley_core::Error>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const CONVERSATION_COLUMNS: &str = "id, user_id, title, model, provider, context_window_size, \
     current_token_count, version, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, token_count, is_summary, sequence, created_at";

const ARCHIVE_COLUMNS: &str = "id, original_message_id, conversation_id, role, content, \
     token_count, is_summary, sequence, original_created_at, archived_at, summary_message_id";

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO conversations (
                id, user_id, title, model, provider, context_window_size,
                current_token_count, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                conversation.id,
                conversation.user_id,
                conversation.title,
                conversation.model,
                conversation.provider.as_str(),
                conversation.context_window_size,
                conversation.current_token_count,
                conversation.version,
                Self::format_datetime(&conversation.created_at),
                Self::format_datetime(&conversation.updated_at),
            ],
        )?;

        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let conn = self.conn();

        conn.query_row(
            &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
            params![id],
            Self::row_to_conversation,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.title, c.model, c.provider, c.context_window_size,
                   c.current_token_count, c.updated_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id),
                   (SELECT COUNT(*) FROM message_archives a WHERE a.conversation_id = c.id)
            FROM conversations c
            WHERE c.user_id = ?1
            ORDER BY c.updated_at DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                model: row.get(2)?,
                provider: parse_column(row, 3)?,
                context_window_size: row.get(4)?,
                current_token_count: row.get(5)?,
                updated_at: datetime_column(row, 6)?,
                message_count: row.get(7)?,
                archived_count: row.get(8)?,
            })
        })?;

        let summaries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let conn = self.conn();

        // Cascade deletes messages and archives
        let rows = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;

        if rows == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn append_message(&self, mut message: Message) -> Result<Message> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // Archived messages keep their sequence, so they count too.
        message.sequence = tx.query_row(
            r#"
            SELECT COALESCE(MAX(seq), 0) + 1 FROM (
                SELECT MAX(sequence) AS seq FROM messages WHERE conversation_id = ?1
                UNION ALL
                SELECT MAX(sequence) AS seq FROM message_archives WHERE conversation_id = ?1
            )
            "#,
            params![message.conversation_id],
            |row| row.get(0),
        )?;

        Self::insert_message(&tx, &message)?;

        let rows = tx.execute(
            r#"
            UPDATE conversations SET
                current_token_count = current_token_count + ?2,
                version = version + 1,
                updated_at = ?3
            WHERE id = ?1
            "#,
            params![
                message.conversation_id,
                message.token_count.unwrap_or(0),
                Self::format_datetime(&Utc::now()),
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(message.conversation_id.clone()));
        }

        tx.commit()?;
        Ok(message)
    }

    async fn active_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY sequence, created_at",
            MESSAGE_COLUMNS
        ))?;
        let messages = stmt
            .query_map(params![conversation_id], Self::row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    async fn archived_messages(&self, conversation_id: &str) -> Result<Vec<MessageArchive>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM message_archives WHERE conversation_id = ?1 \
             ORDER BY sequence, original_created_at",
            ARCHIVE_COLUMNS
        ))?;
        let archives = stmt
            .query_map(params![conversation_id], Self::row_to_archive)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(archives)
    }

    async fn apply_compaction(&self, commit: &CompactionCommit) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for archive in &commit.archives {
            tx.execute(
                &format!(
                    "INSERT INTO message_archives ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    ARCHIVE_COLUMNS
                ),
                params![
                    archive.id,
                    archive.original_message_id,
                    archive.conversation_id,
                    archive.role.as_str(),
                    archive.content,
                    archive.token_count,
                    archive.is_summary,
                    archive.sequence,
                    Self::format_datetime(&archive.original_created_at),
                    Self::format_datetime(&archive.archived_at),
                    archive.summary_message_id,
                ],
            )?;

            let removed = tx.execute(
                "DELETE FROM messages WHERE id = ?1 AND conversation_id = ?2 AND role != 'system'",
                params![archive.original_message_id, commit.conversation_id],
            )?;

            // The message vanished or changed since the plan was made.
            if removed != 1 {
                return Err(StoreError::Conflict(commit.conversation_id.clone()));
            }
        }

        Self::insert_message(&tx, &commit.summary)?;
        Self::bump_version(
            &tx,
            &commit.conversation_id,
            commit.expected_version,
            commit.new_token_count,
        )?;

        tx.commit()?;
        debug!(
            conversation_id = %commit.conversation_id,
            archived = commit.archives.len(),
            "Compaction committed"
        );
        Ok(commit.archives.len())
    }

    async fn apply_restoration(&self, commit: &RestorationCommit) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for summary_id in &commit.summary_ids {
            let removed = tx.execute(
                "DELETE FROM messages WHERE id = ?1 AND conversation_id = ?2 AND is_summary = 1",
                params![summary_id, commit.conversation_id],
            )?;
            if removed != 1 {
                return Err(StoreError::Conflict(commit.conversation_id.clone()));
            }
        }

        for message in &commit.restored {
            Self::insert_message(&tx, message)?;
        }

        for archive_id in &commit.archive_ids {
            let removed = tx.execute(
                "DELETE FROM message_archives WHERE id = ?1 AND conversation_id = ?2",
                params![archive_id, commit.conversation_id],
            )?;
            if removed != 1 {
                return Err(StoreError::Conflict(commit.conversation_id.clone()));
            }
        }

        Self::bump_version(
            &tx,
            &commit.conversation_id,
            commit.expected_version,
            commit.new_token_count,
        )?;

        tx.commit()?;
        debug!(
            conversation_id = %commit.conversation_id,
            restored = commit.restored.len(),
            "Restoration committed"
        );
        Ok(commit.restored.len())
    }

    async fn set_token_count(&self, id: &str, expected_version: i64, tokens: u32) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        Self::bump_version(&tx, id, expected_version, tokens)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteConversationStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteConversationStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    async fn create_conversation(store: &SqliteConversationStore) -> Conversation {
        let conversation = Conversation::new("alice", "llama3.2", ProviderKind::Local, 8_000)
            .with_title("Trip planning");
        store.create_conversation(&conversation).await.unwrap();
        conversation
    }

    #[tokio::test]
    async fn test_create_and_get_conversation() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;

        let retrieved = store.get_conversation(&conversation.id).await.unwrap();
        assert_eq!(retrieved, conversation);
    }

    #[tokio::test]
    async fn test_missing_conversation_is_not_found() {
        let (store, _tmp) = create_test_store();
        let err = store.get_conversation("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append_assigns_sequence_and_counts_tokens() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;

        let first = store
            .append_message(Message::system(&conversation.id, "Be brief.").with_token_count(3))
            .await
            .unwrap();
        let second = store
            .append_message(Message::user(&conversation.id, "Hello").with_token_count(2))
            .await
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);

        let messages = store.active_messages(&conversation.id).await.unwrap();
        assert_eq!(messages, vec![first, second]);

        let updated = store.get_conversation(&conversation.id).await.unwrap();
        assert_eq!(updated.current_token_count, 5);
        assert_eq!(updated.version, conversation.version + 2);
    }

    #[tokio::test]
    async fn test_append_to_missing_conversation_rolls_back() {
        let (store, _tmp) = create_test_store();
        let result = store.append_message(Message::user("ghost", "Hello")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_conversations_for_user() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;
        store
            .create_conversation(&Conversation::new("bob", "gpt-4o-mini", ProviderKind::Hosted, 128_000))
            .await
            .unwrap();
        store
            .append_message(Message::user(&conversation.id, "Hello"))
            .await
            .unwrap();

        let listed = store.list_conversations("alice", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, conversation.id);
        assert_eq!(listed[0].message_count, 1);
        assert_eq!(listed[0].archived_count, 0);
    }

    #[tokio::test]
    async fn test_delete_conversation_cascades() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;
        store
            .append_message(Message::user(&conversation.id, "Hello"))
            .await
            .unwrap();

        store.delete_conversation(&conversation.id).await.unwrap();

        assert!(store.get_conversation(&conversation.id).await.is_err());
        assert!(store.active_messages(&conversation.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_compaction_leaves_no_trace() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;

        let mut old = Vec::new();
        for i in 0..3 {
            old.push(
                store
                    .append_message(Message::user(&conversation.id, format!("Message {}", i)))
                    .await
                    .unwrap(),
            );
        }
        let before = store.active_messages(&conversation.id).await.unwrap();
        let current = store.get_conversation(&conversation.id).await.unwrap();

        let summary = Message::summary(&conversation.id, "- summary", 2, old[1].sequence);
        let mut archives: Vec<MessageArchive> = old[..2]
            .iter()
            .map(|m| MessageArchive::from_message(m, &summary.id, Utc::now()))
            .collect();
        // Duplicate record id makes the second insert fail mid-transaction.
        archives[1].id = archives[0].id.clone();

        let commit = CompactionCommit {
            conversation_id: conversation.id.clone(),
            expected_version: current.version,
            summary,
            archives,
            new_token_count: 1,
        };
        assert!(store.apply_compaction(&commit).await.is_err());

        assert_eq!(store.active_messages(&conversation.id).await.unwrap(), before);
        assert!(store.archived_messages(&conversation.id).await.unwrap().is_empty());
        assert_eq!(store.get_conversation(&conversation.id).await.unwrap(), current);
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;
        let message = store
            .append_message(Message::user(&conversation.id, "Hello"))
            .await
            .unwrap();

        let summary = Message::summary(&conversation.id, "- hello", 1, message.sequence);
        let commit = CompactionCommit {
            conversation_id: conversation.id.clone(),
            // Version before the append
            expected_version: conversation.version,
            archives: vec![MessageArchive::from_message(&message, &summary.id, Utc::now())],
            summary,
            new_token_count: 1,
        };

        let err = store.apply_compaction(&commit).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.active_messages(&conversation.id).await.unwrap(), vec![message]);
    }

    #[tokio::test]
    async fn test_system_messages_cannot_be_archived() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;
        let system = store
            .append_message(Message::system(&conversation.id, "Be brief."))
            .await
            .unwrap();
        let current = store.get_conversation(&conversation.id).await.unwrap();

        let summary = Message::summary(&conversation.id, "- rules", 1, system.sequence);
        let commit = CompactionCommit {
            conversation_id: conversation.id.clone(),
            expected_version: current.version,
            archives: vec![MessageArchive::from_message(&system, &summary.id, Utc::now())],
            summary,
            new_token_count: 1,
        };

        assert!(store.apply_compaction(&commit).await.is_err());
        assert_eq!(store.active_messages(&conversation.id).await.unwrap(), vec![system]);
    }

    #[tokio::test]
    async fn test_restoring_missing_summary_is_conflict() {
        let (store, _tmp) = create_test_store();
        let conversation = create_conversation(&store).await;
        let first = store
            .append_message(Message::user(&conversation.id, "hello"))
            .await
            .unwrap();
        let current = store.get_conversation(&conversation.id).await.unwrap();

        let summary = Message::summary(&conversation.id, "- greeting", 1, first.sequence);
        let archive = MessageArchive::from_message(&first, &summary.id, Utc::now());
        store
            .apply_compaction(&CompactionCommit {
                conversation_id: conversation.id.clone(),
                expected_version: current.version,
                archives: vec![archive.clone()],
                summary: summary.clone(),
                new_token_count: 1,
            })
            .await
            .unwrap();
        let compacted = store.get_conversation(&conversation.id).await.unwrap();

        let commit = RestorationCommit {
            conversation_id: conversation.id.clone(),
            expected_version: compacted.version,
            restored: vec![archive.to_message()],
            archive_ids: vec![archive.id.clone()],
            summary_ids: vec!["already-gone".to_string()],
            new_token_count: 1,
        };

        let err = store.apply_restoration(&commit).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.archived_messages(&conversation.id).await.unwrap().len(), 1);
        assert_eq!(store.active_messages(&conversation.id).await.unwrap(), vec![summary]);
    }
}
