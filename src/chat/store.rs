use std::collections::BTreeMap;
use std::path::PathBuf;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

use super::types::{ChatSummary, ContextBucket, Conversation, DocumentRecord, Message, Sender};

/// SQLite-backed conversation store.
///
/// Message appends and document appends run inside transactions, which
/// stands in for the atomic array-union primitive of a document database:
/// concurrent appenders interleave but never lose rows.
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.db_path.clone()).await
    }

    /// Create with a custom database path (used by tests).
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT 'New Chat',
                active_context TEXT NOT NULL DEFAULT 'miscellaneous',
                superuser_mode INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(chat_id) REFERENCES chats(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                bucket TEXT NOT NULL,
                original_name TEXT NOT NULL,
                blob_key TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(chat_id) REFERENCES chats(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_chat_bucket ON documents(chat_id, bucket)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS global_documents (
                document_id TEXT PRIMARY KEY,
                original_name TEXT NOT NULL,
                blob_key TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                uploaded_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn create_chat(&self, user_id: &str) -> Result<Conversation, ApiError> {
        let chat_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO chats (id, user_id, title, active_context, superuser_mode, created_at, updated_at)
             VALUES (?1, ?2, 'New Chat', ?3, 0, ?4, ?4)",
        )
        .bind(&chat_id)
        .bind(user_id)
        .bind(ContextBucket::DEFAULT)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        self.get_chat(&chat_id, user_id).await
    }

    /// Owner-scoped point read of the full aggregate.
    ///
    /// A missing chat and a chat owned by someone else are indistinguishable
    /// to the caller.
    pub async fn get_chat(&self, chat_id: &str, user_id: &str) -> Result<Conversation, ApiError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, active_context, superuser_mode, created_at, updated_at
             FROM chats WHERE id = ?1 AND user_id = ?2",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::NotFound("Chat not found or not authorized".to_string()))?;

        let messages = sqlx::query(
            "SELECT sender, text, created_at FROM messages WHERE chat_id = ?1 ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?
        .iter()
        .map(|m| Message {
            sender: m.get("sender"),
            text: m.get("text"),
            created_at: m.get("created_at"),
        })
        .collect();

        let doc_rows = sqlx::query(
            "SELECT bucket, document_id, original_name, blob_key, chunk_count, created_at
             FROM documents WHERE chat_id = ?1 ORDER BY created_at ASC, document_id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut buckets: BTreeMap<String, Vec<DocumentRecord>> = BTreeMap::new();
        for doc in &doc_rows {
            buckets
                .entry(doc.get("bucket"))
                .or_default()
                .push(DocumentRecord {
                    document_id: doc.get("document_id"),
                    original_name: doc.get("original_name"),
                    blob_key: doc.get("blob_key"),
                    chunk_count: doc.get("chunk_count"),
                    uploaded_by: None,
                    created_at: doc.get("created_at"),
                });
        }

        Ok(Conversation {
            id: row.get("id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            superuser_mode: row.get::<i64, _>("superuser_mode") != 0,
            active_context: row.get("active_context"),
            messages,
            buckets,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    pub async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, title, updated_at FROM chats
             WHERE user_id = ?1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| ChatSummary {
                id: row.get("id"),
                title: row.get("title"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    pub async fn rename_chat(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest(
                "A non-empty title is required".to_string(),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE chats SET title = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
        )
        .bind(title)
        .bind(&now)
        .bind(chat_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(
                "Chat not found or not authorized".to_string(),
            ));
        }
        self.get_chat(chat_id, user_id).await
    }

    pub async fn delete_chat(&self, chat_id: &str, user_id: &str) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?1 AND user_id = ?2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(
                "Chat not found or not authorized".to_string(),
            ));
        }
        Ok(())
    }

    /// Append messages and touch `updated_at` in one transaction.
    pub async fn append_messages(
        &self,
        chat_id: &str,
        entries: &[(Sender, String)],
    ) -> Result<(), ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (sender, text) in entries {
            sqlx::query(
                "INSERT INTO messages (chat_id, sender, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(chat_id)
            .bind(sender.as_str())
            .bind(text)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        sqlx::query("UPDATE chats SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Flip the elevated-mode flag and record the acknowledgement notice.
    pub async fn set_superuser_mode(
        &self,
        chat_id: &str,
        enabled: bool,
        ack: &str,
    ) -> Result<(), ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("UPDATE chats SET superuser_mode = ?1 WHERE id = ?2")
            .bind(enabled as i64)
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO messages (chat_id, sender, text, created_at) VALUES (?1, 'bot', ?2, ?3)",
        )
        .bind(chat_id)
        .bind(ack)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Point retrieval at a bucket. Ingestion calls this when it targets a
    /// bucket, so the most recently used context is the one searched.
    pub async fn set_active_context(
        &self,
        chat_id: &str,
        bucket: &ContextBucket,
    ) -> Result<(), ApiError> {
        sqlx::query("UPDATE chats SET active_context = ?1 WHERE id = ?2")
            .bind(bucket.as_str())
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn add_document(
        &self,
        chat_id: &str,
        bucket: &ContextBucket,
        record: &DocumentRecord,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO documents (document_id, chat_id, bucket, original_name, blob_key, chunk_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.document_id)
        .bind(chat_id)
        .bind(bucket.as_str())
        .bind(&record.original_name)
        .bind(&record.blob_key)
        .bind(record.chunk_count)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn add_global_document(&self, record: &DocumentRecord) -> Result<(), ApiError> {
        let uploaded_by = record.uploaded_by.as_deref().ok_or_else(|| {
            ApiError::Internal("global documents must carry an uploader".to_string())
        })?;

        sqlx::query(
            "INSERT INTO global_documents (document_id, original_name, blob_key, chunk_count, uploaded_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.document_id)
        .bind(&record.original_name)
        .bind(&record.blob_key)
        .bind(record.chunk_count)
        .bind(uploaded_by)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn document_ids_in_bucket(
        &self,
        chat_id: &str,
        bucket: &str,
    ) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query(
            "SELECT document_id FROM documents
             WHERE chat_id = ?1 AND bucket = ?2 ORDER BY created_at ASC, document_id ASC",
        )
        .bind(chat_id)
        .bind(bucket)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(|row| row.get("document_id")).collect())
    }

    pub async fn global_document_ids(&self) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query(
            "SELECT document_id FROM global_documents ORDER BY created_at ASC, document_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(|row| row.get("document_id")).collect())
    }
}
