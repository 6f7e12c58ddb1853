//! SQLite-backed vector index.
//!
//! Chunk text travels with the embedding as inline metadata, so a query
//! needs no secondary lookup. Similarity is brute-force cosine over the
//! allow-listed candidates.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

use super::index::{VectorEntry, VectorIndex};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.vector_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_entries (
                vector_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_document ON vector_entries(document_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Total entry count, used by tests to check upsert idempotence.
    pub async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for entry in &entries {
            let blob = Self::serialize_embedding(&entry.embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO vector_entries (vector_id, document_id, chunk_text, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&entry.vector_id)
            .bind(&entry.document_id)
            .bind(&entry.chunk_text)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::debug!("upserted {} vector entries", entries.len());
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        allowed_document_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, ApiError> {
        if allowed_document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; allowed_document_ids.len()].join(", ");
        let sql = format!(
            "SELECT chunk_text, embedding FROM vector_entries WHERE document_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in allowed_document_ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut scored: Vec<(f32, String)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&blob);
                (
                    Self::cosine_similarity(embedding, &stored),
                    row.get("chunk_text"),
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, text)| text).collect())
    }
}
