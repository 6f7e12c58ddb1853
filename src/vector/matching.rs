//! Remote nearest-neighbor backend.
//!
//! The matching service stores only (id, vector, document restrict) and
//! answers queries with neighbor ids. Chunk text therefore lives in a
//! local side table written at upsert time, and every query resolves the
//! returned ids through that table before handing text to the caller.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

use super::index::{VectorEntry, VectorIndex};

pub struct MatchingVectorIndex {
    client: Client,
    endpoint: String,
    index_id: String,
    texts: SqlitePool,
}

impl MatchingVectorIndex {
    pub async fn new(endpoint: &str, index_id: &str, paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(endpoint, index_id, paths.vector_db_path.clone()).await
    }

    pub async fn with_path(
        endpoint: &str,
        index_id: &str,
        db_path: PathBuf,
    ) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let texts = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunk_texts (
                vector_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_text TEXT NOT NULL
            )",
        )
        .execute(&texts)
        .await
        .map_err(ApiError::internal)?;

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_id: index_id.to_string(),
            texts,
        })
    }

    async fn store_chunk_texts(&self, entries: &[VectorEntry]) -> Result<(), ApiError> {
        let mut tx = self.texts.begin().await.map_err(ApiError::internal)?;
        for entry in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO chunk_texts (vector_id, document_id, chunk_text)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(&entry.vector_id)
            .bind(&entry.document_id)
            .bind(&entry.chunk_text)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Resolve neighbor ids to chunk text, preserving the ranking order.
    /// Ids with no stored text (stale neighbors) are dropped.
    async fn resolve_chunk_texts(&self, ids: &[String]) -> Result<Vec<String>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT vector_id, chunk_text FROM chunk_texts WHERE vector_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.texts)
            .await
            .map_err(ApiError::internal)?;

        let by_id: HashMap<String, String> = rows
            .iter()
            .map(|row| (row.get("vector_id"), row.get("chunk_text")))
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl VectorIndex for MatchingVectorIndex {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError> {
        if entries.is_empty() {
            return Ok(());
        }

        // Text first: a stale text row is harmless, a neighbor id without
        // text would be dropped at query time.
        self.store_chunk_texts(&entries).await?;

        let datapoints: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.vector_id,
                    "vector": entry.embedding,
                    "restricts": [{
                        "namespace": "document_id",
                        "allow": [entry.document_id],
                    }],
                })
            })
            .collect();

        let url = format!("{}/v1/indexes/{}:upsert", self.endpoint, self.index_id);
        let res = self
            .client
            .post(&url)
            .json(&json!({ "datapoints": datapoints }))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "vector upsert failed with {}: {}",
                status, text
            )));
        }

        tracing::debug!("upserted {} datapoints to matching index", entries.len());
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

        let url = format!(
            "{}/v1/indexes/{}:findNeighbors",
            self.endpoint, self.index_id
        );
        let res = self
            .client
            .post(&url)
            .json(&json!({
                "queries": [{
                    "vector": embedding,
                    "top_k": top_k,
                    "restricts": [{
                        "namespace": "document_id",
                        "allow": allowed_document_ids,
                    }],
                }]
            }))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "vector query failed with {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let ids: Vec<String> = payload["neighbors"]
            .as_array()
            .map(|neighbors| {
                neighbors
                    .iter()
                    .filter_map(|n| n["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        self.resolve_chunk_texts(&ids).await
    }
}
