use async_trait::async_trait;

use crate::core::errors::ApiError;

/// One embedded chunk as stored in the index.
///
/// `vector_id` is derived from (document id, chunk index), so re-ingesting
/// the same logical chunk overwrites instead of duplicating.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub vector_id: String,
    pub document_id: String,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// Deterministic id for chunk `index` of `document_id`.
    pub fn id_for(document_id: &str, index: usize) -> String {
        format!("{}:{}", document_id, index)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent batch upsert keyed by `vector_id`. An empty batch is a
    /// no-op; a backend failure fails the whole batch.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError>;

    /// Up to `top_k` chunk texts ranked by similarity, restricted to
    /// entries whose document id is in `allowed_document_ids`. An empty
    /// allow-list returns an empty result without touching the backend.
    async fn query(
        &self,
        embedding: &[f32],
        allowed_document_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, ApiError>;
}
