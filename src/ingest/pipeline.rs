use std::sync::Arc;

use serde::Serialize;

use crate::blob::BlobStore;
use crate::chat::{ChatStore, ContextBucket, Conversation, DocumentRecord, Sender};
use crate::core::errors::ApiError;
use crate::extract::extract_text;
use crate::llm::{EmbeddingProvider, GenerativeProvider};
use crate::vector::{VectorEntry, VectorIndex};

use super::chunker::chunk_text;

/// One file as received from the upload surface.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Per-file outcome of an ingestion batch. A failed file never hides the
/// files that succeeded before or after it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub file: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn processed(file: String, record: &DocumentRecord) -> Self {
        FileReport {
            file,
            status: "processed",
            document_id: Some(record.document_id.clone()),
            chunk_count: Some(record.chunk_count),
            error: None,
        }
    }

    fn failed(file: String, err: &ApiError) -> Self {
        FileReport {
            file,
            status: "failed",
            document_id: None,
            chunk_count: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub conversation: Conversation,
    pub files: Vec<FileReport>,
}

/// Drives the per-file ingestion steps: persist raw bytes, extract text,
/// chunk, embed, upsert vectors, record metadata, acknowledge.
///
/// Files are processed strictly in sequence. Each file is its own unit:
/// committed side effects of earlier files survive a later file's failure.
pub struct IngestionPipeline {
    chats: ChatStore,
    blobs: Arc<dyn BlobStore>,
    vectors: Arc<dyn VectorIndex>,
    llm: Arc<dyn GenerativeProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl IngestionPipeline {
    pub fn new(
        chats: ChatStore,
        blobs: Arc<dyn BlobStore>,
        vectors: Arc<dyn VectorIndex>,
        llm: Arc<dyn GenerativeProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            chats,
            blobs,
            vectors,
            llm,
            embedder,
            chunk_size,
            chunk_overlap,
        }
    }

    pub async fn ingest(
        &self,
        user_id: &str,
        chat_id: &str,
        bucket: &ContextBucket,
        files: Vec<UploadedFile>,
    ) -> Result<IngestionReport, ApiError> {
        if files.is_empty() {
            return Err(ApiError::BadRequest("No files were uploaded".to_string()));
        }

        let chat = self.chats.get_chat(chat_id, user_id).await?;
        let elevated = chat.superuser_mode;

        // Elevated uploads go to the global pool and leave the private
        // context untouched; otherwise the target bucket becomes the one
        // retrieval searches.
        if !elevated && chat.active_context != bucket.as_str() {
            self.chats.set_active_context(chat_id, bucket).await?;
        }

        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            let name = file.name.clone();
            match self.ingest_one(user_id, chat_id, bucket, elevated, file).await {
                Ok(record) => {
                    tracing::info!(
                        "ingested \"{}\" as {} ({} chunks)",
                        name,
                        record.document_id,
                        record.chunk_count
                    );
                    reports.push(FileReport::processed(name, &record));
                }
                Err(err) => {
                    tracing::warn!("ingestion of \"{}\" failed: {}", name, err);
                    reports.push(FileReport::failed(name, &err));
                }
            }
        }

        let conversation = self.chats.get_chat(chat_id, user_id).await?;
        Ok(IngestionReport {
            conversation,
            files: reports,
        })
    }

    async fn ingest_one(
        &self,
        user_id: &str,
        chat_id: &str,
        bucket: &ContextBucket,
        elevated: bool,
        file: UploadedFile,
    ) -> Result<DocumentRecord, ApiError> {
        let stamp = chrono::Utc::now().timestamp_millis();

        let blob_key = format!("{}/{}/{}-{}", user_id, chat_id, stamp, file.name);
        self.blobs.put(&blob_key, &file.bytes).await?;

        let text =
            extract_text(self.llm.as_ref(), &file.bytes, &file.content_type, &file.name).await?;
        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap)?;

        let document_id = format!("doc_{}_{}", chat_id, stamp);
        let mut entries = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let embedding = self.embedder.embed(chunk).await?;
            entries.push(VectorEntry {
                vector_id: VectorEntry::id_for(&document_id, i),
                document_id: document_id.clone(),
                chunk_text: chunk.clone(),
                embedding,
            });
        }
        self.vectors.upsert(entries).await?;

        let record = DocumentRecord {
            document_id,
            original_name: file.name.clone(),
            blob_key,
            chunk_count: chunks.len() as i64,
            uploaded_by: elevated.then(|| user_id.to_string()),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        if elevated {
            self.chats.add_global_document(&record).await?;
        } else {
            self.chats.add_document(chat_id, bucket, &record).await?;
        }

        self.chats
            .append_messages(
                chat_id,
                &[(
                    Sender::Bot,
                    format!(
                        "File \"{}\" processed and added to '{}'.",
                        file.name, bucket
                    ),
                )],
            )
            .await?;

        Ok(record)
    }
}
