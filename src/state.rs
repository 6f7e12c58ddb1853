use std::sync::Arc;

use crate::blob::{BlobStore, FsBlobStore};
use crate::chat::ChatStore;
use crate::core::config::{AppPaths, Settings, VectorBackend};
use crate::core::errors::ApiError;
use crate::ingest::IngestionPipeline;
use crate::llm::{EmbeddingProvider, GeminiProvider, GenerativeProvider};
use crate::rag::RagOrchestrator;
use crate::vector::{MatchingVectorIndex, SqliteVectorIndex, VectorIndex};

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub chats: ChatStore,
    pub pipeline: IngestionPipeline,
    pub orchestrator: RagOrchestrator,
}

impl AppState {
    pub async fn initialize(settings: Settings, paths: AppPaths) -> Result<Arc<Self>, ApiError> {
        let paths = Arc::new(paths);
        let chats = ChatStore::new(&paths).await?;
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&paths));

        let vectors: Arc<dyn VectorIndex> = match &settings.vector_backend {
            VectorBackend::Sqlite => Arc::new(SqliteVectorIndex::new(&paths).await?),
            VectorBackend::Matching { endpoint, index_id } => {
                Arc::new(MatchingVectorIndex::new(endpoint, index_id, &paths).await?)
            }
        };

        let gemini = Arc::new(GeminiProvider::new(&settings));
        let llm: Arc<dyn GenerativeProvider> = gemini.clone();
        let embedder: Arc<dyn EmbeddingProvider> = gemini;

        let pipeline = IngestionPipeline::new(
            chats.clone(),
            blobs,
            vectors.clone(),
            llm.clone(),
            embedder.clone(),
            settings.chunk_size,
            settings.chunk_overlap,
        );
        let orchestrator = RagOrchestrator::new(
            chats.clone(),
            vectors,
            llm,
            embedder,
            settings.retrieval_top_k,
            settings.superuser_secret.clone(),
        );

        Ok(Arc::new(AppState {
            paths,
            settings,
            chats,
            pipeline,
            orchestrator,
        }))
    }
}
