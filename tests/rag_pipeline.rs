//! End-to-end tests for ingestion and chat turns, with the model and
//! embedding providers mocked at the trait seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dossier_backend::blob::FsBlobStore;
use dossier_backend::chat::{ChatStore, ContextBucket, Conversation};
use dossier_backend::core::errors::ApiError;
use dossier_backend::ingest::{IngestionPipeline, UploadedFile};
use dossier_backend::llm::{ChatTurn, EmbeddingProvider, GenerativeProvider, Part};
use dossier_backend::rag::{RagOrchestrator, FALLBACK_REPLY};
use dossier_backend::vector::{SqliteVectorIndex, VectorEntry, VectorIndex};

const SECRET: &str = "sesame-open-now";

/// Generative provider that counts calls and records the outgoing message.
struct RecordingModel {
    reply: Option<String>,
    calls: AtomicUsize,
    last_message: Mutex<Option<String>>,
}

impl RecordingModel {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_message: Mutex::new(None),
        })
    }

    fn without_text() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_message: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_message(&self) -> Option<String> {
        self.last_message.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeProvider for RecordingModel {
    async fn reply(
        &self,
        _history: &[ChatTurn],
        message: &ChatTurn,
    ) -> Result<Option<String>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_message.lock().unwrap() = Some(message.text.clone());
        Ok(self.reply.clone())
    }

    async fn generate(&self, _parts: &[Part]) -> Result<String, ApiError> {
        Ok("generated text".to_string())
    }
}

/// Deterministic embedder: same text, same unit vector.
struct StubEmbedder {
    calls: AtomicUsize,
}

impl StubEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; 8];
        for (i, b) in text.bytes().enumerate() {
            v[i % 8] += f32::from(b) / 255.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

/// Embedder that always fails, for the per-file abort path.
struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ApiError> {
        Err(ApiError::EmbeddingUnavailable(
            "provider returned no predictions".to_string(),
        ))
    }
}

/// Wraps the real index to count queries.
struct CountingIndex {
    inner: SqliteVectorIndex,
    queries: AtomicUsize,
}

impl CountingIndex {
    async fn new() -> Arc<Self> {
        let tmp = std::env::temp_dir().join(format!(
            "dossier-e2e-vectors-{}.db",
            uuid_like()
        ));
        Arc::new(Self {
            inner: SqliteVectorIndex::with_path(tmp).await.unwrap(),
            queries: AtomicUsize::new(0),
        })
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn count(&self) -> usize {
        self.inner.count().await.unwrap()
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), ApiError> {
        self.inner.upsert(entries).await
    }

    async fn query(
        &self,
        embedding: &[f32],
        allowed_document_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<String>, ApiError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(embedding, allowed_document_ids, top_k).await
    }
}

/// Index whose queries always error, for the degrade path.
struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    async fn upsert(&self, _entries: Vec<VectorEntry>) -> Result<(), ApiError> {
        Ok(())
    }

    async fn query(
        &self,
        _embedding: &[f32],
        _allowed_document_ids: &[String],
        _top_k: usize,
    ) -> Result<Vec<String>, ApiError> {
        Err(ApiError::Internal("vector backend unreachable".to_string()))
    }
}

fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{:?}", nanos, std::thread::current().id())
}

struct Harness {
    chats: ChatStore,
    index: Arc<CountingIndex>,
    model: Arc<RecordingModel>,
    embedder: Arc<StubEmbedder>,
    pipeline: IngestionPipeline,
    orchestrator: RagOrchestrator,
    _blob_dir: tempfile::TempDir,
}

async fn harness_with(model: Arc<RecordingModel>) -> Harness {
    let db = std::env::temp_dir().join(format!("dossier-e2e-chats-{}.db", uuid_like()));
    let chats = ChatStore::with_path(db).await.unwrap();

    let blob_dir = tempfile::tempdir().unwrap();
    let blobs = Arc::new(FsBlobStore::at(blob_dir.path().to_path_buf()));

    let index = CountingIndex::new().await;
    let embedder = StubEmbedder::new();

    let pipeline = IngestionPipeline::new(
        chats.clone(),
        blobs,
        index.clone(),
        model.clone(),
        embedder.clone(),
        1000,
        200,
    );
    let orchestrator = RagOrchestrator::new(
        chats.clone(),
        index.clone(),
        model.clone(),
        embedder.clone(),
        5,
        Some(SECRET.to_string()),
    );

    Harness {
        chats,
        index,
        model,
        embedder,
        pipeline,
        orchestrator,
        _blob_dir: blob_dir,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingModel::replying("Here is my answer.")).await
}

fn text_file(name: &str, content: &str) -> UploadedFile {
    UploadedFile {
        name: name.to_string(),
        content_type: "text/plain".to_string(),
        bytes: content.as_bytes().to_vec(),
    }
}

fn unique_text(len: usize) -> String {
    (0..len)
        .map(|i| char::from_u32('a' as u32 + (i % 26) as u32).unwrap())
        .collect()
}

async fn create_chat(h: &Harness) -> Conversation {
    h.chats.create_chat("u1").await.unwrap()
}

// Scenario A: a 1500-character text file with chunk size 1000 and overlap
// 200 produces two chunks, two embeddings, two vector entries, one record
// in the default bucket and one acknowledgement message.
#[tokio::test]
async fn ingesting_a_text_file_chunks_embeds_and_records() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    let report = h
        .pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![text_file("notes.txt", &unique_text(1500))],
        )
        .await
        .unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].status, "processed");
    assert_eq!(report.files[0].chunk_count, Some(2));

    assert_eq!(h.embedder.calls(), 2);
    assert_eq!(h.index.count().await, 2);

    let docs = report.conversation.buckets.get("miscellaneous").unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].original_name, "notes.txt");
    assert_eq!(docs[0].chunk_count, 2);

    let last = report.conversation.messages.last().unwrap();
    assert_eq!(last.sender, "bot");
    assert_eq!(
        last.text,
        "File \"notes.txt\" processed and added to 'miscellaneous'."
    );
}

// Scenario B: with nothing in scope, a turn skips retrieval entirely and
// sends the utterance unmodified.
#[tokio::test]
async fn empty_scope_skips_retrieval() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user("Hello")])
        .await
        .unwrap();

    assert_eq!(h.embedder.calls(), 0);
    assert_eq!(h.index.queries(), 0);
    assert_eq!(h.model.calls(), 1);
    assert_eq!(h.model.last_message().unwrap(), "Hello");

    let senders: Vec<&str> = updated.messages.iter().map(|m| m.sender.as_str()).collect();
    assert_eq!(senders, vec!["user", "ai"]);
    assert_eq!(updated.messages[0].text, "Hello");
    assert_eq!(updated.messages[1].text, "Here is my answer.");
}

// Scenario C: retrieval rewrites the outgoing prompt but the stored user
// message keeps the bare question.
#[tokio::test]
async fn retrieval_augments_the_outgoing_prompt_only() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    h.pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![text_file(
                "warranty.txt",
                "The warranty period is 24 months.",
            )],
        )
        .await
        .unwrap();

    let question = "What is the warranty period?";
    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user(question)])
        .await
        .unwrap();

    let sent = h.model.last_message().unwrap();
    assert!(sent.contains("--- CONTEXT START ---"));
    assert!(sent.contains("The warranty period is 24 months."));
    assert!(sent.ends_with(&format!("Question: {}", question)));

    // Bare question stored, augmented prompt not persisted.
    let user_messages: Vec<&str> = updated
        .messages
        .iter()
        .filter(|m| m.sender == "user")
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(user_messages, vec![question]);
}

#[tokio::test]
async fn superuser_sentinel_toggles_without_generation() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    // Off -> on: acknowledged, no model call, sentinel not stored as a
    // user message.
    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user(SECRET)])
        .await
        .unwrap();
    assert!(updated.superuser_mode);
    assert_eq!(h.model.calls(), 0);
    assert_eq!(updated.messages.len(), 1);
    assert_eq!(updated.messages[0].sender, "bot");
    assert_eq!(updated.messages[0].text, "Superuser mode ENABLED.");

    // On -> off via the exit keyword.
    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user("exit")])
        .await
        .unwrap();
    assert!(!updated.superuser_mode);
    assert_eq!(h.model.calls(), 0);
    assert_eq!(updated.messages.last().unwrap().text, "Superuser mode DISABLED.");
}

#[tokio::test]
async fn sentinels_in_the_wrong_state_fall_through_to_generation() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    // "exit" while the mode is off is just a normal question.
    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user("exit")])
        .await
        .unwrap();
    assert!(!updated.superuser_mode);
    assert_eq!(h.model.calls(), 1);
    assert_eq!(updated.messages[0].text, "exit");

    // The secret while already elevated also falls through.
    h.chats
        .set_superuser_mode(&chat.id, true, "Superuser mode ENABLED.")
        .await
        .unwrap();
    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user(SECRET)])
        .await
        .unwrap();
    assert!(updated.superuser_mode);
    assert_eq!(h.model.calls(), 2);
}

#[tokio::test]
async fn vector_backend_errors_degrade_to_no_context() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    // One document in scope so retrieval actually runs.
    h.pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![text_file("doc.txt", "some indexed content")],
        )
        .await
        .unwrap();

    let orchestrator = RagOrchestrator::new(
        h.chats.clone(),
        Arc::new(BrokenIndex),
        h.model.clone(),
        h.embedder.clone(),
        5,
        None,
    );

    let updated = orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user("What is indexed?")])
        .await
        .unwrap();

    // The turn still succeeded, with the unmodified question.
    assert_eq!(h.model.last_message().unwrap(), "What is indexed?");
    assert_eq!(updated.messages.last().unwrap().sender, "ai");
}

#[tokio::test]
async fn a_failing_file_does_not_abort_its_siblings() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    let report = h
        .pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![
                text_file("good.txt", "readable content"),
                UploadedFile {
                    name: "archive.zip".to_string(),
                    content_type: "application/zip".to_string(),
                    bytes: vec![0x50, 0x4b],
                },
                text_file("also-good.txt", "more readable content"),
            ],
        )
        .await
        .unwrap();

    let statuses: Vec<&str> = report.files.iter().map(|f| f.status).collect();
    assert_eq!(statuses, vec!["processed", "failed", "processed"]);
    assert!(report.files[1].error.as_deref().unwrap().contains(".zip"));

    let docs = report.conversation.buckets.get("miscellaneous").unwrap();
    assert_eq!(docs.len(), 2);
}

#[tokio::test]
async fn embedding_outage_fails_only_that_file() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    let pipeline = IngestionPipeline::new(
        h.chats.clone(),
        Arc::new(FsBlobStore::at(h._blob_dir.path().to_path_buf())),
        h.index.clone(),
        h.model.clone(),
        Arc::new(DownEmbedder),
        1000,
        200,
    );

    let report = pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![text_file("doc.txt", "content")],
        )
        .await
        .unwrap();

    assert_eq!(report.files[0].status, "failed");
    assert_eq!(h.index.count().await, 0);
    assert!(report.conversation.buckets.is_empty());
}

#[tokio::test]
async fn elevated_mode_routes_documents_to_the_global_pool() {
    let h = harness().await;
    let chat = create_chat(&h).await;
    h.chats
        .set_superuser_mode(&chat.id, true, "Superuser mode ENABLED.")
        .await
        .unwrap();

    let report = h
        .pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![text_file("shared.txt", "globally visible content")],
        )
        .await
        .unwrap();

    assert_eq!(report.files[0].status, "processed");
    // Private bucket untouched, global pool populated.
    assert!(report.conversation.buckets.is_empty());
    let global = h.chats.global_document_ids().await.unwrap();
    assert_eq!(global.len(), 1);

    // Global documents are in scope for a fresh conversation with no
    // documents of its own.
    let other = h.chats.create_chat("u1").await.unwrap();
    h.orchestrator
        .respond("u1", &other.id, vec![ChatTurn::user("What is visible?")])
        .await
        .unwrap();
    assert!(h.index.queries() > 0);
    let sent = h.model.last_message().unwrap();
    assert!(sent.contains("globally visible content"));
}

#[tokio::test]
async fn ingestion_target_becomes_the_active_context() {
    let h = harness().await;
    let chat = create_chat(&h).await;

    let contracts = ContextBucket::parse("contracts").unwrap();
    h.pipeline
        .ingest(
            "u1",
            &chat.id,
            &contracts,
            vec![text_file("terms.txt", "the contract terms say net-30")],
        )
        .await
        .unwrap();

    let report = h
        .pipeline
        .ingest(
            "u1",
            &chat.id,
            &ContextBucket::miscellaneous(),
            vec![text_file("notes.txt", "the meeting notes say hello")],
        )
        .await
        .unwrap();
    assert_eq!(report.conversation.active_context, "miscellaneous");

    // Retrieval scopes to the active bucket only; the contracts document
    // is out of scope now.
    h.orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user("What do the notes say?")])
        .await
        .unwrap();

    let sent = h.model.last_message().unwrap();
    assert!(sent.contains("the meeting notes say hello"));
    assert!(!sent.contains("net-30"));
}

#[tokio::test]
async fn a_model_response_without_text_uses_the_fallback_reply() {
    let h = harness_with(RecordingModel::without_text()).await;
    let chat = create_chat(&h).await;

    let updated = h
        .orchestrator
        .respond("u1", &chat.id, vec![ChatTurn::user("Hello")])
        .await
        .unwrap();

    assert_eq!(updated.messages.last().unwrap().text, FALLBACK_REPLY);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let h = harness().await;
    let err = h
        .orchestrator
        .respond("u1", "missing-chat", vec![ChatTurn::user("Hello")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
