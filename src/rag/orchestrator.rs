use std::collections::HashSet;
use std::sync::Arc;

use crate::chat::{ChatStore, Conversation, Sender};
use crate::core::errors::ApiError;
use crate::llm::{ChatTurn, EmbeddingProvider, GenerativeProvider};
use crate::vector::VectorIndex;

use super::prompt::context_prompt;

/// Answer used when the model response carries no text part.
pub const FALLBACK_REPLY: &str = "unable to generate a response";

/// Spoken while elevated, this word drops back to normal mode.
const EXIT_KEYWORD: &str = "exit";

/// Per-message decision chain.
///
/// Evaluated strictly in order: load, sentinel interception, scope
/// resolution, retrieval, generation, persistence. Retrieval-path errors
/// degrade to "no context"; generation and persistence errors are fatal
/// to the turn.
pub struct RagOrchestrator {
    chats: ChatStore,
    vectors: Arc<dyn VectorIndex>,
    llm: Arc<dyn GenerativeProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    superuser_secret: Option<String>,
}

impl RagOrchestrator {
    pub fn new(
        chats: ChatStore,
        vectors: Arc<dyn VectorIndex>,
        llm: Arc<dyn GenerativeProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        superuser_secret: Option<String>,
    ) -> Self {
        Self {
            chats,
            vectors,
            llm,
            embedder,
            top_k,
            superuser_secret,
        }
    }

    /// Handle one incoming message. `history` is the full turn sequence;
    /// its last entry is the new user utterance.
    pub async fn respond(
        &self,
        user_id: &str,
        chat_id: &str,
        history: Vec<ChatTurn>,
    ) -> Result<Conversation, ApiError> {
        let user_query = match history.last() {
            Some(turn) => turn.text.clone(),
            None => {
                return Err(ApiError::BadRequest(
                    "Conversation history must not be empty".to_string(),
                ))
            }
        };

        let chat = self.chats.get_chat(chat_id, user_id).await?;

        // Sentinel interception comes before any retrieval or generation.
        // The guards require the opposite state, so repeating a sentinel
        // falls through to normal handling.
        if let Some(secret) = &self.superuser_secret {
            if user_query == *secret && !chat.superuser_mode {
                self.chats
                    .set_superuser_mode(chat_id, true, "Superuser mode ENABLED.")
                    .await?;
                return self.chats.get_chat(chat_id, user_id).await;
            }
        }
        if user_query == EXIT_KEYWORD && chat.superuser_mode {
            self.chats
                .set_superuser_mode(chat_id, false, "Superuser mode DISABLED.")
                .await?;
            return self.chats.get_chat(chat_id, user_id).await;
        }

        let scope = self.resolve_scope(&chat).await?;

        let mut outgoing = history;
        if !scope.is_empty() {
            let query_embedding = self.embedder.embed(&user_query).await?;

            let chunks = match self
                .vectors
                .query(&query_embedding, &scope, self.top_k)
                .await
            {
                Ok(chunks) => chunks,
                Err(err) => {
                    tracing::warn!("vector query failed, answering without context: {}", err);
                    Vec::new()
                }
            };

            if !chunks.is_empty() {
                tracing::info!("retrieved {} context chunks", chunks.len());
                if let Some(turn) = outgoing.last_mut() {
                    turn.text = context_prompt(&chunks, &user_query);
                }
            }
        }

        let (seed, message) = outgoing.split_at(outgoing.len() - 1);
        let answer = self
            .llm
            .reply(seed, &message[0])
            .await?
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());

        // The stored user message is always the bare question, never the
        // context-augmented prompt.
        self.chats
            .append_messages(
                chat_id,
                &[(Sender::User, user_query), (Sender::Ai, answer)],
            )
            .await?;

        self.chats.get_chat(chat_id, user_id).await
    }

    /// Document ids visible to this turn: the active bucket plus the whole
    /// global pool, deduplicated in first-seen order.
    async fn resolve_scope(&self, chat: &Conversation) -> Result<Vec<String>, ApiError> {
        let mut ids = self
            .chats
            .document_ids_in_bucket(&chat.id, &chat.active_context)
            .await?;
        ids.extend(self.chats.global_document_ids().await?);

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));
        Ok(ids)
    }
}
