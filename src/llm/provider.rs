use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// One turn of conversation history as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        ChatTurn {
            role: "user".to_string(),
            text: text.into(),
        }
    }
}

/// One content part of a single-shot generation request.
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    /// Raw binary with a declared MIME type, sent inline.
    Inline { mime_type: String, data: Vec<u8> },
}

#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Multi-turn reply: a session seeded with `history`, then `message`
    /// sent as the new turn. `Ok(None)` means the model produced no text
    /// part; transport and provider failures are `Err`.
    async fn reply(
        &self,
        history: &[ChatTurn],
        message: &ChatTurn,
    ) -> Result<Option<String>, ApiError>;

    /// Single-shot generation with no history, used for file transcription
    /// and image description.
    async fn generate(&self, parts: &[Part]) -> Result<String, ApiError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text fragment into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;
}
