use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
    /// System notices (ingestion acknowledgements, mode toggles).
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
            Sender::Bot => "bot",
        }
    }
}

/// One entry in a conversation's append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub text: String,
    pub created_at: String,
}

/// Metadata for one ingested file.
///
/// The link to the vector index is by `document_id` only and is eventually
/// consistent; store and index are written in separate steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub document_id: String,
    pub original_name: String,
    pub blob_key: String,
    pub chunk_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    pub created_at: String,
}

/// Full conversation aggregate as returned to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub superuser_mode: bool,
    pub active_context: String,
    pub messages: Vec<Message>,
    pub buckets: BTreeMap<String, Vec<DocumentRecord>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub updated_at: String,
}

/// Validated name of a document context bucket.
///
/// Callers may introduce new buckets, but only from this restricted
/// alphabet; arbitrary field names never reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBucket(String);

impl ContextBucket {
    pub const DEFAULT: &'static str = "miscellaneous";

    pub fn miscellaneous() -> Self {
        ContextBucket(Self::DEFAULT.to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let name = raw.trim().to_ascii_lowercase();
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(ApiError::Configuration(format!(
                "invalid context bucket name: {:?}",
                raw
            )));
        }
        Ok(ContextBucket(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
