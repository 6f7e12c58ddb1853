use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::chat::ContextBucket;
use crate::core::errors::ApiError;
use crate::ingest::UploadedFile;
use crate::llm::ChatTurn;
use crate::state::AppState;

/// The authentication layer in front of this service resolves the caller
/// and forwards their id; everything past this point trusts the header.
fn require_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::Unauthorized)
}

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let chat = state.chats.create_chat(&user_id).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let chats = state.chats.list_chats(&user_id).await?;
    Ok(Json(chats))
}

pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let chat = state.chats.get_chat(&chat_id, &user_id).await?;
    Ok(Json(chat))
}

pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    state.chats.delete_chat(&chat_id, &user_id).await?;
    Ok(Json(json!({ "message": "Chat deleted successfully" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameChatRequest {
    pub new_title: String,
}

pub async fn rename_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    Json(payload): Json<RenameChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let chat = state
        .chats
        .rename_chat(&chat_id, &user_id, &payload.new_title)
        .await?;
    Ok(Json(chat))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub chat_id: String,
    pub conversation_history: Vec<ChatTurn>,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let conversation = state
        .orchestrator
        .respond(&user_id, &payload.chat_id, payload.conversation_history)
        .await?;
    Ok(Json(json!({ "updatedChat": conversation })))
}

pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;

    let mut chat_id: Option<String> = None;
    let mut bucket_name: Option<String> = None;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("chatId") => {
                chat_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            Some("documentType") => {
                bucket_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            _ => {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?
                    .to_vec();
                files.push(UploadedFile {
                    name: file_name,
                    content_type,
                    bytes,
                });
            }
        }
    }

    let chat_id =
        chat_id.ok_or_else(|| ApiError::BadRequest("chatId field is required".to_string()))?;
    let bucket = match bucket_name {
        Some(name) => ContextBucket::parse(&name)?,
        None => ContextBucket::miscellaneous(),
    };

    let report = state
        .pipeline
        .ingest(&user_id, &chat_id, &bucket, files)
        .await?;

    Ok(Json(json!({
        "updatedChat": report.conversation,
        "files": report.files,
    })))
}
