use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// Stable category string exposed on the wire; the full message of a
    /// server-side failure is logged, not returned.
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::UnsupportedFormat(_) => "unsupported_format",
            ApiError::ExtractionFailed(_) => "extraction_failed",
            ApiError::EmbeddingUnavailable(_) => "embedding_unavailable",
            ApiError::GenerationFailed(_) => "generation_failed",
            ApiError::StorageWriteFailed(_) => "storage_write_failed",
            ApiError::Configuration(_) => "configuration_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::UnsupportedFormat(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone()),
            ApiError::ExtractionFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::Configuration(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::EmbeddingUnavailable(msg)
            | ApiError::GenerationFailed(msg)
            | ApiError::StorageWriteFailed(msg)
            | ApiError::Internal(msg) => {
                tracing::error!("request failed ({}): {}", self.category(), msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        let body = Json(json!({ "error": message, "code": self.category() }));
        (status, body).into_response()
    }
}
