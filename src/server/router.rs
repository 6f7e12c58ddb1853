use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chats, health};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/chats", post(chats::create_chat).get(chats::list_chats))
        .route("/api/chats/message", post(chats::send_message))
        .route("/api/chats/upload", post(chats::upload_documents))
        .route(
            "/api/chats/:id",
            get(chats::get_chat).delete(chats::delete_chat),
        )
        .route("/api/chats/:id/title", put(chats::rename_chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
