//! HTTP surface: the streaming chat endpoint.

pub mod chat;
pub mod models;

use crate::supervisor::AgentService;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(service: Arc<AgentService>) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat::stream_chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
