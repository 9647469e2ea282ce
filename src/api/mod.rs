//! Ollama and OpenAI compatible HTTP API.
//!
//! Endpoints:
//! - GET / - "Ollama is running" (HEAD answers 200 with no body)
//! - GET /health - Health check
//! - GET /api/tags - Ollama model list
//! - POST /api/show - Ollama model details
//! - POST /api/chat - Ollama chat (streams NDJSON by default)
//! - GET /v1/models - OpenAI model list
//! - POST /v1/chat/completions - OpenAI chat (SSE when `stream` is true)

mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::dispatch::ModelRouter;

pub use types::*;

/// Application state shared across handlers.
pub struct AppState {
    pub router: ModelRouter,
}

impl AppState {
    pub fn new(router: ModelRouter) -> Self {
        Self { router }
    }
}

/// Create the API router with the given state.
pub fn create_router_with_state(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/api/tags", get(handlers::list_tags))
        .route("/api/show", post(handlers::show_model))
        .route("/api/chat", post(handlers::ollama_chat))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::openai_chat))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
