//! HTTP handlers for the Ollama and OpenAI compatible routes.

use super::types::*;
use super::AppState;
use crate::backend::ChatCompletion;
use crate::dispatch::Dispatched;
use crate::error::GatewayError;
use crate::stream::{
    completion_id, streaming_response, NdjsonEmitter, OllamaChatResponse, OllamaStats, SseEmitter,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

/// An empty model name means "let the router choose".
fn requested_model(model: &str) -> Option<&str> {
    Some(model).filter(|m| !m.is_empty())
}

fn invalid_payload(rejection: JsonRejection) -> GatewayError {
    tracing::warn!(error = %rejection.body_text(), "Rejected request body");
    GatewayError::InvalidRequest("Invalid JSON payload".to_string())
}

// ============================================================================
// Health and listings
// ============================================================================

pub async fn root() -> &'static str {
    "Ollama is running"
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "freegate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_tags(State(state): State<Arc<AppState>>) -> Response {
    match state.router.available_models().await {
        Ok(models) => {
            let modified_at = Utc::now().to_rfc3339();
            let models = models
                .iter()
                .map(|m| OllamaModel::new(m, &modified_at))
                .collect();
            Json(TagsResponse { models }).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Error getting models");
            e.into_ollama_response()
        }
    }
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelsResponse>, GatewayError> {
    let models = state.router.available_models().await.inspect_err(|e| {
        tracing::error!(error = %e, "Error getting models");
    })?;

    let created = Utc::now().timestamp();
    let data = models
        .into_iter()
        .map(|m| ModelInfo {
            id: m.name,
            object: "model",
            created,
            owned_by: "openrouter",
        })
        .collect();

    Ok(Json(ModelsResponse {
        object: "list",
        data,
    }))
}

pub async fn show_model(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ShowRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_payload(rejection).into_ollama_response(),
    };
    if request.name.is_empty() {
        return GatewayError::InvalidRequest("Model name is required".to_string())
            .into_ollama_response();
    }

    match state.router.describe(&request.name).await {
        Ok(model) => Json(ShowResponse::new(&model)).into_response(),
        Err(e) => e.into_ollama_response(),
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Fold a finished completion into the single Ollama reply object.
fn ollama_reply(
    Dispatched { model, value }: Dispatched<ChatCompletion>,
) -> Result<OllamaChatResponse, GatewayError> {
    let choice = value
        .choices
        .first()
        .ok_or_else(|| GatewayError::Internal("No response from model".to_string()))?;
    let finish_reason = choice
        .finish_reason
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or("stop");

    Ok(OllamaChatResponse::done(
        &model,
        &choice.message.content.text(),
        finish_reason,
        OllamaStats::from_usage(&value.usage),
    ))
}

pub async fn ollama_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OllamaChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_payload(rejection).into_ollama_response(),
    };
    let requested = requested_model(&request.model);
    let stream = request.wants_stream();
    tracing::info!(model = requested.unwrap_or_default(), stream, "Requested model");

    if stream {
        return match state.router.stream(requested, &request.messages).await {
            Ok(Dispatched { model, value }) => {
                tracing::info!(model = %model, "Using model");
                streaming_response(value, NdjsonEmitter::new(&model))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to open stream");
                e.into_ollama_response()
            }
        };
    }

    let reply = state
        .router
        .chat(requested, &request.messages)
        .await
        .and_then(ollama_reply);
    match reply {
        Ok(reply) => {
            tracing::info!(model = %reply.model, "Used model");
            Json(reply).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Chat failed");
            e.into_ollama_response()
        }
    }
}

pub async fn openai_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OpenAiChatRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(request) = payload.map_err(invalid_payload)?;
    let requested = requested_model(&request.model);
    let stream = request.wants_stream();
    tracing::info!(model = requested.unwrap_or_default(), stream, "Requested model");

    if stream {
        let Dispatched { model, value } = state
            .router
            .stream(requested, &request.messages)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to open stream"))?;
        tracing::info!(model = %model, "Using model");
        return Ok(streaming_response(value, SseEmitter::new(&model)));
    }

    let Dispatched {
        model,
        value: mut completion,
    } = state
        .router
        .chat(requested, &request.messages)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Chat failed"))?;
    tracing::info!(model = %model, "Used model");

    completion.id = completion_id();
    completion.object = "chat.completion".to_string();
    completion.created = Utc::now().timestamp();
    completion.model = model;
    Ok(Json(completion).into_response())
}
