//! Unified error handling for freegate.
//!
//! Every failure that can reach a client goes through [`GatewayError`].
//! OpenAI-style routes render it as `{"error":{"message","type"}}`, the
//! Ollama-style routes as a flat `{"error":"..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Unified error type for gateway operations.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Every candidate was skipped or failed.
    NoEligibleModel,
    /// Requested model is unknown upstream (direct mode only).
    ModelNotFound(String),
    /// The client sent a malformed request.
    InvalidRequest(String),
    /// The cooldown store could not be read or written.
    StoreUnavailable(String),
    /// Upstream API returned an error or the transport failed.
    UpstreamError(String),
    /// Failed to parse an upstream response.
    ParseError(String),
    /// No upstream API key configured.
    ApiKeyMissing,
    /// Configuration error.
    ConfigError(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEligibleModel => write!(f, "no free models available"),
            Self::ModelNotFound(model) => write!(f, "model '{}' not found", model),
            Self::InvalidRequest(msg) => write!(f, "{}", msg),
            Self::StoreUnavailable(msg) => write!(f, "Cooldown store unavailable: {}", msg),
            Self::UpstreamError(msg) => write!(f, "Upstream error: {}", msg),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::ApiKeyMissing => write!(f, "No upstream API key configured"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::ParseError(e.to_string())
        } else {
            Self::UpstreamError(e.to_string())
        }
    }
}

/// OpenAI-style error body.
#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    r#type: String,
}

/// Ollama-style error body.
#[derive(Serialize)]
struct FlatErrorBody {
    error: String,
}

impl GatewayError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoEligibleModel => StatusCode::SERVICE_UNAVAILABLE,
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::ParseError(_) => StatusCode::BAD_GATEWAY,
            Self::ApiKeyMissing => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoEligibleModel => "service_unavailable",
            Self::ModelNotFound(_) => "model_not_found",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::StoreUnavailable(_) => "service_unavailable",
            Self::UpstreamError(_) => "upstream_error",
            Self::ParseError(_) => "upstream_error",
            Self::ApiKeyMissing => "configuration_error",
            Self::ConfigError(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Render as the flat `{"error": "..."}` body Ollama clients expect.
    pub fn into_ollama_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(FlatErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponseBody {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
