//! Re-framing of upstream token streams.
//!
//! A single loop ([`translate`]) drains the [`DeltaStream`] and asks a
//! [`FrameEmitter`] for the bytes of each frame:
//!
//! - [`NdjsonEmitter`]: Ollama `/api/chat`. One `done:false` object per
//!   delta, then exactly one `done:true` object carrying the last finish
//!   reason seen (`"stop"` if none) and zeroed counters.
//! - [`SseEmitter`]: OpenAI `/v1/chat/completions`. One
//!   `chat.completion.chunk` event per delta, then `data: [DONE]`.
//!
//! A transport error mid-stream produces one error frame in either
//! protocol and no success terminator, so clients can tell a truncated
//! response from a complete one. Each frame is handed to the body as its
//! own chunk, and the upstream stream is dropped on every exit path.


use crate::backend::{DeltaStream, StreamDelta, Usage};
use crate::error::GatewayError;
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;

/// Ollama chat object, used for stream frames and one-shot replies alike.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OllamaChatResponse {
    pub model: String,
    pub created_at: String,
    pub message: OllamaMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub stats: Option<OllamaStats>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OllamaMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Default)]
pub struct OllamaStats {
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: u64,
    pub eval_count: u64,
    pub eval_duration: u64,
}

impl OllamaStats {
    /// Approximate timings from token counts (10 units per token).
    pub fn from_usage(usage: &Usage) -> Self {
        Self {
            total_duration: usage.total_tokens * 10,
            load_duration: 0,
            prompt_eval_count: usage.prompt_tokens,
            eval_count: usage.completion_tokens,
            eval_duration: usage.completion_tokens * 10,
        }
    }
}

impl OllamaChatResponse {
    pub fn partial(model: &str, content: &str) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now().to_rfc3339(),
            message: OllamaMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            done: false,
            finish_reason: None,
            stats: None,
        }
    }

    pub fn done(model: &str, content: &str, finish_reason: &str, stats: OllamaStats) -> Self {
        Self {
            done: true,
            finish_reason: Some(finish_reason.to_string()),
            stats: Some(stats),
            ..Self::partial(model, content)
        }
    }
}

/// OpenAI `chat.completion.chunk`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChunkDelta {
    pub content: String,
}

/// Generate an OpenAI-style completion ID.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Wire framing for one output protocol.
pub trait FrameEmitter: Send + 'static {
    /// Short name used in logs.
    fn protocol(&self) -> &'static str;

    fn content_type(&self) -> &'static str;

    /// Frame for one upstream delta.
    fn delta(&mut self, delta: &StreamDelta) -> Result<Bytes, serde_json::Error>;

    /// Terminal frame after a clean end of stream.
    fn finish(&mut self) -> Result<Bytes, serde_json::Error>;

    /// Frame reporting a transport error; nothing follows it.
    fn error(&mut self, error: &GatewayError) -> Result<Bytes, serde_json::Error>;
}

pub struct NdjsonEmitter {
    model: String,
    finish_reason: Option<String>,
}

impl NdjsonEmitter {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            finish_reason: None,
        }
    }

    fn line<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
        let mut buf = serde_json::to_vec(value)?;
        buf.push(b'\n');
        Ok(Bytes::from(buf))
    }
}

impl FrameEmitter for NdjsonEmitter {
    fn protocol(&self) -> &'static str {
        "ndjson"
    }

    fn content_type(&self) -> &'static str {
        "application/x-ndjson"
    }

    fn delta(&mut self, delta: &StreamDelta) -> Result<Bytes, serde_json::Error> {
        if let Some(reason) = delta.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            self.finish_reason = Some(reason.to_string());
        }
        Self::line(&OllamaChatResponse::partial(&self.model, &delta.content))
    }

    fn finish(&mut self) -> Result<Bytes, serde_json::Error> {
        let reason = self.finish_reason.as_deref().unwrap_or("stop");
        // Usage is not accumulated across chunks; the counters stay zero.
        Self::line(&OllamaChatResponse::done(
            &self.model,
            "",
            reason,
            OllamaStats::default(),
        ))
    }

    fn error(&mut self, error: &GatewayError) -> Result<Bytes, serde_json::Error> {
        Self::line(&serde_json::json!({ "error": format!("Stream error: {}", error) }))
    }
}

pub struct SseEmitter {
    id: String,
    model: String,
    created: i64,
}

impl SseEmitter {
    pub fn new(model: &str) -> Self {
        Self {
            id: completion_id(),
            model: model.to_string(),
            created: Utc::now().timestamp(),
        }
    }

    fn event<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
        let json = serde_json::to_string(value)?;
        Ok(Bytes::from(format!("data: {}\n\n", json)))
    }
}

impl FrameEmitter for SseEmitter {
    fn protocol(&self) -> &'static str {
        "sse"
    }

    fn content_type(&self) -> &'static str {
        "text/event-stream"
    }

    fn delta(&mut self, delta: &StreamDelta) -> Result<Bytes, serde_json::Error> {
        Self::event(&ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: delta.content.clone(),
                },
                finish_reason: delta.finish_reason.clone().filter(|r| !r.is_empty()),
            }],
        })
    }

    fn finish(&mut self) -> Result<Bytes, serde_json::Error> {
        Ok(Bytes::from_static(b"data: [DONE]\n\n"))
    }

    fn error(&mut self, error: &GatewayError) -> Result<Bytes, serde_json::Error> {
        Self::event(&serde_json::json!({
            "error": {
                "message": format!("Stream error: {}", error),
                "type": error.error_type(),
            }
        }))
    }
}

/// Drain `deltas` through `emitter`, yielding one chunk per frame.
pub fn translate<E: FrameEmitter>(
    mut deltas: DeltaStream,
    mut emitter: E,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut frames: usize = 0;
        loop {
            let (frame, terminal) = match deltas.next().await {
                Some(Ok(delta)) => (emitter.delta(&delta), false),
                Some(Err(e)) => {
                    tracing::error!(protocol = emitter.protocol(), frames, error = %e, "Backend stream error");
                    (emitter.error(&e), true)
                }
                None => {
                    tracing::debug!(protocol = emitter.protocol(), frames, "Backend stream finished");
                    (emitter.finish(), true)
                }
            };

            match frame {
                Ok(bytes) => {
                    frames += 1;
                    yield Ok(bytes);
                }
                Err(e) => {
                    tracing::error!(protocol = emitter.protocol(), error = %e, "Error marshaling stream frame");
                    break;
                }
            }
            if terminal {
                break;
            }
        }
    }
}

/// Build a streaming HTTP response for `deltas` framed by `emitter`.
pub fn streaming_response<E: FrameEmitter>(deltas: DeltaStream, emitter: E) -> Response {
    let content_type = HeaderValue::from_static(emitter.content_type());
    let body = Body::from_stream(translate(deltas, emitter));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}
