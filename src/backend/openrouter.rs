//! OpenRouter (OpenAI-compatible) implementation of [`ChatBackend`].

use super::{ChatBackend, ChatCompletion, ChatMessage, DeltaStream, StreamDelta, UpstreamModel};
use crate::config::DEFAULT_UPSTREAM_URL;
use crate::error::GatewayError;
use crate::http::{create_chat_client, create_client};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct OpenRouterClient {
    chat_client: Client,
    listing_client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ModelsEnvelope {
    #[serde(default)]
    data: Vec<UpstreamModel>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What a single SSE line from upstream means.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Delta(StreamDelta),
    Done,
    Ignore,
    Failed(GatewayError),
}

impl OpenRouterClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            chat_client: create_chat_client(),
            listing_client: create_client(),
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        stream: bool,
    ) -> Result<Response, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        let response = self
            .authorize(self.chat_client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await
    }
}

/// Turn a non-2xx response into an error carrying a trimmed body.
async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(GatewayError::UpstreamError(format!(
        "status {} | {}",
        status,
        truncate(&text, 500)
    )))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Pull the message out of an in-band `{"error": ...}` payload.
fn upstream_error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, `:` keep-alive comments and `event:` fields.
        return SseLine::Ignore;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return SseLine::Failed(GatewayError::ParseError(e.to_string())),
    };
    if let Some(message) = upstream_error_message(&value) {
        return SseLine::Failed(GatewayError::UpstreamError(message));
    }

    match serde_json::from_value::<StreamChunk>(value) {
        Ok(chunk) => match chunk.choices.into_iter().next() {
            Some(choice) => SseLine::Delta(StreamDelta {
                content: choice.delta.content.unwrap_or_default(),
                finish_reason: choice.finish_reason.filter(|r| !r.is_empty()),
            }),
            // Usage-only trailer chunks carry no choice.
            None => SseLine::Ignore,
        },
        Err(e) => SseLine::Failed(GatewayError::ParseError(e.to_string())),
    }
}

fn into_delta_stream(response: Response) -> DeltaStream {
    let mut bytes = response.bytes_stream();

    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let chunk = match bytes.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    yield Err(GatewayError::UpstreamError(e.to_string()));
                    return;
                }
                None => {
                    // Final line without a trailing newline.
                    match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                        SseLine::Delta(delta) => yield Ok(delta),
                        SseLine::Failed(e) => yield Err(e),
                        SseLine::Done | SseLine::Ignore => {}
                    }
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                match parse_sse_line(&line) {
                    SseLine::Delta(delta) => yield Ok(delta),
                    SseLine::Ignore => {}
                    SseLine::Done => return,
                    SseLine::Failed(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    };

    stream.boxed()
}

#[async_trait]
impl ChatBackend for OpenRouterClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<ChatCompletion, GatewayError> {
        let response = self.post_chat(messages, model, false).await?;
        let text = response.text().await?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            GatewayError::ParseError(format!("{} | Response: {}", e, truncate(&text, 500)))
        })?;

        if let Some(message) = upstream_error_message(&value) {
            return Err(GatewayError::UpstreamError(message));
        }

        let completion: ChatCompletion = serde_json::from_value(value)
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;
        if completion.choices.is_empty() {
            return Err(GatewayError::UpstreamError("No response from model".to_string()));
        }
        Ok(completion)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<DeltaStream, GatewayError> {
        let response = self.post_chat(messages, model, true).await?;
        Ok(into_delta_stream(response))
    }

    async fn list_models(&self) -> Result<Vec<UpstreamModel>, GatewayError> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorize(self.listing_client.get(&url)).send().await?;
        let envelope: ModelsEnvelope = ensure_success(response).await?.json().await?;
        Ok(envelope.data)
    }
}
