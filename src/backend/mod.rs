//! Upstream chat backend.
//!
//! [`ChatBackend`] is the seam between routing and the network: the
//! dispatcher only ever talks to this trait, so tests swap in fakes and
//! production uses [`OpenRouterClient`].

#[cfg(test)]
pub(crate) mod fake;
mod openrouter;
#[cfg(test)]
mod tests;

use crate::error::GatewayError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Deserializer, Serialize};

pub use openrouter::OpenRouterClient;

/// One chat message, shared by the Ollama and OpenAI request shapes.
///
/// Tool-call fields are carried through untouched so tool results reach
/// upstream intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

/// Message content: plain text or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// The text of the message; text parts are concatenated.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|p| p.get("type").and_then(serde_json::Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text").and_then(serde_json::Value::as_str))
                .collect(),
        }
    }
}

impl PartialEq<&str> for MessageContent {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::Text(text) if text == other)
    }
}

/// Upstream sends `"content": null` for tool-call messages.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.to_string()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// A completed (non-streaming) chat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One increment of a streamed response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamDelta {
    pub content: String,
    pub finish_reason: Option<String>,
}

impl StreamDelta {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            finish_reason: None,
        }
    }
}

/// Live token stream. Dropping it releases the upstream connection.
pub type DeltaStream = BoxStream<'static, Result<StreamDelta, GatewayError>>;

/// A model entry from the upstream `/models` listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpstreamModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub top_provider: Option<TopProvider>,
    #[serde(default)]
    pub pricing: Option<Pricing>,
    #[serde(default)]
    pub supported_parameters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TopProvider {
    #[serde(default)]
    pub context_length: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Pricing {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub completion: String,
}

impl UpstreamModel {
    /// Free when both prompt and completion are priced at exactly `"0"`.
    pub fn is_free(&self) -> bool {
        self.pricing
            .as_ref()
            .is_some_and(|p| p.prompt == "0" && p.completion == "0")
    }

    /// Context window, preferring the top provider's figure.
    pub fn effective_context_length(&self) -> u64 {
        self.top_provider
            .as_ref()
            .and_then(|p| p.context_length)
            .filter(|ctx| *ctx > 0)
            .or(self.context_length)
            .unwrap_or(0)
    }

    pub fn supports_tools(&self) -> bool {
        self.supported_parameters.iter().any(|p| p == "tools")
    }
}

/// Operations the gateway needs from the upstream aggregator.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run a chat to completion.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<ChatCompletion, GatewayError>;

    /// Open a token stream. An `Err` here means no stream was opened.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<DeltaStream, GatewayError>;

    /// List every model the upstream offers.
    async fn list_models(&self) -> Result<Vec<UpstreamModel>, GatewayError>;
}
