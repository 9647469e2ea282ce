//! Scripted in-process backend for tests.

use super::{
    ChatBackend, ChatCompletion, ChatMessage, CompletionChoice, DeltaStream, StreamDelta,
    UpstreamModel, Usage,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeBackend {
    failing: HashSet<String>,
    hanging: HashSet<String>,
    deltas: Vec<StreamDelta>,
    stream_error_after: Option<usize>,
    models: Vec<UpstreamModel>,
    calls: Mutex<Vec<String>>,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            deltas: vec![StreamDelta::text("He"), StreamDelta::text("llo")],
            ..Self::default()
        }
    }

    pub(crate) fn failing(mut self, models: &[&str]) -> Self {
        self.failing.extend(models.iter().map(|m| m.to_string()));
        self
    }

    pub(crate) fn hanging(mut self, models: &[&str]) -> Self {
        self.hanging.extend(models.iter().map(|m| m.to_string()));
        self
    }

    pub(crate) fn with_deltas(mut self, deltas: Vec<StreamDelta>) -> Self {
        self.deltas = deltas;
        self
    }

    /// Break the stream with a transport error after `n` deltas.
    pub(crate) fn with_stream_error_after(mut self, n: usize) -> Self {
        self.stream_error_after = Some(n);
        self
    }

    pub(crate) fn with_models(mut self, models: Vec<UpstreamModel>) -> Self {
        self.models = models;
        self
    }

    /// Models attempted so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Messages passed to the most recent attempt.
    pub(crate) fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }

    async fn attempt(&self, messages: &[ChatMessage], model: &str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(model.to_string());
        *self.last_messages.lock().unwrap() = messages.to_vec();
        if self.hanging.contains(model) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(model) {
            return Err(GatewayError::UpstreamError(format!("{} is unavailable", model)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<ChatCompletion, GatewayError> {
        self.attempt(messages, model).await?;
        let content: String = self.deltas.iter().map(|d| d.content.as_str()).collect();
        Ok(ChatCompletion {
            id: "gen-fake".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: ChatMessage::new("assistant", &content),
                finish_reason: None,
            }],
            usage: Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            },
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<DeltaStream, GatewayError> {
        self.attempt(messages, model).await?;
        let mut items: Vec<Result<StreamDelta, GatewayError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        if let Some(n) = self.stream_error_after {
            items.truncate(n);
            items.push(Err(GatewayError::UpstreamError("connection reset".to_string())));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    async fn list_models(&self) -> Result<Vec<UpstreamModel>, GatewayError> {
        self.calls.lock().unwrap().push("<list_models>".to_string());
        Ok(self.models.clone())
    }
}
