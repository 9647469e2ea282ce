//! Direct (non-free) routing: one attempt on the model the caller named.

use super::{bounded, AvailableModel, Dispatched};
use crate::backend::{ChatBackend, ChatCompletion, ChatMessage, DeltaStream, UpstreamModel};
use crate::catalog::display_name;
use crate::error::GatewayError;
use crate::filter::NameFilter;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

const LISTING_KEY: &str = "upstream_models";

pub struct DirectRouter {
    backend: Arc<dyn ChatBackend>,
    filter: Arc<NameFilter>,
    tool_use_only: bool,
    attempt_timeout: Option<Duration>,
    cache: Cache<&'static str, Arc<Vec<UpstreamModel>>>,
}

impl DirectRouter {
    pub fn new(backend: Arc<dyn ChatBackend>, filter: Arc<NameFilter>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600)) // 1 hour - model lists rarely change
            .build();

        Self {
            backend,
            filter,
            tool_use_only: false,
            attempt_timeout: None,
            cache,
        }
    }

    pub fn with_tool_use_only(mut self, enabled: bool) -> Self {
        self.tool_use_only = enabled;
        self
    }

    pub fn with_attempt_timeout(mut self, limit: Option<Duration>) -> Self {
        self.attempt_timeout = limit;
        self
    }

    async fn listing(&self) -> Result<Arc<Vec<UpstreamModel>>, GatewayError> {
        if let Some(cached) = self.cache.get(LISTING_KEY).await {
            return Ok(cached);
        }
        let models = Arc::new(self.backend.list_models().await?);
        self.cache.insert(LISTING_KEY, models.clone()).await;
        Ok(models)
    }

    fn is_listed(&self, model: &UpstreamModel) -> bool {
        (!self.tool_use_only || model.supports_tools())
            && self.filter.passes(display_name(&model.id))
    }

    fn to_available(&self, model: &UpstreamModel) -> AvailableModel {
        AvailableModel {
            name: display_name(&model.id).to_string(),
            id: model.id.clone(),
            family: if self.tool_use_only { "tool-enabled" } else { "openrouter" },
            context_length: Some(model.effective_context_length()).filter(|ctx| *ctx > 0),
        }
    }

    pub async fn available_models(&self) -> Result<Vec<AvailableModel>, GatewayError> {
        Ok(self
            .listing()
            .await?
            .iter()
            .filter(|m| self.is_listed(m))
            .map(|m| self.to_available(m))
            .collect())
    }

    pub async fn describe(&self, name: &str) -> Result<AvailableModel, GatewayError> {
        self.listing()
            .await?
            .iter()
            .filter(|m| self.is_listed(m))
            .find(|m| m.id == name || display_name(&m.id) == name)
            .map(|m| self.to_available(m))
            .ok_or_else(|| GatewayError::ModelNotFound(name.to_string()))
    }

    async fn resolve(&self, requested: Option<&str>) -> Result<String, GatewayError> {
        let name = requested.unwrap_or_default();
        match self.describe(name).await {
            Ok(model) => Ok(model.id),
            Err(e) => {
                tracing::error!(model = name, error = %e, "Error getting full model name");
                Err(e)
            }
        }
    }

    pub async fn chat(
        &self,
        requested: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Dispatched<ChatCompletion>, GatewayError> {
        let model = self.resolve(requested).await?;
        let value = bounded(self.attempt_timeout, self.backend.chat(messages, &model)).await?;
        Ok(Dispatched { model, value })
    }

    pub async fn stream(
        &self,
        requested: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Dispatched<DeltaStream>, GatewayError> {
        let model = self.resolve(requested).await?;
        let value =
            bounded(self.attempt_timeout, self.backend.chat_stream(messages, &model)).await?;
        Ok(Dispatched { model, value })
    }
}
