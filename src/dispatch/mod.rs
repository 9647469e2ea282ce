//! Model selection with fallback.
//!
//! In free mode every chat goes through [`Dispatcher`]: the requested model
//! is tried first when the catalog knows it, then the whole catalog is
//! walked in priority order. Models that failed within the cooldown window
//! are skipped, failures start a cooldown, successes clear it. Only running
//! out of candidates is reported to the caller.
//!
//! Direct mode ([`DirectRouter`]) maps the requested name onto the
//! upstream listing and makes exactly one attempt.

mod direct;

use crate::backend::{ChatBackend, ChatCompletion, ChatMessage, DeltaStream};
use crate::catalog::{display_name, ModelCatalog};
use crate::cooldown::CooldownStore;
use crate::error::GatewayError;
use crate::filter::NameFilter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use direct::DirectRouter;

/// Result of a routed call: the model that answered and what it returned.
pub struct Dispatched<T> {
    pub model: String,
    pub value: T,
}

/// A model as presented by the listing endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailableModel {
    /// Public name (display name).
    pub name: String,
    /// Fully-qualified upstream ID.
    pub id: String,
    pub family: &'static str,
    pub context_length: Option<u64>,
}

/// Await `fut`, failing it once `limit` elapses.
pub(crate) async fn bounded<T, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            GatewayError::UpstreamError(format!("attempt timed out after {:?}", limit))
        })?,
        None => fut.await,
    }
}

pub struct Dispatcher {
    catalog: Arc<ModelCatalog>,
    filter: Arc<NameFilter>,
    cooldowns: CooldownStore,
    backend: Arc<dyn ChatBackend>,
    attempt_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        filter: Arc<NameFilter>,
        cooldowns: CooldownStore,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            catalog,
            filter,
            cooldowns,
            backend,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, limit: Option<Duration>) -> Self {
        self.attempt_timeout = limit;
        self
    }

    /// One-shot completion.
    pub async fn chat(
        &self,
        requested: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Dispatched<ChatCompletion>, GatewayError> {
        let backend = &self.backend;
        self.dispatch(requested, |model| async move { backend.chat(messages, &model).await })
            .await
    }

    /// Open a token stream on the first model that accepts it.
    pub async fn stream(
        &self,
        requested: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Dispatched<DeltaStream>, GatewayError> {
        let backend = &self.backend;
        self.dispatch(requested, |model| async move {
            backend.chat_stream(messages, &model).await
        })
        .await
    }

    /// Catalog entries that pass the filter and are not cooling down.
    pub fn available_models(&self) -> Vec<AvailableModel> {
        self.catalog
            .visible(&self.filter)
            .filter(|c| !self.is_cooling_down(&c.id))
            .map(|c| AvailableModel {
                name: c.display_name().to_string(),
                id: c.id.clone(),
                family: "free",
                context_length: Some(c.context_length).filter(|ctx| *ctx > 0),
            })
            .collect()
    }

    /// Look up a single model by display name or full ID.
    ///
    /// Catalog entries win; anything else is looked up in the upstream
    /// listing so `/api/show` can still describe models outside the free set.
    pub async fn describe(&self, name: &str) -> Result<AvailableModel, GatewayError> {
        let id = self.catalog.resolve(name, &self.filter);
        if let Some(c) = self.catalog.candidates().iter().find(|c| c.id == id) {
            return Ok(AvailableModel {
                name: c.display_name().to_string(),
                id: c.id.clone(),
                family: "free",
                context_length: Some(c.context_length).filter(|ctx| *ctx > 0),
            });
        }

        let listing = self.backend.list_models().await.inspect_err(|e| {
            tracing::warn!(model = name, error = %e, "Upstream model lookup failed");
        })?;
        listing
            .iter()
            .find(|m| m.id == name || display_name(&m.id) == name)
            .map(|m| AvailableModel {
                name: display_name(&m.id).to_string(),
                id: m.id.clone(),
                family: "openrouter",
                context_length: Some(m.effective_context_length()).filter(|ctx| *ctx > 0),
            })
            .ok_or_else(|| GatewayError::ModelNotFound(name.to_string()))
    }

    /// The catalog ID to try before the fallback walk, if any.
    fn preferred_candidate<'a>(&'a self, requested: &'a str) -> Option<&'a str> {
        let resolved = self.catalog.resolve(requested, &self.filter);
        (resolved != requested || self.catalog.contains(resolved)).then_some(resolved)
    }

    /// A store error counts as a skip.
    fn is_cooling_down(&self, model: &str) -> bool {
        self.cooldowns.should_skip(model).unwrap_or_else(|e| {
            tracing::error!(model, error = %e, "Cooldown lookup failed, skipping model");
            true
        })
    }

    fn record_outcome(&self, model: &str, succeeded: bool) {
        let result = if succeeded {
            self.cooldowns.clear_failure(model)
        } else {
            self.cooldowns.mark_failure(model)
        };
        if let Err(e) = result {
            tracing::error!(model, error = %e, "Could not update cooldown record");
        }
    }

    async fn dispatch<T, F, Fut>(
        &self,
        requested: Option<&str>,
        attempt: F,
    ) -> Result<Dispatched<T>, GatewayError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempted: Vec<&str> = Vec::new();

        if let Some(preferred) = requested.and_then(|r| self.preferred_candidate(r)) {
            if self.is_cooling_down(preferred) {
                tracing::info!(model = preferred, "Requested model is cooling down, falling back");
            } else {
                attempted.push(preferred);
                match bounded(self.attempt_timeout, attempt(preferred.to_string())).await {
                    Ok(value) => {
                        self.record_outcome(preferred, true);
                        return Ok(Dispatched {
                            model: preferred.to_string(),
                            value,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(model = preferred, error = %e, "Requested model failed, trying fallback");
                        self.record_outcome(preferred, false);
                    }
                }
            }
        }

        for candidate in self.catalog.candidates() {
            let model = candidate.id.as_str();
            if attempted.contains(&model)
                || !self.filter.passes(display_name(model))
                || self.is_cooling_down(model)
            {
                continue;
            }

            attempted.push(model);
            match bounded(self.attempt_timeout, attempt(model.to_string())).await {
                Ok(value) => {
                    self.record_outcome(model, true);
                    return Ok(Dispatched {
                        model: model.to_string(),
                        value,
                    });
                }
                Err(e) => {
                    tracing::warn!(model, error = %e, "Model failed");
                    self.record_outcome(model, false);
                }
            }
        }

        tracing::error!(
            requested = requested.unwrap_or(""),
            attempts = attempted.len(),
            "No eligible model"
        );
        Err(GatewayError::NoEligibleModel)
    }
}

/// The routing strategy chosen at startup.
pub enum ModelRouter {
    Free(Dispatcher),
    Direct(DirectRouter),
}

impl ModelRouter {
    pub async fn chat(
        &self,
        requested: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Dispatched<ChatCompletion>, GatewayError> {
        match self {
            Self::Free(dispatcher) => dispatcher.chat(requested, messages).await,
            Self::Direct(router) => router.chat(requested, messages).await,
        }
    }

    pub async fn stream(
        &self,
        requested: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Dispatched<DeltaStream>, GatewayError> {
        match self {
            Self::Free(dispatcher) => dispatcher.stream(requested, messages).await,
            Self::Direct(router) => router.stream(requested, messages).await,
        }
    }

    pub async fn available_models(&self) -> Result<Vec<AvailableModel>, GatewayError> {
        match self {
            Self::Free(dispatcher) => Ok(dispatcher.available_models()),
            Self::Direct(router) => router.available_models().await,
        }
    }

    pub async fn describe(&self, name: &str) -> Result<AvailableModel, GatewayError> {
        match self {
            Self::Free(dispatcher) => dispatcher.describe(name).await,
            Self::Direct(router) => router.describe(name).await,
        }
    }
}
