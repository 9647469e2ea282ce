//! Free-tier model catalog.
//!
//! Candidates are ordered by context window, largest first; ties keep the
//! order the upstream listed them in. The catalog is built once at startup
//! and only read afterwards.
//!
//! Sources:
//! - a cache file with one fully-qualified ID per line, already in priority order
//! - the upstream `/models` listing (`pricing.prompt` and `pricing.completion` both `"0"`)


use crate::backend::{ChatBackend, UpstreamModel};
use crate::error::GatewayError;
use crate::filter::NameFilter;
use std::path::Path;

/// A model the dispatcher may route to.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCandidate {
    pub id: String,
    pub context_length: u64,
}

impl ModelCandidate {
    pub fn new(id: &str, context_length: u64) -> Self {
        Self {
            id: id.to_string(),
            context_length,
        }
    }

    pub fn display_name(&self) -> &str {
        display_name(&self.id)
    }
}

/// Trailing path segment of a fully-qualified ID: `meta-llama/llama-3:free` -> `llama-3:free`.
pub fn display_name(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelCatalog {
    candidates: Vec<ModelCandidate>,
}

impl ModelCatalog {
    /// Build a catalog, sorting by context length descending.
    pub fn new(mut candidates: Vec<ModelCandidate>) -> Self {
        // `sort_by` is stable, so equal windows keep their fetch order.
        candidates.sort_by(|a, b| b.context_length.cmp(&a.context_length));
        Self { candidates }
    }

    /// Keep only free upstream models.
    pub fn from_upstream(models: &[UpstreamModel]) -> Self {
        Self::new(
            models
                .iter()
                .filter(|m| m.is_free())
                .map(|m| ModelCandidate::new(&m.id, m.effective_context_length()))
                .collect(),
        )
    }

    /// Parse the cache file format. Line order is the priority order.
    pub fn parse(content: &str) -> Self {
        Self {
            candidates: content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|id| ModelCandidate::new(id, 0))
                .collect(),
        }
    }

    pub fn to_file_contents(&self) -> String {
        self.candidates
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Read the cache file if present, else fetch from upstream and write it.
    pub async fn load_or_fetch(
        path: &Path,
        backend: &dyn ChatBackend,
    ) -> Result<Self, GatewayError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let catalog = Self::parse(&content);
                tracing::info!(path = %path.display(), models = catalog.len(), "Loaded free model list from cache file");
                return Ok(catalog);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(GatewayError::ConfigError(format!("{}: {}", path.display(), e))),
        }

        let catalog = Self::from_upstream(&backend.list_models().await?);
        tracing::info!(models = catalog.len(), "Fetched free model list from upstream");

        if let Err(e) = catalog.write_to(path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not write free model cache file");
        }
        Ok(catalog)
    }

    fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_file_contents())
    }

    /// Candidates in priority order.
    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.candidates.iter().any(|c| c.id == id)
    }

    /// Map a display name to the highest-priority fully-qualified ID that
    /// passes `filter`. Unknown names come back unchanged.
    pub fn resolve<'a>(&'a self, name: &'a str, filter: &NameFilter) -> &'a str {
        self.candidates
            .iter()
            .find(|c| c.display_name() == name && filter.passes(name))
            .map(|c| c.id.as_str())
            .unwrap_or(name)
    }

    /// Candidates that pass `filter`, in priority order.
    pub fn visible<'a>(
        &'a self,
        filter: &'a NameFilter,
    ) -> impl Iterator<Item = &'a ModelCandidate> + 'a {
        self.candidates
            .iter()
            .filter(move |c| filter.passes(c.display_name()))
    }
}
