//! Display-name allow-list.
//!
//! A filter is a set of plain substrings. A display name passes when any
//! pattern occurs in it (case-sensitive, unanchored). There is no glob or
//! regex support: `7b` admits `llama-7b-instruct` but also `qwen-17b`, and
//! there is no way to express "ends with" or "exactly". An empty filter
//! admits everything.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameFilter {
    patterns: BTreeSet<String>,
}

impl NameFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Parse one pattern per line; blank lines are ignored.
    pub fn parse(content: &str) -> Self {
        Self::new(content.lines())
    }

    /// Load the filter file. A missing file yields the allow-all filter.
    pub fn load(path: &Path) -> io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let filter = Self::parse(&content);
                tracing::info!(path = %path.display(), patterns = filter.len(), "Loaded model filter");
                for pattern in &filter.patterns {
                    tracing::info!(" - {}", pattern);
                }
                Ok(filter)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Model filter file not found, skipping model filtering");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn passes(&self, display_name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| display_name.contains(pattern.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}
