use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Search behaviour knobs. Every field has a default, so a partial JSON
/// document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Ask the fetcher for the documents that variables bound during the
    /// search point into, and wait for them before matching.
    pub follow_links: bool,
    /// Also follow variables bound in predicate position (vocabulary
    /// documents).
    pub fetch_predicates: bool,
    /// Stop after this many matches.
    pub max_matches: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            follow_links: true,
            fetch_predicates: false,
            max_matches: None,
        }
    }
}

impl SearchConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Builder-style override of `max_matches`.
    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches = Some(max);
        self
    }
}
