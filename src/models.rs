//! Model-key to endpoint lookup.

use std::collections::BTreeMap;

use crate::error::{FluxError, Result};
use crate::types::ModelFamily;

/// An endpoint a model key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEndpoint {
    /// Path relative to the API base URL, e.g. `/flux-kontext-pro`.
    pub path: String,
    pub family: ModelFamily,
}

/// Maps user-facing model keys (`"pro"`, `"max"`, ...) to endpoints.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelEndpoint>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::empty()
            .with_model("fill", "/flux-pro-1.0-fill", ModelFamily::Fill)
            .with_model("pro", "/flux-kontext-pro", ModelFamily::Kontext)
            .with_model("max", "/flux-kontext-max", ModelFamily::Kontext)
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

impl ModelRegistry {
    /// A registry with no models.
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Register (or replace) a model key.
    pub fn with_model(
        mut self,
        key: impl AsRef<str>,
        path: impl Into<String>,
        family: ModelFamily,
    ) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        self.models
            .insert(normalize_key(key.as_ref()), ModelEndpoint { path, family });
        self
    }

    /// Resolve a model key. Unknown keys are a configuration error.
    pub fn resolve(&self, key: &str) -> Result<&ModelEndpoint> {
        self.models.get(&normalize_key(key)).ok_or_else(|| {
            FluxError::Configuration(format!(
                "unknown model '{}' (expected one of: {})",
                key.trim(),
                self.keys().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
