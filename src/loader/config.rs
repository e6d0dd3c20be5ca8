//! Loader configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! {
//!   "version": "2025-08-13T3",
//!   "default_route": "index",
//!   "router": { "mode": "hash" },
//!   "cache": { "max_entries": 60, "ttl_ms": 1200000 },
//!   "prefetch_routes": ["index"]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheOptions;
use crate::navigation::RouterConfig;

/// Errors raised while building a loader from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid loader config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("loader requires a {what}")]
    Missing { what: &'static str },
}

/// Settings for a [`Loader`](super::Loader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Prefix shared by the view, logic and style resources.
    pub base_path: String,
    /// Caller-supplied version label, part of every cache key.
    pub version: String,
    /// Whether resource ETags are folded into cache keys.
    pub use_etag_version: bool,
    /// Options for the built-in cache; ignored when a cache is injected.
    pub cache: CacheOptions,
    /// Routes to load in the background after the first render.
    pub prefetch_routes: Vec<String>,
    pub prefetch_delay_ms: u64,
    /// Base pause between fetch attempts.
    pub retry_delay_ms: u64,
    /// Route used when the location names none, or an invalid one.
    pub default_route: String,
    pub router: RouterConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_path: "/src".to_owned(),
            version: String::new(),
            use_etag_version: true,
            cache: CacheOptions::default(),
            prefetch_routes: Vec::new(),
            prefetch_delay_ms: 200,
            retry_delay_ms: 200,
            default_route: "index".to_owned(),
            router: RouterConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn use_etag_version(mut self, enabled: bool) -> Self {
        self.use_etag_version = enabled;
        self
    }

    pub fn prefetch_delay(&self) -> Duration {
        Duration::from_millis(self.prefetch_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
