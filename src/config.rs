use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for a mirroring run. Every field has a default so a config file
/// only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Pause inserted after every fetch.
    pub delay_ms: u64,
    /// Path segments that mark the start of bundler output, e.g. `_next`.
    pub asset_markers: Vec<String>,
    pub min_prefix_occurrences: usize,
    /// Script literals starting with one of these are never treated as assets.
    pub excluded_literal_prefixes: Vec<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            user_agent: "WebsiteMirror/1.0".to_string(),
            timeout_secs: 30,
            delay_ms: 500,
            asset_markers: vec!["_next".to_string()],
            min_prefix_occurrences: 1,
            excluded_literal_prefixes: vec!["/api/".to_string(), "/graphql".to_string()],
        }
    }
}

impl MirrorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
