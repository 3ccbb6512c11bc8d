//! pvekit configuration file (`config.toml`).
//!
//! ```toml
//! [source]
//! pvesh = "/usr/bin/pvesh"
//! node = "pve1"
//!
//! [update]
//! retries = 0
//! retry_delay_ms = 500
//! jobs = 4
//! confirm = true
//! ```
//!
//! A missing file means defaults.

use anyhow::{Context, Result};
use guestconf::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Path of the `pvesh` executable; looked up when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvesh: Option<String>,
    /// Default node; guests are located through the cluster when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateConfig {
    /// Conflict retries; 0 never retries
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Parallel guests for batch apply
    pub jobs: usize,
    /// Prompt before writing
    pub confirm: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay_ms: 500,
            jobs: 4,
            confirm: true,
        }
    }
}

impl UpdateConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.retries, Duration::from_millis(self.retry_delay_ms))
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
    }
}
