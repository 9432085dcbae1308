//! Client configuration.
//!
//! Values are merged from, in increasing precedence:
//! 1. Defaults
//! 2. Global config file (`~/.agrisense/config.toml`)
//! 3. Local config file (`./.agrisenserc`)
//! 4. Environment variables (`AGRISENSE_API_URL`, `AGRISENSE_TOKEN`, `AGRISENSE_LOG_LEVEL`)
//!
//! Command-line flags are applied on top by the CLI.

use crate::error::{Result, TrainingError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_API_URL: &str = "AGRISENSE_API_URL";
pub const ENV_TOKEN: &str = "AGRISENSE_TOKEN";
pub const ENV_LOG_LEVEL: &str = "AGRISENSE_LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgrisenseConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub training: OrchestratorConfig,

    #[serde(default)]
    pub log_level: Option<String>,
}

/// Where and how to reach the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token attached to every request when set.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TrainingError::Config(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(TrainingError::Config(
                "api.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Timing knobs for polling and the simulated progress timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Delay between status checks (default: 2000 ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Status checks before giving up (default: 30, about one minute).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Progress simulator cadence (default: 500 ms).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Smallest simulated increment per tick, inclusive.
    #[serde(default = "default_min_increment")]
    pub min_increment: u8,

    /// Largest simulated increment per tick, exclusive.
    #[serde(default = "default_max_increment")]
    pub max_increment: u8,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    30
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_min_increment() -> u8 {
    5
}

fn default_max_increment() -> u8 {
    20
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            tick_interval_ms: default_tick_interval_ms(),
            min_increment: default_min_increment(),
            max_increment: default_max_increment(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(TrainingError::Config(
                "training.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(TrainingError::Config(
                "training.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(TrainingError::Config(
                "training.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.min_increment == 0 || self.min_increment >= self.max_increment || self.max_increment > 100 {
            return Err(TrainingError::Config(format!(
                "training increments must satisfy 0 < min < max <= 100 (got {}..{})",
                self.min_increment, self.max_increment
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Partial config as it appears in a file; every field is optional so that
/// a local file only overrides what it mentions.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api: Option<ApiFile>,
    #[serde(default)]
    training: Option<toml::Table>,
    #[serde(default)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiFile {
    base_url: Option<String>,
    token: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl AgrisenseConfig {
    /// Parse a complete config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge_toml_str(content)?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    #[must_use]
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".agrisense")
            .join("config.toml")
    }

    #[must_use]
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".agrisenserc")
    }

    /// Discover config files and environment overrides.
    ///
    /// Missing files are skipped; malformed files are an error.
    pub fn discover_and_load() -> Result<Self> {
        let mut config = Self::default();

        for path in [Self::default_global_path(), Self::default_local_path()] {
            if path.exists() {
                debug!(path = %path.display(), "Loading config file");
                config.merge_file(&path)?;
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrainingError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        self.merge_toml_str(&content)
            .map_err(|e| TrainingError::Config(format!("{}: {}", path.display(), e)))
    }

    fn merge_toml_str(&mut self, content: &str) -> Result<()> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| TrainingError::Config(e.to_string()))?;

        if let Some(api) = file.api {
            if let Some(base_url) = api.base_url {
                self.api.base_url = base_url;
            }
            if let Some(token) = api.token {
                self.api.token = Some(token);
            }
            if let Some(timeout) = api.request_timeout_secs {
                self.api.request_timeout_secs = timeout;
            }
        }

        if let Some(training) = file.training {
            // Overlay the file's keys on top of the current values.
            let current = toml::Value::try_from(&self.training)
                .map_err(|e| TrainingError::Config(e.to_string()))?;
            let mut merged = match current {
                toml::Value::Table(table) => table,
                _ => toml::Table::new(),
            };
            merged.extend(training);
            self.training = toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| TrainingError::Config(e.to_string()))?;
        }

        if let Some(level) = file.log_level {
            self.log_level = Some(level);
        }

        Ok(())
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            self.log_level = Some(level);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.training.validate()
    }
}
