//! CLI configuration loading and merging.

use agrisense_training::AgrisenseConfig;
use anyhow::{Context, Result};

/// Load and merge CLI configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (`--api-url`, `--token`)
/// 2. Environment variables
/// 3. Local config file (./.agrisenserc)
/// 4. Global config file (~/.agrisense/config.toml)
/// 5. Defaults
pub fn load_config(api_url: Option<&str>, token: Option<&str>) -> Result<AgrisenseConfig> {
    let mut config = AgrisenseConfig::discover_and_load().context("Failed to load configuration")?;

    if let Some(url) = api_url {
        config.api.base_url = url.to_string();
    }
    if let Some(token) = token {
        config.api.token = Some(token.to_string());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
