// src/config/mod.rs
mod duration;
mod models;

pub use duration::{parse_duration, ParseDurationError};
pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (JSON by default, YAML by extension).
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&contents).context("failed to parse YAML config")?
        }
        _ => serde_json::from_str(&contents).context("failed to parse JSON config")?,
    };

    config.validate()?;
    Ok(config)
}
