//! Subcommands.

pub mod config;
pub mod evaluate;
pub mod models;
pub mod process;

use std::path::{Path, PathBuf};

use subocr_core::SubOcrConfig;
use tracing::debug;

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("subocr")
        .join("config.json")
}

/// Load the configuration from `path`, the default location, or defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SubOcrConfig> {
    if let Some(path) = path {
        return Ok(SubOcrConfig::from_file(path)?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config {}", default_path.display());
        Ok(SubOcrConfig::from_file(&default_path)?)
    } else {
        Ok(SubOcrConfig::default())
    }
}
