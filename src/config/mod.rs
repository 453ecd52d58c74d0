// Configuration module for objsync
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let mut config = load_config(path)?;

    // Allow environment variables to override config values
    if let Ok(server_url) = std::env::var("OBJSYNC_SERVER_URL") {
        if let Some(server_config) = config.target.server.as_mut() {
            server_config.url = server_url;
        }
    }

    if let Ok(api_token) = std::env::var("OBJSYNC_API_TOKEN") {
        if let Some(server_config) = config.target.server.as_mut() {
            server_config.api_token = Some(api_token);
        }
    }

    Ok(config)
}
