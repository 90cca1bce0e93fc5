//! Configuration loading from file system

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use super::defaults::DEFAULT_CONFIG_PATH;
use super::types::ServerConfig;

/// ~/.script-web-server/config.json, tilde-expanded
pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref())
}

/// Load configuration from the default location.
///
/// Returns ServerConfig::default() if the file is missing or invalid.
pub fn load_config() -> ServerConfig {
    load_config_from(&default_config_path())
}

/// Load configuration from `path`, falling back to defaults on any failure
#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config_from(path: &Path) -> ServerConfig {
    if !path.exists() {
        info!("Config file not found, using defaults");
        return ServerConfig::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to read config file, using defaults");
            return ServerConfig::default();
        }
    };

    match serde_json::from_str::<ServerConfig>(&text) {
        Ok(config) => {
            info!(port = %config.port, "Successfully loaded config");
            config
        }
        Err(e) => {
            let hint = if e.to_string().contains("invalid type") && text.contains("\"port\"") {
                "\n\nHint: 'port' must be a string, e.g. { \"port\": \"8080\" }"
            } else {
                ""
            };
            warn!(error = %e, hint = %hint, "Failed to parse config JSON, using defaults");
            ServerConfig::default()
        }
    }
}
