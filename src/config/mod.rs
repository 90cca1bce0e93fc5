//! Configuration module - server settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.script-web-server/config.json
//! - Default values for all settings
//! - Layering environment and command-line overrides on top
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT, PORT_ENV_VAR};
pub use loader::{default_config_path, load_config, load_config_from};
pub use types::ServerConfig;

#[cfg(test)]
pub use defaults::{
    DEFAULT_ACCEPT_POLL_MS, DEFAULT_MAX_BODY_BYTES, DEFAULT_READ_TIMEOUT_MS,
};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
