//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Port used when none is configured
pub const DEFAULT_PORT: &str = "8080";

/// Loopback address the listener binds to
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Per-connection read timeout
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Largest accepted request body (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// How often the accept loop checks for a stop request
pub const DEFAULT_ACCEPT_POLL_MS: u64 = 10;

/// Environment variable overriding the configured port
pub const PORT_ENV_VAR: &str = "SCRIPT_WEB_SERVER_PORT";

/// Config file location, tilde-expanded at load time
pub const DEFAULT_CONFIG_PATH: &str = "~/.script-web-server/config.json";
