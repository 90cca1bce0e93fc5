//! Configuration type definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Settings for the listener, the accept loop and the standalone binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port as text (default: "8080"). "0" asks the OS for a free port.
    #[serde(default = "default_port")]
    pub port: String,
    /// Address the listener binds to (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Per-connection read timeout in milliseconds (default: 5000)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Largest request body accepted, in bytes (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Accept loop poll interval in milliseconds (default: 10)
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    /// Interpreter command line the binary pipes scripts into, e.g. ["python3", "-"]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}
fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}
fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}
fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
fn default_accept_poll_ms() -> u64 {
    DEFAULT_ACCEPT_POLL_MS
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            bind_address: default_bind_address(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            accept_poll_ms: DEFAULT_ACCEPT_POLL_MS,
            interpreter: None,
        }
    }
}

impl ServerConfig {
    /// Replace the port unless `port` is absent or blank
    pub fn override_port(&mut self, port: Option<&str>) {
        if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
            self.port = port.to_string();
        }
    }

    /// Apply `SCRIPT_WEB_SERVER_PORT` if it is set and non-empty
    pub fn apply_env(&mut self) {
        let from_env = std::env::var(PORT_ENV_VAR).ok();
        self.override_port(from_env.as_deref());
    }

    /// Port to use for a start request; blank falls back to the default
    pub fn effective_port(&self) -> &str {
        let port = self.port.trim();
        if port.is_empty() {
            DEFAULT_PORT
        } else {
            port
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms.max(1))
    }
}
