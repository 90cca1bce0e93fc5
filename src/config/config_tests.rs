use super::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = ServerConfig::default();
    assert_eq!(config.port, "8080");
    assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
    assert_eq!(config.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
    assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    assert_eq!(config.accept_poll_ms, DEFAULT_ACCEPT_POLL_MS);
    assert_eq!(config.interpreter, None);
}

#[test]
fn test_partial_json_fills_defaults() {
    let config: ServerConfig = serde_json::from_str(r#"{"port": "9000"}"#).unwrap();
    assert_eq!(config.port, "9000");
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
}

#[test]
fn test_camel_case_fields() {
    let json = r#"{
        "port": "8081",
        "bindAddress": "0.0.0.0",
        "readTimeoutMs": 250,
        "maxBodyBytes": 64,
        "acceptPollMs": 5,
        "interpreter": ["python3", "-"]
    }"#;
    let config: ServerConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.max_body_bytes, 64);
    assert_eq!(config.accept_poll_interval(), Duration::from_millis(5));
    assert_eq!(
        config.interpreter,
        Some(vec!["python3".to_string(), "-".to_string()])
    );
}

#[test]
fn test_interpreter_skipped_when_none() {
    let json = serde_json::to_string(&ServerConfig::default()).unwrap();
    assert!(!json.contains("interpreter"));
    assert!(json.contains("\"bindAddress\""));
}

#[test]
fn test_zero_read_timeout_disables_it() {
    let config = ServerConfig {
        read_timeout_ms: 0,
        ..ServerConfig::default()
    };
    assert_eq!(config.read_timeout(), None);
}

#[test]
fn test_zero_poll_interval_is_clamped() {
    let config = ServerConfig {
        accept_poll_ms: 0,
        ..ServerConfig::default()
    };
    assert_eq!(config.accept_poll_interval(), Duration::from_millis(1));
}

#[test]
fn test_override_port_ignores_blank() {
    let mut config = ServerConfig::default();
    config.override_port(None);
    assert_eq!(config.port, "8080");
    config.override_port(Some(""));
    assert_eq!(config.port, "8080");
    config.override_port(Some("   "));
    assert_eq!(config.port, "8080");
    config.override_port(Some(" 9090 "));
    assert_eq!(config.port, "9090");
}

#[test]
fn test_effective_port_falls_back_to_default() {
    let config = ServerConfig {
        port: String::new(),
        ..ServerConfig::default()
    };
    assert_eq!(config.effective_port(), DEFAULT_PORT);
}

#[test]
fn test_apply_env_overrides_port() {
    std::env::set_var(PORT_ENV_VAR, "7070");
    let mut config = ServerConfig::default();
    config.apply_env();
    std::env::remove_var(PORT_ENV_VAR);
    assert_eq!(config.port, "7070");
}

#[test]
fn test_load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_config_from(&temp_dir.path().join("missing.json"));
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn test_load_valid_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"port": "8181", "acceptPollMs": 20}"#).unwrap();
    let config = load_config_from(&path);
    assert_eq!(config.port, "8181");
    assert_eq!(config.accept_poll_ms, 20);
}

#[test]
fn test_load_invalid_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, r#"{"port": 8181}"#).unwrap();
    assert_eq!(load_config_from(&path), ServerConfig::default());

    fs::write(&path, "not json at all").unwrap();
    assert_eq!(load_config_from(&path), ServerConfig::default());
}

#[test]
fn test_default_config_path_is_expanded() {
    let path = default_config_path();
    assert!(!path.to_string_lossy().starts_with('~'));
    assert!(path.ends_with("config.json"));
}
