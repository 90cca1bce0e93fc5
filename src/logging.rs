//! Structured JSONL logging plus human-readable stderr output.
//!
//! - **JSONL to file** (~/.script-web-server/logs/script-web-server.jsonl) for tooling
//! - **Pretty to stderr** for whoever is watching the terminal
//!
//! [`write_line`] is the diagnostic sink the rest of the crate writes to. Lines also go
//! into a small in-memory buffer so a host can show the most recent output.
//!
//! # Usage
//!
//! ```rust,ignore
//! use script_web_server::logging;
//!
//! // MUST keep guard alive for the duration of the program
//! let _guard = logging::init();
//! logging::write_line("HTTP listener started");
//! ```

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "script-web-server.jsonl";
const MAX_BUFFERED_LINES: usize = 50;

static LINE_BUFFER: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn line_buffer() -> &'static Mutex<VecDeque<String>> {
    LINE_BUFFER.get_or_init(|| Mutex::new(VecDeque::with_capacity(MAX_BUFFERED_LINES)))
}

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the dual-output logging system.
///
/// Returns a guard that MUST be kept alive for the duration of the program.
pub fn init() -> LoggingGuard {
    let log_dir = get_log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }
    let log_path = log_dir.join(LOG_FILE_NAME);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .compact();

    let file = OpenOptions::new().create(true).append(true).open(&log_path);

    let (json_layer, file_guard) = match file {
        Ok(file) => {
            // Non-blocking so a slow disk never stalls the network thread
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let json_layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(json_layer), Some(guard))
        }
        Err(e) => {
            eprintln!("[LOGGING] Failed to open log file, logging to stderr only: {}", e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Get the log directory path (~/.script-web-server/logs/)
fn get_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".script-web-server").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("script-web-server-logs"))
}

/// Path of the JSONL log file
pub fn log_path() -> PathBuf {
    get_log_dir().join(LOG_FILE_NAME)
}

/// Fire-and-forget diagnostic line. Never fails.
pub fn write_line(text: &str) {
    add_to_buffer(text);
    tracing::info!(event_type = "listener_output", "{}", text);
}

fn add_to_buffer(text: &str) {
    let mut buf = line_buffer().lock();
    if buf.len() >= MAX_BUFFERED_LINES {
        buf.pop_front();
    }
    buf.push_back(text.to_string());
}

/// All buffered lines, oldest first
pub fn recent_lines() -> Vec<String> {
    line_buffer().lock().iter().cloned().collect()
}

/// The last `n` buffered lines, newest first
pub fn last_lines(n: usize) -> Vec<String> {
    line_buffer().lock().iter().rev().take(n).cloned().collect()
}

/// Log a routed request
pub fn log_request(request_id: &str, route: &str, path: &str) {
    tracing::info!(
        event_type = "http_request",
        request_id = request_id,
        route = route,
        path = path,
        "HTTP request"
    );
}

/// Log the outcome of a dispatch to the home context
pub fn log_dispatch(request_id: &str, outcome: Result<(), &str>, duration_ms: u64) {
    match outcome {
        Ok(()) => tracing::info!(
            event_type = "dispatch",
            request_id = request_id,
            duration_ms = duration_ms,
            success = true,
            "Script executed in {}ms", duration_ms
        ),
        Err(error) => tracing::warn!(
            event_type = "dispatch",
            request_id = request_id,
            duration_ms = duration_ms,
            success = false,
            error = error,
            "Script execution failed after {}ms: {}", duration_ms, error
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// In-memory writer so a test subscriber's output can be inspected
    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    // The buffer is process-wide, so assert on unique markers only.
    #[test]
    fn test_write_line_is_buffered() {
        write_line("marker-write-line-7f3a");
        assert!(recent_lines().iter().any(|l| l == "marker-write-line-7f3a"));
    }

    #[test]
    fn test_buffer_is_bounded() {
        for i in 0..(MAX_BUFFERED_LINES + 10) {
            write_line(&format!("bounded-{}", i));
        }
        assert!(recent_lines().len() <= MAX_BUFFERED_LINES);
        assert!(last_lines(3).len() <= 3);
    }

    #[test]
    fn test_log_path_ends_with_file_name() {
        assert!(log_path().ends_with(LOG_FILE_NAME));
    }

    #[test]
    fn test_log_request_uses_fixed_message_with_fields() {
        let captured = CapturedOutput::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            log_request("req-1", "submit", "/run?x=1");
        });

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        let event: serde_json::Value = serde_json::from_str(output.lines().next().unwrap()).unwrap();
        assert_eq!(event["fields"]["message"], "HTTP request");
        assert_eq!(event["fields"]["route"], "submit");
        assert_eq!(event["fields"]["path"], "/run?x=1");
        assert_eq!(event["fields"]["request_id"], "req-1");
    }
}
