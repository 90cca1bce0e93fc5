use std::io;

use thiserror::Error;
use tracing::{error, warn};

/// Errors raised by the listener lifecycle and the accept loop
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid port '{port}': expected a number between 0 and 65535")]
    InvalidPort { port: String },

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn the accept thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("Request handling failed: {0}")]
    Request(#[from] RequestError),
}

impl ServerError {
    /// Only bind failures and loop-level accept failures stop the server.
    /// Everything else is isolated to the connection that caused it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidPort { .. } | Self::Bind { .. } | Self::Spawn(_) | Self::Accept(_) => {
                true
            }
            Self::Request(_) => false,
        }
    }

    /// Short operator-facing hint, printed next to the raw error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Bind { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
                Some("binding this port needs elevated privileges; pick a port above 1024")
            }
            Self::Bind { .. } => Some("the port may already be in use by another process"),
            Self::InvalidPort { .. } => Some("pass a numeric port, e.g. --port 8080"),
            _ => None,
        }
    }
}

/// Per-connection failures. These are logged and the loop keeps accepting.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("Request line and headers exceed the {limit} byte limit")]
    HeadTooLarge { limit: usize },

    #[error("Invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),

    #[error("Request body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("Connection I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Failures of a hop onto the home execution context
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Home execution context is unavailable")]
    ContextUnavailable,

    #[error("Dispatch was issued from the home execution context itself")]
    CalledFromHome,

    #[error("Dispatched work failed: {0:#}")]
    WorkFailed(#[source] anyhow::Error),

    #[error("Dispatched work panicked: {0}")]
    WorkPanicked(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Extension trait for logging a failure with the caller's location and moving on.
/// Use when the operation is recoverable and nobody upstream needs the error.
pub trait ResultExt<T> {
    /// Log error with caller location and return None
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = %err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = %err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_accept_are_fatal() {
        let bind = ServerError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_fatal());
        assert!(ServerError::Accept(io::Error::from(io::ErrorKind::Other)).is_fatal());
        assert!(ServerError::InvalidPort {
            port: "abc".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_request_errors_are_recoverable() {
        let err: ServerError = RequestError::MalformedRequestLine("GARBAGE".to_string()).into();
        assert!(!err.is_fatal());
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_bind_hint_depends_on_error_kind() {
        let denied = ServerError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(denied.hint().unwrap().contains("privileges"));

        let in_use = ServerError::Bind {
            addr: "127.0.0.1:8080".to_string(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(in_use.hint().unwrap().contains("in use"));
    }

    #[test]
    fn test_log_err_passes_through_ok() {
        let ok: std::result::Result<u32, RequestError> = Ok(7);
        assert_eq!(ok.log_err(), Some(7));

        let err: std::result::Result<u32, RequestError> =
            Err(RequestError::InvalidContentLength("x".to_string()));
        assert_eq!(err.warn_on_err(), None);
    }

    #[test]
    fn test_work_failed_message_includes_cause() {
        let err = DispatchError::WorkFailed(anyhow::anyhow!("syntax error at line 3"));
        assert!(err.to_string().contains("syntax error at line 3"));
    }
}
