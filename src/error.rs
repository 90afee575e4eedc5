//! Error types for the agent runtime.
//!
//! Every stage converts errors into task or tool results at its own boundary;
//! nothing in this module is expected to cross a task boundary as a raw
//! `Err`. The free functions classify provider error strings so the
//! scheduler and the reliable-provider wrapper can decide between retry,
//! single scheduler-level retry, and permanent failure.

use thiserror::Error;

/// Errors produced by the runtime core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("permission denied for tool '{tool}' (requires {required})")]
    ToolDenied { tool: String, required: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("working-state error: {0}")]
    State(String),

    #[error("unknown agent kind: {0}")]
    UnknownAgent(String),

    #[error("hook '{0}' failed: {1}")]
    Hook(String, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns `true` when a provider error string describes a transient
/// condition worth retrying at the transport layer: rate limiting, server
/// errors, or network-level failures.
pub fn is_transient(message: &str) -> bool {
    const TRANSIENT_MARKERS: &[&str] = &[
        "429",
        "500",
        "502",
        "503",
        "504",
        "rate limit",
        "overloaded",
        "connection",
        "network",
        "fetch",
        "tcp",
        "reset by peer",
        "temporarily unavailable",
    ];
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) || is_abort(message)
}

/// Returns `true` when an error string describes an abort or timeout.
///
/// The scheduler uses this to decide whether a failed task is eligible for
/// its single retry with a doubled timeout.
pub fn is_abort(message: &str) -> bool {
    const ABORT_MARKERS: &[&str] = &["abort", "cancel", "timed out", "timeout", "deadline"];
    let lower = message.to_lowercase();
    ABORT_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_detection() {
        assert!(is_transient("HTTP 429 Too Many Requests"));
        assert!(is_transient("upstream returned 503"));
        assert!(is_transient("Connection refused (os error 111)"));
        assert!(is_transient("request timed out"));
        assert!(!is_transient("HTTP 401 Unauthorized"));
        assert!(!is_transient("invalid request schema"));
    }

    #[test]
    fn abort_detection() {
        assert!(is_abort("task aborted by scheduler"));
        assert!(is_abort("operation cancelled"));
        assert!(is_abort("deadline exceeded"));
        assert!(is_abort("timed out after 50ms"));
        assert!(!is_abort("file not found"));
    }

    #[test]
    fn error_display() {
        let e = Error::ToolDenied {
            tool: "file_write".into(),
            required: "write".into(),
        };
        assert_eq!(
            e.to_string(),
            "permission denied for tool 'file_write' (requires write)"
        );
        assert_eq!(Error::Timeout(30).to_string(), "timed out after 30s");
    }
}
