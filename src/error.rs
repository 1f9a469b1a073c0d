//! Error types for scrape-relay
//!
//! This module provides the error taxonomy for the crate, including:
//! - Startup errors that abort the process (configuration, connection)
//! - Per-cycle errors that are caught at the stage boundary and retried
//! - Transparent conversions from transport, serialization, and I/O failures
//! - Context information (preset name, task identifier, raw engine responses)

use crate::types::{TaskId, TaskStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for scrape-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scrape-relay
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues. Per-cycle variants never escape
/// the preset worker loop; only startup variants terminate the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "url")
        key: Option<String>,
    },

    /// Engine handshake failed at startup
    #[error("connection error: {0}")]
    Connection(String),

    /// Query source file for a preset is missing or unreadable
    #[error("queries for preset {preset} missing at {}", path.display())]
    QueriesMissing {
        /// The preset whose query file could not be read
        preset: String,
        /// Path that was tried
        path: PathBuf,
    },

    /// Engine rejected a task submission
    #[error("task submission rejected: {response}")]
    Submission {
        /// Raw engine response body, kept for diagnostics
        response: String,
    },

    /// Task reached the error state on the engine
    #[error("task {task} failed on the engine")]
    TaskFailed {
        /// The task that ended in the error state
        task: TaskId,
    },

    /// Task was stopped or paused before completing
    #[error("task {task} ended as {status}")]
    TaskStopped {
        /// The task that ended early
        task: TaskId,
        /// The terminal status observed (stopped or paused)
        status: TaskStatus,
    },

    /// Task completed but produced an empty result set
    #[error("task {task} produced no results")]
    NoResults {
        /// The task whose result file was empty
        task: TaskId,
    },

    /// Result payload could not be parsed as a record sequence
    #[error("parse error: {0}")]
    Parse(String),

    /// Results cannot be forwarded (no downstream configured, or rejected)
    #[error("forward error: {0}")]
    Forward(String),

    /// Engine reply was malformed (non-JSON, missing fields)
    #[error("engine error: {0}")]
    Engine(String),

    /// Network error
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is benign enough that no diagnostic report is written
    ///
    /// Empty result sets are expected between collection runs and only produce
    /// a log line, never a report file.
    pub fn is_no_results(&self) -> bool {
        matches!(self, Error::NoResults { .. })
    }

    /// Whether this error may only occur during startup and aborts the process
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::Connection(_))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::Config {
            message: "missing required key".into(),
            key: Some("url".into()),
        };
        assert_eq!(err.to_string(), "configuration error: missing required key");

        let err = Error::QueriesMissing {
            preset: "auto-ru".into(),
            path: PathBuf::from("./config/auto-ru.txt"),
        };
        assert_eq!(
            err.to_string(),
            "queries for preset auto-ru missing at ./config/auto-ru.txt"
        );

        let err = Error::TaskStopped {
            task: TaskId(42),
            status: TaskStatus::Paused,
        };
        assert_eq!(err.to_string(), "task 42 ended as paused");
    }

    #[test]
    fn submission_error_keeps_raw_response() {
        let err = Error::Submission {
            response: r#"{"success":0,"msg":"no such parser"}"#.into(),
        };
        assert!(err.to_string().contains("no such parser"));
    }

    #[test]
    fn no_results_is_the_only_silent_error() {
        assert!(Error::NoResults { task: TaskId(1) }.is_no_results());
        assert!(!Error::Parse("bad".into()).is_no_results());
        assert!(!Error::TaskFailed { task: TaskId(1) }.is_no_results());
        assert!(
            !Error::Submission {
                response: "{}".into()
            }
            .is_no_results()
        );
    }

    #[test]
    fn startup_fatal_classification() {
        assert!(
            Error::Config {
                message: "m".into(),
                key: None,
            }
            .is_startup_fatal()
        );
        assert!(Error::Connection("refused".into()).is_startup_fatal());
        assert!(!Error::Parse("bad".into()).is_startup_fatal());
        assert!(
            !Error::QueriesMissing {
                preset: "avito".into(),
                path: PathBuf::from("x"),
            }
            .is_startup_fatal()
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }

    #[test]
    fn serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
