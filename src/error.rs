//! Error types for the inventory scanner
//!
//! Per-file and per-directory problems never escape a scan as `Err`; they are
//! collected as [`ErrorDescriptor`] values. [`ScanError`] is reserved for
//! contract violations detected before traversal and for collaborator
//! failures (database, config file, notifications).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Closed taxonomy of recoverable scan failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// A bounded call did not return within its budget
    Timeout,
    /// Transient filesystem error
    IoFailure,
    /// Entry vanished between enumeration and stat
    NotFound,
    /// Document container could not be read for author extraction
    UnsupportedMetadata,
}

impl ErrorKind {
    /// Collapse a platform I/O error into the closed taxonomy
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::IoFailure,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Timeout => "timeout",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnsupportedMetadata => "unsupported_metadata",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation that was in progress when a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Reading size and timestamps
    Stat,
    /// Opening an office document to read its author
    AuthorRead,
    /// Enumerating a directory
    DirectoryRead,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Stat => "stat",
            Operation::AuthorRead => "author_read",
            Operation::DirectoryRead => "directory_read",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded per-entry failure. Appended to a scan result, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{operation} failed ({kind}): {message} (path: {path:?})")]
pub struct ErrorDescriptor {
    /// The path where the error occurred
    pub path: PathBuf,
    /// What was being attempted
    pub operation: Operation,
    /// The classified kind of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl ErrorDescriptor {
    /// Create a new error descriptor
    pub fn new(
        path: impl Into<PathBuf>,
        operation: Operation,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Classify an I/O error raised by `operation` on `path`
    pub fn from_io(path: impl Into<PathBuf>, operation: Operation, err: &std::io::Error) -> Self {
        Self::new(path, operation, ErrorKind::from_io(err), err.to_string())
    }

    /// A bounded call on `path` ran past its budget
    pub fn timeout(path: impl Into<PathBuf>, operation: Operation, budget: std::time::Duration) -> Self {
        Self::new(
            path,
            operation,
            ErrorKind::Timeout,
            format!("{} did not complete within {}ms", operation, budget.as_millis()),
        )
    }

    /// Classify a directory enumeration error from walkdir
    pub fn from_walk(err: &walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
        let kind = err
            .io_error()
            .map(ErrorKind::from_io)
            .unwrap_or(ErrorKind::IoFailure);
        Self::new(path, Operation::DirectoryRead, kind, err.to_string())
    }
}

/// Errors that reject a scan outright or come from collaborators
#[derive(Debug, Error)]
pub enum ScanError {
    /// Options failed validation
    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    /// A run is already in flight on this session
    #[error("a scan is already running on this session")]
    AlreadyRunning,

    /// The session already reached a terminal state
    #[error("scan session has already finished and cannot be reused")]
    SessionSpent,

    /// I/O error outside of the walk (config files, output)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Result sink database failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Options file could not be parsed
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A notifier could not deliver its message
    #[error("notification failed: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_kind_from_io() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(ErrorKind::from_io(&denied), ErrorKind::PermissionDenied);

        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(ErrorKind::from_io(&missing), ErrorKind::NotFound);

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(ErrorKind::from_io(&timed_out), ErrorKind::Timeout);

        let other = io::Error::new(io::ErrorKind::Other, "eio");
        assert_eq!(ErrorKind::from_io(&other), ErrorKind::IoFailure);
    }

    #[test]
    fn test_descriptor_display() {
        let err = ErrorDescriptor::new(
            "/share/a.docx",
            Operation::AuthorRead,
            ErrorKind::UnsupportedMetadata,
            "invalid zip archive",
        );
        let text = err.to_string();
        assert!(text.contains("author_read"));
        assert!(text.contains("unsupported_metadata"));
        assert!(text.contains("a.docx"));
    }

    #[test]
    fn test_timeout_descriptor() {
        let err = ErrorDescriptor::timeout(
            "/share/slow.bin",
            Operation::Stat,
            std::time::Duration::from_millis(250),
        );
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.operation, Operation::Stat);
        assert!(err.message.contains("250ms"));
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::PermissionDenied).unwrap(),
            "\"permission_denied\""
        );
        assert_eq!(
            serde_json::to_string(&Operation::DirectoryRead).unwrap(),
            "\"directory_read\""
        );
    }
}
