//! Error types shared across generators, the orchestrator and the cleanup sweep

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a per-database or per-artifact failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedEngine,
    Connection,
    Auth,
    Permission,
    Timeout,
    MetadataQuery,
    Serialization,
    CleanupIo,
    ToolNotFound,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedEngine => "UnsupportedEngineError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::MetadataQuery => "MetadataQueryError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::CleanupIo => "CleanupIOError",
            ErrorKind::ToolNotFound => "ToolNotFoundError",
            ErrorKind::Io => "IOError",
        };
        f.write_str(name)
    }
}

/// Failure inside a single database's backup
///
/// Never escapes the generator boundary: it is folded into a `failed` result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackupError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackupError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(context: &str, err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
            _ => ErrorKind::Io,
        };
        Self::new(kind, format!("{}: {}", context, err))
    }

    /// Prefix the message, keeping the kind
    pub fn with_context(self, context: &str) -> Self {
        Self {
            kind: self.kind,
            message: format!("{}: {}", context, self.message),
        }
    }

    /// Classify client error output (dump utilities, sqlcmd) by its wording
    pub fn from_client_output(fallback: ErrorKind, output: &str) -> Self {
        let message = output.trim();
        let lower = message.to_lowercase();

        let kind = if lower.contains("access denied")
            || lower.contains("login failed")
            || lower.contains("password authentication failed")
            || lower.contains("authentication failed")
            || lower.contains("no password supplied")
        {
            ErrorKind::Auth
        } else if lower.contains("permission denied")
            || lower.contains("permission was denied")
            || lower.contains("must be superuser")
        {
            ErrorKind::Permission
        } else if lower.contains("connection refused")
            || lower.contains("can't connect")
            || lower.contains("could not connect")
            || lower.contains("could not translate host name")
            || lower.contains("unknown mysql server host")
            || lower.contains("tcp provider")
            || lower.contains("named pipes provider")
            || lower.contains("login timeout expired")
        {
            ErrorKind::Connection
        } else {
            fallback
        };

        let message = if message.is_empty() {
            "client exited without an error message".to_string()
        } else {
            message.to_string()
        };

        Self::new(kind, message)
    }
}

/// Errors that abort a whole run before any generator starts
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Database '{0}' is configured more than once")]
    DuplicateDatabase(String),

    #[error("Database '{0}' is not configured")]
    UnknownDatabase(String),

    #[error("Another backup run is already in progress")]
    AlreadyRunning,

    #[error("Failed to prepare backup directory {path}: {source}")]
    BackupDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to acquire run lock: {0}")]
    Lock(#[source] std::io::Error),
}
