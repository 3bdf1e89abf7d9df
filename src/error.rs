//! Error types for Pitwall
//!
//! Backend-specific failures are carried as variants of [`Error`] and
//! classified into the closed [`ErrorKind`] set. The coordinator never lets
//! an `Error` escape its public operations; it logs the cause and answers
//! with a miss or a `false` success flag instead.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the cache tiers
#[derive(Error, Debug)]
pub enum Error {
    /// Redis client or protocol error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A tier call exceeded its deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Backend is not reachable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Stored payload could not be decoded
    #[error("Malformed payload: {0}")]
    Serialization(String),

    /// Record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Closed classification of every [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Tier unreachable or timed out; callers degrade to the next tier
    Connectivity,
    /// Payload could not be encoded or decoded; treated as a miss
    Serialization,
    /// Record absent
    NotFound,
    /// Anything else (disk, transaction, task failure, bad config)
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Connectivity => write!(f, "connectivity"),
            ErrorKind::Serialization => write!(f, "serialization"),
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Redis(e) => {
                if e.is_io_error()
                    || e.is_connection_refusal()
                    || e.is_connection_dropped()
                    || e.is_timeout()
                {
                    ErrorKind::Connectivity
                } else if e.kind() == redis::ErrorKind::TypeError {
                    ErrorKind::Serialization
                } else {
                    ErrorKind::Internal
                }
            }
            Error::Timeout { .. } | Error::Unavailable(_) => ErrorKind::Connectivity,
            Error::Json(_) | Error::Serialization(_) => ErrorKind::Serialization,
            Error::Sqlite(rusqlite::Error::QueryReturnedNoRows) | Error::NotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Sqlite(_)
            | Error::Io(_)
            | Error::Join(_)
            | Error::Config(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure means the backend could not be reached
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    /// Build a timeout error for the named operation
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Error::Timeout { operation, timeout }
    }
}

// =============================================================================
// Tests
// =============================================================================
