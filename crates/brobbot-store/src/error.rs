//! Error types for the brobbot-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Absence of data is never an error: lookups of missing keys return
//! `Ok(None)` (or an empty collection) instead.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the brain.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failed.
    #[error("msgpack encode error: {0}")]
    MessagePack(#[from] rmp_serde::encode::Error),

    /// The backing database could not be opened at startup.
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The brain was closed; no further operations are possible.
    #[error("database is closed")]
    Closed,

    /// An invalid argument or configuration value was provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The key holds a value of a different shape than the operation needs.
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// An increment targeted a value that is not an integer.
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },

    /// An increment would overflow a 64-bit integer.
    #[error("increment overflow at {key}")]
    Overflow { key: String },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
