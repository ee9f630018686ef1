//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record or event serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The event does not sit at the next log position.
    #[error("event log conflict: expected seq {expected}, got {got}")]
    Conflict { expected: u64, got: u64 },

    /// The event's previous-event link does not match the log head.
    #[error("event at seq {seq} does not link to the log head")]
    BrokenLink { seq: u64 },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
