//! Error types for the ciphertext backend.

use thiserror::Error;

use cipherledger_core::{HandleRef, Identity, Width};

/// Errors surfaced by a [`CiphertextBackend`](crate::CiphertextBackend).
#[derive(Debug, Error)]
pub enum FheError {
    /// The proof does not authenticate this encoded value at this batch
    /// position for this caller.
    #[error("invalid input proof: {0}")]
    InvalidProof(String),

    /// Operand widths differ, or a value does not fit its declared width.
    #[error("width mismatch: expected {expected}, got {got}")]
    WidthMismatch { expected: Width, got: Width },

    /// The principal holds no capability on the handle.
    #[error("{principal} is not allowed on handle {handle}")]
    NotAllowed { principal: Identity, handle: HandleRef },

    /// The handle was never produced by this backend.
    #[error("unknown handle: {0}")]
    UnknownHandle(HandleRef),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, FheError>;
