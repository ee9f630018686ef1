//! Error types for CipherLedger Core.

use thiserror::Error;

use crate::types::EventId;

/// Core errors that can occur while encoding or verifying events.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unsupported event version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for event structure, signatures and chaining.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("event signed by unexpected ledger key")]
    ForeignSigner,

    #[error("invalid sequence number: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("invalid prev_event_id: expected {expected:?}, got {got:?}")]
    InvalidPrevEvent {
        expected: Option<EventId>,
        got: Option<EventId>,
    },

    #[error("event kind {0} is invalid")]
    InvalidKind(u16),

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::UnsupportedVersion(v) => ValidationError::UnsupportedVersion(v),
            CoreError::MalformedEvent(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => ValidationError::StructuralError(msg),
        }
    }
}
