//! Error types for the ledger.

use cipherledger_core::{Identity, RecordId, ValidationError};
use cipherledger_fhe::FheError;
use cipherledger_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
///
/// Every failure of a mutating call leaves committed state untouched: no
/// record is written and no event is emitted.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `create` on a record that already exists.
    #[error("record {record_id} of {owner} already exists")]
    AlreadyExists { owner: Identity, record_id: RecordId },

    /// Mutation of a record that does not exist.
    #[error("record {record_id} of {owner} not found")]
    NotFound { owner: Identity, record_id: RecordId },

    /// An encoded input was rejected at import (bad batch order, tampered
    /// proof, width mismatch).
    #[error("invalid input proof: {0}")]
    InvalidProof(String),

    /// Any other ciphertext backend failure (combine, grant).
    #[error("ciphertext backend error: {0}")]
    Backend(#[from] FheError),

    /// Privileged call from someone other than the administrator.
    #[error("{0} is not the administrator")]
    NotAdmin(Identity),

    /// Degenerate administrator target (the null identity).
    #[error("invalid admin target")]
    InvalidTarget,

    /// Nested call into a guarded entry point.
    #[error("reentrant call into a guarded entry point")]
    Reentrancy,

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The persisted event log failed verification.
    #[error("event log verification failed: {0}")]
    Validation(#[from] ValidationError),

    /// The ledger key and the backend disagree on the ledger principal.
    #[error("misconfigured ledger: {0}")]
    Misconfigured(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
