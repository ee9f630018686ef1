//! # CipherLedger Core
//!
//! Pure primitives for the encrypted-state ledger: identities, opaque
//! ciphertext handle references, the `Record` data model, and the signed
//! event log.
//!
//! This crate contains no I/O, no storage and no ciphertext arithmetic.
//! Handles are routed, never inspected.
//!
//! ## Key Types
//!
//! - [`Identity`] - An authenticated principal (owner, admin, or the ledger itself)
//! - [`RecordId`] - Owner-scoped record identifier
//! - [`HandleRef`] - Opaque 256-bit reference to a ciphertext
//! - [`Handle`] - A reference tagged with its ciphertext [`Width`]
//! - [`Record`] - One owner's progressable entity (primary counter + four attributes)
//! - [`LedgerEvent`] - Signed, hash-chained trace of a committed transition
//!
//! ## Canonicalization
//!
//! Event headers are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod record;
pub mod types;
pub mod validation;

pub use canonical::{canonical_event_bytes, canonical_header_bytes};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use event::{EventBuilder, EventHeader, EventKind, LedgerEvent, EVENT_VERSION};
pub use record::{
    Handle, HandleRefs, Record, RecordKey, ATTRIBUTE_COUNT, ATTRIBUTE_WIDTH, FIELD_COUNT,
    PRIMARY_WIDTH,
};
pub use types::{EventId, HandleRef, Identity, RecordId, Width};
pub use validation::{validate_event, validate_event_chain, validate_event_structure};
