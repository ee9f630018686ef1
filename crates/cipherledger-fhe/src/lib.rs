//! # CipherLedger FHE
//!
//! The ciphertext-handle capability the ledger consumes, and everything on
//! the far side of it.
//!
//! ## Overview
//!
//! The ledger never performs arithmetic on visible numbers. It routes
//! opaque handles through a [`CiphertextBackend`]:
//!
//! - **import**: turn a client-encrypted external value plus a batch proof
//!   into an internal handle
//! - **combine**: homomorphic addition of two same-width handles
//! - **grant**: add a principal to a handle's allow-list
//! - **disclose**: expose the opaque reference of a handle
//!
//! ## Capability Model
//!
//! Every handle carries an allow-list in the [`CapabilityRegistry`]. Grants
//! are additive; nothing in this workspace revokes one. A freshly produced
//! combination result starts with an empty allow-list, so callers must
//! re-grant after every combine.
//!
//! ## Simulation
//!
//! [`SimulatedCoprocessor`] implements the backend in-process. Client
//! inputs are sealed with X25519 + ChaCha20-Poly1305 by an [`InputBatch`];
//! the coprocessor opens them at import time and keeps plaintexts in a
//! private table that only [`SimulatedCoprocessor::user_decrypt`] reads,
//! and only for principals on the allow-list.
//!
//! ```rust,no_run
//! use cipherledger_core::{Identity, Width};
//! use cipherledger_fhe::{InputBatch, SimulatedCoprocessor, X25519StaticSecret};
//!
//! let ledger = Identity::from_bytes([1; 32]);
//! let owner = Identity::from_bytes([2; 32]);
//! let coprocessor = SimulatedCoprocessor::new(ledger, X25519StaticSecret::generate());
//!
//! let inputs = InputBatch::new(coprocessor.network_public_key(), ledger, owner)
//!     .add(Width::U32, 100)
//!     .add(Width::U16, 5)
//!     .encrypt()
//!     .unwrap();
//! ```

pub mod acl;
pub mod backend;
pub mod crypto;
pub mod error;
pub mod input;
pub mod simulated;

pub use acl::CapabilityRegistry;
pub use backend::{CiphertextBackend, ImportContext};
pub use crypto::{
    EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey, X25519PublicKey,
    X25519StaticSecret,
};
pub use error::{FheError, Result};
pub use input::{EncodedValue, EncryptedInputs, InputBatch, InputProof};
pub use simulated::{DecryptionRequest, SimulatedCoprocessor};
