//! # CipherLedger
//!
//! An encrypted-state ledger. Each owner keeps records of five ciphertext
//! handles (a 32-bit primary counter and four 16-bit attributes) that the
//! ledger updates by homomorphic addition without ever seeing a value.
//! Only the owner, through an off-ledger decryption flow, recovers
//! plaintext.
//!
//! ## Overview
//!
//! - **Transitions**: [`Ledger::create`] and [`Ledger::apply_delta`], each
//!   all-or-nothing and serialized behind a reentrancy latch
//! - **Queries**: [`Ledger::meta`], [`Ledger::my_handles`] and the
//!   admin-only [`Ledger::admin_xp_handle`], disclosing references only
//! - **Administration**: one administrator, replaced by
//!   [`Ledger::transfer_admin`]
//! - **Events**: every committed transition appends a signed,
//!   hash-chained [`LedgerEvent`] and notifies subscribed [`EventSink`]s
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cipherledger::{EncodedFields, Ledger, LedgerConfig, RecordId};
//! use cipherledger::core::{Keypair, Record};
//! use cipherledger::fhe::{InputBatch, SimulatedCoprocessor, X25519StaticSecret};
//! use cipherledger::store::MemoryStore;
//!
//! async fn example() {
//!     let keypair = Keypair::generate();
//!     let backend = SimulatedCoprocessor::new(keypair.identity(), X25519StaticSecret::generate());
//!     let network_key = backend.network_public_key();
//!     let admin = Keypair::generate().identity();
//!
//!     let ledger = Ledger::open(keypair, MemoryStore::new(), backend, LedgerConfig::with_admin(admin))
//!         .await
//!         .unwrap();
//!
//!     // Client side: encrypt the five starting values in field order.
//!     let player = Keypair::generate().identity();
//!     let mut batch = InputBatch::new(network_key, ledger.identity(), player);
//!     for (value, width) in [100, 5, 5, 5, 5].into_iter().zip(Record::field_widths()) {
//!         batch = batch.add(width, value);
//!     }
//!     let inputs = batch.encrypt().unwrap();
//!     let fields = EncodedFields::from_batch(&inputs).unwrap();
//!
//!     ledger.create(&player, RecordId::new(1), &fields, &inputs.proof).await.unwrap();
//!     assert!(ledger.meta(&player, RecordId::new(1)).await.unwrap().exists);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `cipherledger::core` - Core primitives (Identity, Record, LedgerEvent, etc.)
//! - `cipherledger::fhe` - Ciphertext backend trait and the simulated coprocessor
//! - `cipherledger::store` - Storage abstraction and SQLite

pub mod engine;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod query;
pub mod sink;

// Re-export component crates
pub use cipherledger_core as core;
pub use cipherledger_fhe as fhe;
pub use cipherledger_store as store;

// Re-export main types for convenience
pub use engine::EncodedFields;
pub use error::{LedgerError, Result};
pub use guard::AccessGuard;
pub use ledger::{Ledger, LedgerConfig};
pub use query::{OwnedHandles, RecordMeta, XpHandle};
pub use sink::{CollectingSink, EventSink};

// Re-export commonly used core types
pub use cipherledger_core::{
    EventId, EventKind, HandleRef, HandleRefs, Identity, Keypair, LedgerEvent, RecordId,
};
