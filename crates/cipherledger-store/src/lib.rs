//! # CipherLedger Store
//!
//! Persistence for the ledger: the Record Store (one [`Record`] per
//! `(owner, record-id)`), the append-only event log, and the durable admin
//! slot.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests and ephemeral hosts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cipherledger_core::{Identity, RecordId, RecordKey};
//! use cipherledger_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!
//!     let key = RecordKey::new(Identity::from_bytes([1; 32]), RecordId::new(1));
//!     let record = store.get_record(&key).await.unwrap().unwrap_or_default();
//!     assert!(!record.exists);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic transitions**: a record write and its event append commit
//!   together through [`Store::commit_transition`], or not at all.
//! - **Compare-and-append**: the event must extend the current log head,
//!   otherwise the commit fails with [`StoreError::Conflict`].
//! - **No deletion**: records are only ever inserted or replaced.
//!
//! [`Record`]: cipherledger_core::Record

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{EventHead, Store, StoreExt};
