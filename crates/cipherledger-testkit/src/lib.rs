//! # CipherLedger Testkit
//!
//! Testing utilities for CipherLedger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ledger over the simulated coprocessor, plus the client
//!   side (encrypt inputs, decrypt granted handles)
//! - **Generators**: Proptest strategies for values, deltas and events
//! - **Golden vectors**: pinned events for cross-platform verification
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use cipherledger_testkit::fixtures::{players, LedgerFixture};
//!
//! # async fn demo() -> cipherledger::Result<()> {
//! let fx = LedgerFixture::new().await?;
//! let alice = &players(1)[0];
//!
//! fx.create(alice, 1, [100, 5, 5, 5, 5]).await?;
//! fx.apply(alice, 1, [10, 1, 0, 0, 0]).await?;
//! assert_eq!(fx.read(alice, 1).await?, Some([110, 6, 5, 5, 5]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Golden Vectors
//!
//! ```rust
//! use cipherledger_testkit::vectors::{all_vectors, generate_event_from_vector};
//!
//! for vector in all_vectors() {
//!     let event = generate_event_from_vector(&vector);
//!     println!("{}: {}", vector.name, event.compute_id().to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cipherledger_testkit::generators::{event_from_params, EventParams};
//!
//! proptest! {
//!     #[test]
//!     fn event_id_is_deterministic(params: EventParams) {
//!         let e1 = event_from_params(&params);
//!         let e2 = event_from_params(&params);
//!         prop_assert_eq!(e1.compute_id(), e2.compute_id());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{players, wrapping_fields_add, Fields, LedgerFixture, SimulatedLedger};
pub use generators::{event_from_params, EventParams};
pub use vectors::{all_vectors, generate_event_from_vector, verify_all_vectors, GoldenVector};
