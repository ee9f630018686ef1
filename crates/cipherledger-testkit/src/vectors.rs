//! Golden test vectors for ledger events.
//!
//! Every vector pins the inputs of one event: ledger seed, caller, record,
//! log position, kind, timestamp and disclosed references. Ed25519 is
//! deterministic, so each vector yields exactly one canonical header, one
//! signature and one event id on every platform.

use serde::Serialize;

use cipherledger_core::{
    canonical_header_bytes, EventBuilder, EventId, EventKind, HandleRef, HandleRefs, Identity,
    Keypair, LedgerEvent, RecordId,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name.
    pub name: &'static str,
    /// Ledger keypair seed.
    pub ledger_seed: [u8; 32],
    /// Caller identity bytes.
    pub caller: [u8; 32],
    pub record_id: u64,
    pub seq: u64,
    pub kind: EventKind,
    pub timestamp: i64,
    /// First byte of the five references; field `i` uses `handle_base + i`.
    pub handle_base: u8,
    /// Expected event id (hex). Empty means report only.
    pub expected_event_id: &'static str,
}

/// Derived outputs of one vector, as exported for other implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorOutput {
    pub name: String,
    pub ledger_public_key: String,
    pub header_bytes: String,
    pub signature: String,
    pub event_id: String,
}

/// All golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "first_create",
            ledger_seed: [0x01; 32],
            caller: [0x11; 32],
            record_id: 1,
            seq: 1,
            kind: EventKind::RecordCreated,
            timestamp: 1_700_000_000_000,
            handle_base: 0x20,
            expected_event_id: "",
        },
        GoldenVector {
            name: "update_after_create",
            ledger_seed: [0x01; 32],
            caller: [0x11; 32],
            record_id: 1,
            seq: 2,
            kind: EventKind::RecordUpdated,
            timestamp: 1_700_000_001_000,
            handle_base: 0x30,
            expected_event_id: "",
        },
        GoldenVector {
            name: "second_owner_same_record_id",
            ledger_seed: [0x01; 32],
            caller: [0x22; 32],
            record_id: 1,
            seq: 3,
            kind: EventKind::RecordCreated,
            timestamp: 1_700_000_002_000,
            handle_base: 0x40,
            expected_event_id: "",
        },
        GoldenVector {
            name: "max_record_id",
            ledger_seed: [0x02; 32],
            caller: [0x33; 32],
            record_id: u64::MAX,
            seq: 1,
            kind: EventKind::RecordCreated,
            timestamp: 0,
            handle_base: 0x01,
            expected_event_id: "",
        },
        GoldenVector {
            name: "negative_timestamp",
            ledger_seed: [0x02; 32],
            caller: [0x33; 32],
            record_id: 7,
            seq: 1,
            kind: EventKind::RecordCreated,
            timestamp: -1,
            handle_base: 0x50,
            expected_event_id: "",
        },
        GoldenVector {
            name: "large_seq",
            ledger_seed: [0x03; 32],
            caller: [0x44; 32],
            record_id: 42,
            seq: 1_000_000,
            kind: EventKind::RecordUpdated,
            timestamp: 1_700_000_000_000,
            handle_base: 0xf0,
            expected_event_id: "",
        },
    ]
}

/// Build the event a vector describes.
///
/// Events past seq 1 link to a fixed dummy predecessor.
pub fn generate_event_from_vector(vector: &GoldenVector) -> LedgerEvent {
    let keypair = Keypair::from_seed(&vector.ledger_seed);
    let handles = HandleRefs::from_array(std::array::from_fn(|i| {
        HandleRef::from_bytes([vector.handle_base.wrapping_add(i as u8); 32])
    }));

    let mut builder = EventBuilder::new(
        vector.kind,
        Identity::from_bytes(vector.caller),
        RecordId::new(vector.record_id),
    )
    .seq(vector.seq)
    .timestamp(vector.timestamp)
    .handles(handles);

    if vector.seq > 1 {
        builder = builder.prev(EventId::from_bytes([0xAA; 32]));
    }

    builder.sign(&keypair)
}

/// Derived outputs of one vector.
pub fn vector_output(vector: &GoldenVector) -> VectorOutput {
    let event = generate_event_from_vector(vector);
    VectorOutput {
        name: vector.name.to_string(),
        ledger_public_key: event.header.ledger.to_hex(),
        header_bytes: hex::encode(canonical_header_bytes(&event.header)),
        signature: event.signature.to_hex(),
        event_id: event.compute_id().to_hex(),
    }
}

/// All vectors' outputs as pretty-printed JSON.
pub fn vectors_json() -> serde_json::Result<String> {
    let outputs: Vec<VectorOutput> = all_vectors().iter().map(vector_output).collect();
    serde_json::to_string_pretty(&outputs)
}

/// Check every vector against its expected event id.
///
/// Returns `(name, matches, actual id)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let id = generate_event_from_vector(v).compute_id().to_hex();
            let matches = v.expected_event_id.is_empty() || id == v.expected_event_id;
            (v.name.to_string(), matches, id)
        })
        .collect()
}
