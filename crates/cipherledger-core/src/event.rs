//! Ledger events: the externally observable trace of state change.
//!
//! Every committed create or update produces exactly one event. Events are
//! signed by the ledger key, numbered from 1, and hash-chained through
//! `prev_event_id`. A failed call produces no event.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_event_bytes, canonical_header_bytes};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::record::HandleRefs;
use crate::types::{EventId, Identity, RecordId};

/// The current event schema version.
pub const EVENT_VERSION: u8 = 0;

/// Which transition an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventKind {
    /// A record was created.
    RecordCreated = 0x0001,
    /// Deltas were applied to an existing record.
    RecordUpdated = 0x0002,
}

impl EventKind {
    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::RecordCreated),
            0x0002 => Some(Self::RecordUpdated),
            _ => None,
        }
    }
}

/// Event metadata. The canonical encoding of this header is what the
/// ledger signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// Public key of the ledger that emitted the event.
    pub ledger: Ed25519PublicKey,

    /// Position in the ledger's event log (1-indexed).
    pub seq: u64,

    /// Emission time (Unix milliseconds). Informational only.
    pub timestamp: i64,

    /// The transition recorded.
    pub kind: EventKind,

    /// The identity that performed the transition (and owns the record).
    pub caller: Identity,

    /// The record that changed.
    pub record_id: RecordId,

    /// The record's five handle references after the transition.
    pub handles: HandleRefs,

    /// Id of the previous event in the log (None if seq=1).
    pub prev_event_id: Option<EventId>,
}

/// A complete event: header + ledger signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub header: EventHeader,

    /// Ed25519 signature over the canonical header.
    pub signature: Ed25519Signature,
}

impl LedgerEvent {
    /// Compute the event ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> EventId {
        EventId(Blake3Hash::hash(&canonical_event_bytes(self)).0)
    }

    pub fn seq(&self) -> u64 {
        self.header.seq
    }

    pub fn kind(&self) -> EventKind {
        self.header.kind
    }

    pub fn caller(&self) -> &Identity {
        &self.header.caller
    }

    pub fn record_id(&self) -> RecordId {
        self.header.record_id
    }

    pub fn handles(&self) -> &HandleRefs {
        &self.header.handles
    }

    /// Serialize to CBOR bytes (storage form, not the signed form).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization into Vec cannot fail");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}

/// Builder for ledger events.
pub struct EventBuilder {
    kind: EventKind,
    caller: Identity,
    record_id: RecordId,
    seq: u64,
    timestamp: i64,
    handles: HandleRefs,
    prev_event_id: Option<EventId>,
}

impl EventBuilder {
    /// Start building an event for a transition on `(caller, record_id)`.
    pub fn new(kind: EventKind, caller: Identity, record_id: RecordId) -> Self {
        Self {
            kind,
            caller,
            record_id,
            seq: 1,
            timestamp: 0,
            handles: HandleRefs::EMPTY,
            prev_event_id: None,
        }
    }

    /// Set the log position.
    pub fn seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the disclosed handle references.
    pub fn handles(mut self, handles: HandleRefs) -> Self {
        self.handles = handles;
        self
    }

    /// Set the previous event ID.
    pub fn prev(mut self, prev: EventId) -> Self {
        self.prev_event_id = Some(prev);
        self
    }

    /// Build and sign with the ledger key.
    pub fn sign(self, ledger_key: &Keypair) -> LedgerEvent {
        let header = EventHeader {
            version: EVENT_VERSION,
            ledger: ledger_key.public_key(),
            seq: self.seq,
            timestamp: self.timestamp,
            kind: self.kind,
            caller: self.caller,
            record_id: self.record_id,
            handles: self.handles,
            prev_event_id: self.prev_event_id,
        };

        let signature = ledger_key.sign(&canonical_header_bytes(&header));
        LedgerEvent { header, signature }
    }
}
