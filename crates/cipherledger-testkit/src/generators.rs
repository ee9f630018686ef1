//! Proptest generators for property-based testing.

use proptest::prelude::*;

use cipherledger_core::{
    EventBuilder, EventId, EventKind, HandleRef, HandleRefs, Identity, Keypair, LedgerEvent,
    RecordId, Width, ATTRIBUTE_WIDTH, PRIMARY_WIDTH,
};

use crate::fixtures::Fields;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a non-null identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 32]>()
        .prop_filter("null identity", |b| b.iter().any(|x| *x != 0))
        .prop_map(Identity::from_bytes)
}

/// Generate a record id.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<u64>().prop_map(RecordId::new)
}

/// Generate an initialised handle reference.
pub fn handle_ref() -> impl Strategy<Value = HandleRef> {
    any::<[u8; 32]>()
        .prop_filter("uninitialised handle", |b| b.iter().any(|x| *x != 0))
        .prop_map(HandleRef::from_bytes)
}

/// Generate the five references of one record.
pub fn handle_refs() -> impl Strategy<Value = HandleRefs> {
    (handle_ref(), handle_ref(), handle_ref(), handle_ref(), handle_ref())
        .prop_map(|(p, a1, a2, a3, a4)| HandleRefs::from_array([p, a1, a2, a3, a4]))
}

/// Generate an EventId.
pub fn event_id() -> impl Strategy<Value = EventId> {
    any::<[u8; 32]>().prop_map(EventId::from_bytes)
}

/// Generate a plaintext that fits `width`.
pub fn value(width: Width) -> impl Strategy<Value = u64> {
    0..=width.max_value()
}

/// Generate five plaintexts that fit their field widths.
pub fn fields() -> impl Strategy<Value = Fields> {
    (
        value(PRIMARY_WIDTH),
        value(ATTRIBUTE_WIDTH),
        value(ATTRIBUTE_WIDTH),
        value(ATTRIBUTE_WIDTH),
        value(ATTRIBUTE_WIDTH),
    )
        .prop_map(|(p, a1, a2, a3, a4)| [p, a1, a2, a3, a4])
}

/// Generate small deltas, the shape a game client actually sends.
pub fn small_deltas() -> impl Strategy<Value = Fields> {
    (0u64..=1_000, 0u64..=10, 0u64..=10, 0u64..=10, 0u64..=10)
        .prop_map(|(p, a1, a2, a3, a4)| [p, a1, a2, a3, a4])
}

/// Generate an EventKind.
pub fn event_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![Just(EventKind::RecordCreated), Just(EventKind::RecordUpdated)]
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Parameters for generating a ledger event.
#[derive(Debug, Clone)]
pub struct EventParams {
    pub ledger: Keypair,
    pub caller: Identity,
    pub record_id: RecordId,
    pub seq: u64,
    pub kind: EventKind,
    pub timestamp: i64,
    pub handles: HandleRefs,
    pub prev_event_id: Option<EventId>,
}

impl Arbitrary for EventParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            keypair(),
            identity(),
            record_id(),
            1u64..=1000u64,
            event_kind(),
            0i64..=1_700_000_000_000i64,
            handle_refs(),
            any::<Option<[u8; 32]>>(),
        )
            .prop_map(|(ledger, caller, record_id, seq, kind, ts, handles, prev)| EventParams {
                ledger,
                caller,
                record_id,
                seq,
                kind,
                timestamp: ts,
                handles,
                // Only the first event has no predecessor.
                prev_event_id: if seq == 1 {
                    None
                } else {
                    Some(EventId::from_bytes(prev.unwrap_or([0xAA; 32])))
                },
            })
            .boxed()
    }
}

/// Generate an event from parameters.
pub fn event_from_params(params: &EventParams) -> LedgerEvent {
    let mut builder = EventBuilder::new(params.kind, params.caller, params.record_id)
        .seq(params.seq)
        .timestamp(params.timestamp)
        .handles(params.handles);

    if let Some(prev) = params.prev_event_id {
        builder = builder.prev(prev);
    }

    builder.sign(&params.ledger)
}
