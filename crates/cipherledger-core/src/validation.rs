//! Event validation: signature verification, structure and chaining.

use crate::canonical::canonical_header_bytes;
use crate::crypto::Ed25519PublicKey;
use crate::error::ValidationError;
use crate::event::{LedgerEvent, EVENT_VERSION};

/// Validate an event's structure without signature verification.
pub fn validate_event_structure(event: &LedgerEvent) -> Result<(), ValidationError> {
    let header = &event.header;

    if header.version != EVENT_VERSION {
        return Err(ValidationError::UnsupportedVersion(header.version));
    }

    if header.seq == 0 {
        return Err(ValidationError::InvalidSequence {
            expected: 1,
            got: 0,
        });
    }

    if header.seq == 1 && header.prev_event_id.is_some() {
        return Err(ValidationError::InvalidPrevEvent {
            expected: None,
            got: header.prev_event_id,
        });
    }

    if header.seq > 1 && header.prev_event_id.is_none() {
        return Err(ValidationError::StructuralError(
            "seq > 1 requires prev_event_id".into(),
        ));
    }

    // A committed record never discloses an empty reference.
    if header.handles.to_array().iter().any(|r| r.is_zero()) {
        return Err(ValidationError::StructuralError(
            "event discloses an uninitialised handle".into(),
        ));
    }

    Ok(())
}

/// Validate an event's structure and its ledger signature.
pub fn validate_event(event: &LedgerEvent) -> Result<(), ValidationError> {
    validate_event_structure(event)?;

    let message = canonical_header_bytes(&event.header);
    event
        .header
        .ledger
        .verify(&message, &event.signature)
        .map_err(|_| ValidationError::SignatureFailed)
}

/// Validate a complete log prefix, in order, as emitted by `ledger`.
///
/// Checks every event individually, then that sequence numbers run
/// 1, 2, 3, ... and that each `prev_event_id` names its predecessor.
pub fn validate_event_chain(
    events: &[LedgerEvent],
    ledger: &Ed25519PublicKey,
) -> Result<(), ValidationError> {
    let mut prev = None;

    for (i, event) in events.iter().enumerate() {
        validate_event(event)?;

        if &event.header.ledger != ledger {
            return Err(ValidationError::ForeignSigner);
        }

        let expected_seq = i as u64 + 1;
        if event.header.seq != expected_seq {
            return Err(ValidationError::InvalidSequence {
                expected: expected_seq,
                got: event.header.seq,
            });
        }

        if event.header.prev_event_id != prev {
            return Err(ValidationError::InvalidPrevEvent {
                expected: prev,
                got: event.header.prev_event_id,
            });
        }

        prev = Some(event.compute_id());
    }

    Ok(())
}
