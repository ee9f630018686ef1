//! The Record: one owner's progressable entity.
//!
//! A record holds five ciphertext handles: a primary counter ("XP") and
//! four independent attribute accumulators ("skills"). The ledger never
//! sees the values behind them. Records are replaced wholesale on every
//! transition; no field is ever updated on its own.

use serde::{Deserialize, Serialize};

use crate::types::{HandleRef, Identity, RecordId, Width};

/// Width of the primary counter.
pub const PRIMARY_WIDTH: Width = Width::U32;

/// Width of every attribute.
pub const ATTRIBUTE_WIDTH: Width = Width::U16;

/// Number of attribute accumulators per record.
pub const ATTRIBUTE_COUNT: usize = 4;

/// Total handles per record (primary + attributes).
pub const FIELD_COUNT: usize = 1 + ATTRIBUTE_COUNT;

/// A ciphertext handle as stored in a record: an opaque reference plus
/// the width it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub reference: HandleRef,
    pub width: Width,
}

impl Handle {
    pub const fn new(reference: HandleRef, width: Width) -> Self {
        Self { reference, width }
    }

    /// The zero/uninitialised handle for a width.
    pub const fn uninitialized(width: Width) -> Self {
        Self {
            reference: HandleRef::ZERO,
            width,
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.reference.is_zero()
    }
}

/// Record Store key: records are partitioned by owner, then by record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub owner: Identity,
    pub record_id: RecordId,
}

impl RecordKey {
    pub const fn new(owner: Identity, record_id: RecordId) -> Self {
        Self { owner, record_id }
    }
}

/// The five disclosed references of a record, in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleRefs {
    pub primary: HandleRef,
    pub attributes: [HandleRef; ATTRIBUTE_COUNT],
}

impl HandleRefs {
    /// All-zero references, disclosed for records that do not exist.
    pub const EMPTY: Self = Self {
        primary: HandleRef::ZERO,
        attributes: [HandleRef::ZERO; ATTRIBUTE_COUNT],
    };

    /// References in field order: primary, attr1..attr4.
    pub fn to_array(&self) -> [HandleRef; FIELD_COUNT] {
        let [a1, a2, a3, a4] = self.attributes;
        [self.primary, a1, a2, a3, a4]
    }

    pub fn from_array(refs: [HandleRef; FIELD_COUNT]) -> Self {
        let [primary, a1, a2, a3, a4] = refs;
        Self {
            primary,
            attributes: [a1, a2, a3, a4],
        }
    }
}

/// One owner's record.
///
/// Invariants:
/// - `exists` never reverts to `false`.
/// - Once `exists`, all five handles are initialised.
/// - `primary` is always [`PRIMARY_WIDTH`]; attributes are always
///   [`ATTRIBUTE_WIDTH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub exists: bool,
    pub primary: Handle,
    pub attributes: [Handle; ATTRIBUTE_COUNT],
}

impl Default for Record {
    fn default() -> Self {
        Self {
            exists: false,
            primary: Handle::uninitialized(PRIMARY_WIDTH),
            attributes: [Handle::uninitialized(ATTRIBUTE_WIDTH); ATTRIBUTE_COUNT],
        }
    }
}

impl Record {
    /// Build a live record from five handles in field order.
    pub fn live(handles: [Handle; FIELD_COUNT]) -> Self {
        let [primary, a1, a2, a3, a4] = handles;
        Self {
            exists: true,
            primary,
            attributes: [a1, a2, a3, a4],
        }
    }

    /// Handles in field order: primary, attr1..attr4.
    pub fn handles(&self) -> [Handle; FIELD_COUNT] {
        let [a1, a2, a3, a4] = self.attributes;
        [self.primary, a1, a2, a3, a4]
    }

    /// Disclosed references of all five handles.
    pub fn references(&self) -> HandleRefs {
        HandleRefs {
            primary: self.primary.reference,
            attributes: self.attributes.map(|h| h.reference),
        }
    }

    /// Expected width for each field position.
    pub fn field_widths() -> [Width; FIELD_COUNT] {
        [
            PRIMARY_WIDTH,
            ATTRIBUTE_WIDTH,
            ATTRIBUTE_WIDTH,
            ATTRIBUTE_WIDTH,
            ATTRIBUTE_WIDTH,
        ]
    }

    /// Check the record invariants.
    pub fn is_well_formed(&self) -> bool {
        let widths_ok = self
            .handles()
            .iter()
            .zip(Self::field_widths())
            .all(|(h, w)| h.width == w);

        if !self.exists {
            return widths_ok;
        }
        widths_ok && self.handles().iter().all(Handle::is_initialized)
    }
}
