//! Query Surface result types.
//!
//! Queries disclose existence and opaque handle references only. A
//! reference is not a capability: holding one does not allow decryption.

use cipherledger_core::{HandleRef, HandleRefs};

/// Result of `meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    pub exists: bool,
}

/// Result of `my_handles`: the caller's own five references.
///
/// For an absent record `exists` is false and every reference is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedHandles {
    pub handles: HandleRefs,
    pub exists: bool,
}

impl OwnedHandles {
    pub const ABSENT: Self = Self {
        handles: HandleRefs::EMPTY,
        exists: false,
    };
}

/// Result of `admin_xp_handle`: one owner's primary-counter reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpHandle {
    pub primary: HandleRef,
    pub exists: bool,
}

impl XpHandle {
    pub const ABSENT: Self = Self {
        primary: HandleRef::ZERO,
        exists: false,
    };
}
