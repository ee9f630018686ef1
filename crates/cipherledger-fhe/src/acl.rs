//! Capability registry: per-handle allow-lists.
//!
//! A grant `(handle, principal)` means the principal may use the handle:
//! the ledger to combine it, an owner to request decryption. Grants are
//! additive. There is no revoke.

use std::collections::{BTreeSet, HashMap};

use cipherledger_core::{HandleRef, Identity};

/// Aggregated capability state.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    /// Allow-list per handle.
    by_handle: HashMap<HandleRef, BTreeSet<Identity>>,

    /// Index: principal -> handles it may use.
    by_principal: HashMap<Identity, BTreeSet<HandleRef>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `principal` to the allow-list of `handle`.
    ///
    /// Returns `false` if the grant already existed.
    pub fn grant(&mut self, handle: HandleRef, principal: Identity) -> bool {
        let added = self.by_handle.entry(handle).or_default().insert(principal);
        if added {
            self.by_principal
                .entry(principal)
                .or_default()
                .insert(handle);
        }
        added
    }

    /// Check whether `principal` may use `handle`.
    pub fn is_allowed(&self, handle: &HandleRef, principal: &Identity) -> bool {
        self.by_handle
            .get(handle)
            .is_some_and(|holders| holders.contains(principal))
    }

    /// Every principal allowed on `handle`, in byte order.
    pub fn holders(&self, handle: &HandleRef) -> Vec<Identity> {
        self.by_handle
            .get(handle)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every handle `principal` may use.
    pub fn handles_for(&self, principal: &Identity) -> Vec<HandleRef> {
        self.by_principal
            .get(principal)
            .map(|handles| handles.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every (handle, principal) grant, sorted by handle then principal.
    pub fn grants(&self) -> Vec<(HandleRef, Identity)> {
        let mut out: Vec<_> = self
            .by_handle
            .iter()
            .flat_map(|(handle, holders)| holders.iter().map(move |p| (*handle, *p)))
            .collect();
        out.sort_unstable();
        out
    }

    /// Total number of (handle, principal) grants.
    pub fn grant_count(&self) -> usize {
        self.by_handle.values().map(BTreeSet::len).sum()
    }
}
