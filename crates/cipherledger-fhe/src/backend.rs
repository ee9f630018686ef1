//! The ciphertext backend trait: the only seam through which the ledger
//! touches encrypted values.

use cipherledger_core::{Handle, HandleRef, Identity, Width};

use crate::error::Result;
use crate::input::{EncodedValue, InputProof};

/// Context an import is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportContext {
    /// The identity that submitted the batch.
    pub caller: Identity,
    /// Position the ledger expects this value at in the batch.
    pub position: u8,
    /// Width the ledger expects for this field.
    pub width: Width,
}

/// Homomorphic-encryption capability consumed by the ledger.
///
/// Implementations are bound to one ledger principal (`self_principal`)
/// and are synchronous: every call succeeds or fails immediately. Methods
/// take `&self`; capability-table mutation uses interior mutability.
pub trait CiphertextBackend: Send + Sync {
    /// The ledger's own principal, target of [`grant_self`](Self::grant_self).
    fn self_principal(&self) -> Identity;

    /// Import an externally encrypted value into a fresh internal handle.
    ///
    /// Fails with [`FheError::InvalidProof`](crate::FheError::InvalidProof)
    /// if `proof` does not cover `encoded` at `ctx.position` for
    /// `ctx.caller`, or if the value is not of width `ctx.width`.
    fn import_external(
        &self,
        encoded: &EncodedValue,
        proof: &InputProof,
        ctx: &ImportContext,
    ) -> Result<Handle>;

    /// Allow `principal` to use `handle`.
    fn grant_principal(&self, handle: &Handle, principal: &Identity) -> Result<()>;

    /// Allow the ledger itself to use `handle` in later combinations.
    fn grant_self(&self, handle: &Handle) -> Result<()> {
        self.grant_principal(handle, &self.self_principal())
    }

    /// Homomorphic addition. Operands must share a width and the ledger
    /// must be allowed on both. The result has an empty allow-list.
    fn combine(&self, a: &Handle, b: &Handle) -> Result<Handle>;

    /// Expose the opaque reference of a handle.
    fn disclose(&self, handle: &Handle) -> HandleRef {
        handle.reference
    }

    /// Capability registry lookup.
    fn is_allowed(&self, handle: &HandleRef, principal: &Identity) -> bool;
}
