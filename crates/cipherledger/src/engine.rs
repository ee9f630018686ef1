//! Progression Engine: the create and apply-delta transitions.
//!
//! Both transitions build the next [`Record`] in a local staging buffer.
//! Nothing here touches the store; the caller commits the staged record
//! only after every import, grant and combine has succeeded. A failure
//! partway leaves at most unreferenced handles and grants behind in the
//! backend, never a partially updated record.

use tracing::debug;

use cipherledger_core::{Handle, Identity, Record, FIELD_COUNT};
use cipherledger_fhe::{CiphertextBackend, EncodedValue, EncryptedInputs, ImportContext, InputProof};

use crate::error::{LedgerError, Result};

/// The five encoded inputs of one call, in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFields {
    pub primary: EncodedValue,
    pub attributes: [EncodedValue; 4],
}

impl EncodedFields {
    pub fn new(primary: EncodedValue, attributes: [EncodedValue; 4]) -> Self {
        Self {
            primary,
            attributes,
        }
    }

    /// Take the five values of a client batch. `None` unless the batch
    /// holds exactly five values.
    pub fn from_batch(batch: &EncryptedInputs) -> Option<Self> {
        let values: [EncodedValue; FIELD_COUNT] = batch.values.as_slice().try_into().ok()?;
        let [primary, a1, a2, a3, a4] = values;
        Some(Self::new(primary, [a1, a2, a3, a4]))
    }

    /// Values in field order: primary, attr1..attr4.
    pub fn to_array(&self) -> [EncodedValue; FIELD_COUNT] {
        let [a1, a2, a3, a4] = self.attributes;
        [self.primary, a1, a2, a3, a4]
    }
}

/// One transition in progress for `caller`.
pub(crate) struct Progression<'a, B: CiphertextBackend> {
    backend: &'a B,
    caller: Identity,
}

impl<'a, B: CiphertextBackend> Progression<'a, B> {
    pub(crate) fn new(backend: &'a B, caller: Identity) -> Self {
        Self { backend, caller }
    }

    /// Stage a new record from five fresh inputs.
    pub(crate) fn stage_create(&self, fields: &EncodedFields, proof: &InputProof) -> Result<Record> {
        let handles = self.import_all(fields, proof)?;

        for handle in &handles {
            self.grant_both(handle)?;
        }

        debug!(caller = %self.caller, "staged new record");
        Ok(Record::live(handles))
    }

    /// Stage `current` plus five deltas.
    pub(crate) fn stage_update(
        &self,
        current: &Record,
        fields: &EncodedFields,
        proof: &InputProof,
    ) -> Result<Record> {
        let deltas = self.import_all(fields, proof)?;

        for delta in &deltas {
            self.backend.grant_self(delta)?;
        }

        let stored = current.handles();
        let mut staged = stored;
        for (slot, (old, delta)) in staged.iter_mut().zip(stored.iter().zip(&deltas)) {
            let sum = self.backend.combine(old, delta)?;
            self.grant_both(&sum)?;
            *slot = sum;
        }

        debug!(caller = %self.caller, "staged record update");
        Ok(Record::live(staged))
    }

    /// Import all five values against the one batch proof, in field order.
    fn import_all(&self, fields: &EncodedFields, proof: &InputProof) -> Result<[Handle; FIELD_COUNT]> {
        let values = fields.to_array();
        let widths = Record::field_widths();
        let mut handles = [Handle::uninitialized(widths[0]); FIELD_COUNT];

        for (position, ((value, width), slot)) in
            values.iter().zip(widths).zip(handles.iter_mut()).enumerate()
        {
            let ctx = ImportContext {
                caller: self.caller,
                position: position as u8,
                width,
            };
            *slot = self
                .backend
                .import_external(value, proof, &ctx)
                .map_err(|e| LedgerError::InvalidProof(e.to_string()))?;
            debug!(position, handle = %slot.reference, "imported input");
        }

        Ok(handles)
    }

    /// The ledger may combine `handle` later; the caller may decrypt it.
    fn grant_both(&self, handle: &Handle) -> Result<()> {
        self.backend.grant_self(handle)?;
        self.backend.grant_principal(handle, &self.caller)?;
        Ok(())
    }
}
