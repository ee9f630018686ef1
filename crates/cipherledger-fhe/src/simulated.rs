//! In-process coprocessor simulation.
//!
//! Stands in for an FHE network: it opens client-sealed inputs at import
//! time and keeps the plaintexts in a private table keyed by handle.
//! Arithmetic wraps at the handle's width, like `add` on an `euintN`.
//! Nothing in the table is reachable except through
//! [`SimulatedCoprocessor::user_decrypt`], which enforces the allow-list.
//!
//! The table lives in memory. [`SimulatedCoprocessor::snapshot`] exports it
//! as CBOR and [`SimulatedCoprocessor::restore`] reloads it, so a ledger
//! reopened over a durable store can keep using the handles it recorded.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cipherledger_core::{
    Blake3Hash, Ed25519PublicKey, Ed25519Signature, Handle, HandleRef, Identity, Keypair, Width,
};

use crate::acl::CapabilityRegistry;
use crate::backend::{CiphertextBackend, ImportContext};
use crate::crypto::{X25519PublicKey, X25519StaticSecret};
use crate::error::{FheError, Result};
use crate::input::{entry_aad, entry_key_context, EncodedValue, InputProof, INPUT_VERSION};

const HANDLE_CONTEXT: &str = "cipherledger-fhe-v0-handle";
const DECRYPT_DOMAIN: &[u8] = b"cipherledger-user-decrypt-v0";

/// Marks handles minted by the coprocessor (as opposed to external inputs).
const INTERNAL_MARKER: u8 = 0xff;

struct StoredCiphertext {
    width: Width,
    plaintext: u64,
}

#[derive(Default)]
struct Inner {
    values: HashMap<HandleRef, StoredCiphertext>,
    acl: CapabilityRegistry,
    minted: u64,
}

/// Exported coprocessor state.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    ledger: Identity,
    minted: u64,
    values: Vec<(HandleRef, Width, u64)>,
    grants: Vec<(HandleRef, Identity)>,
}

/// Simulated FHE coprocessor bound to one ledger principal.
///
/// Ciphertexts and grants are never reclaimed. Handles orphaned by a
/// failed transition, and every superseded record handle, stay in the
/// table and the allow-lists for the life of the coprocessor.
pub struct SimulatedCoprocessor {
    ledger: Identity,
    network_secret: X25519StaticSecret,
    inner: RwLock<Inner>,
}

impl SimulatedCoprocessor {
    pub fn new(ledger: Identity, network_secret: X25519StaticSecret) -> Self {
        Self {
            ledger,
            network_secret,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Rebuild a coprocessor from a [`snapshot`](Self::snapshot).
    ///
    /// Fails if the snapshot was taken for another ledger principal or
    /// holds a value that does not fit its width.
    pub fn restore(
        ledger: Identity,
        network_secret: X25519StaticSecret,
        snapshot: &[u8],
    ) -> Result<Self> {
        let snapshot: Snapshot = ciborium::from_reader(snapshot)
            .map_err(|e| FheError::SerializationError(e.to_string()))?;

        if snapshot.ledger != ledger {
            return Err(FheError::SerializationError(format!(
                "snapshot belongs to {}, not {}",
                snapshot.ledger, ledger
            )));
        }

        let mut inner = Inner {
            minted: snapshot.minted,
            ..Inner::default()
        };
        for (reference, width, plaintext) in snapshot.values {
            if plaintext > width.max_value() {
                return Err(FheError::SerializationError(format!(
                    "handle {reference} overflows {width}"
                )));
            }
            inner.values.insert(reference, StoredCiphertext { width, plaintext });
        }
        for (reference, principal) in snapshot.grants {
            if !inner.values.contains_key(&reference) {
                return Err(FheError::UnknownHandle(reference));
            }
            inner.acl.grant(reference, principal);
        }

        info!(
            ciphertexts = inner.values.len(),
            grants = inner.acl.grant_count(),
            "restored coprocessor state"
        );

        Ok(Self {
            ledger,
            network_secret,
            inner: RwLock::new(inner),
        })
    }

    /// Export every ciphertext and grant as CBOR.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let inner = self.read();

        let mut values: Vec<_> = inner
            .values
            .iter()
            .map(|(reference, stored)| (*reference, stored.width, stored.plaintext))
            .collect();
        values.sort_unstable_by_key(|(reference, _, _)| *reference);

        let snapshot = Snapshot {
            ledger: self.ledger,
            minted: inner.minted,
            values,
            grants: inner.acl.grants(),
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&snapshot, &mut buf)
            .map_err(|e| FheError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Key clients seal their inputs to.
    pub fn network_public_key(&self) -> X25519PublicKey {
        self.network_secret.public_key()
    }

    /// Off-ledger owner decryption.
    ///
    /// The request must be signed by the requester, and the requester must
    /// be on the handle's allow-list.
    pub fn user_decrypt(&self, request: &DecryptionRequest) -> Result<u64> {
        request
            .requester
            .verify(
                &DecryptionRequest::message(&self.ledger, &request.handle),
                &request.signature,
            )
            .map_err(|e| FheError::DecryptionError(format!("bad request signature: {e}")))?;

        let requester = request.requester.identity();
        let inner = self.read();

        let stored = inner
            .values
            .get(&request.handle)
            .ok_or(FheError::UnknownHandle(request.handle))?;

        if !inner.acl.is_allowed(&request.handle, &requester) {
            return Err(FheError::NotAllowed {
                principal: requester,
                handle: request.handle,
            });
        }

        Ok(stored.plaintext)
    }

    /// Every principal allowed on `handle`.
    pub fn holders(&self, handle: &HandleRef) -> Vec<Identity> {
        self.read().acl.holders(handle)
    }

    /// Number of ciphertexts held.
    pub fn ciphertext_count(&self) -> usize {
        self.read().values.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn mint(&self, inner: &mut Inner, width: Width, plaintext: u64, origin: &[u8]) -> Handle {
        inner.minted += 1;
        let mut bytes = Blake3Hash::derive(
            HANDLE_CONTEXT,
            &[self.ledger.as_bytes(), &inner.minted.to_le_bytes(), origin],
        )
        .0;
        bytes[30] = width.code();
        bytes[31] = INTERNAL_MARKER;

        let reference = HandleRef::from_bytes(bytes);
        inner.values.insert(reference, StoredCiphertext { width, plaintext });
        Handle::new(reference, width)
    }

    /// Verify the encoded value against the proof and open it.
    fn open_input(
        &self,
        encoded: &EncodedValue,
        proof: &InputProof,
        ctx: &ImportContext,
    ) -> Result<u64> {
        if encoded.version() != INPUT_VERSION {
            return Err(FheError::InvalidProof(format!(
                "unsupported input version {}",
                encoded.version()
            )));
        }

        if encoded.index() != ctx.position {
            return Err(FheError::InvalidProof(format!(
                "value encoded for batch position {}, expected {}",
                encoded.index(),
                ctx.position
            )));
        }

        if encoded.width() != Some(ctx.width) {
            return Err(FheError::InvalidProof(format!(
                "value at position {} is not {}",
                ctx.position, ctx.width
            )));
        }

        let body = proof.decode()?;
        let entry = body.entries.get(ctx.position as usize).ok_or_else(|| {
            FheError::InvalidProof(format!(
                "proof covers {} values, not position {}",
                body.entries.len(),
                ctx.position
            ))
        })?;

        if entry.width != ctx.width
            || EncodedValue::derive(&entry.ciphertext, ctx.position, entry.width) != *encoded
        {
            return Err(FheError::InvalidProof(format!(
                "value at position {} is not covered by the proof",
                ctx.position
            )));
        }

        let key = self
            .network_secret
            .diffie_hellman(&body.ephemeral)
            .derive_encryption_key(&entry_key_context(ctx.position));
        let aad = entry_aad(&self.ledger, &ctx.caller, ctx.position, ctx.width);

        let plaintext = key.open(&entry.ciphertext, &aad, &entry.nonce).map_err(|_| {
            FheError::InvalidProof(format!(
                "entry {} does not authenticate for caller {}",
                ctx.position, ctx.caller
            ))
        })?;

        let bytes: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| FheError::InvalidProof("malformed plaintext".into()))?;
        let value = u64::from_le_bytes(bytes);

        if value > ctx.width.max_value() {
            return Err(FheError::InvalidProof(format!(
                "value at position {} overflows {}",
                ctx.position, ctx.width
            )));
        }

        Ok(value)
    }
}

impl CiphertextBackend for SimulatedCoprocessor {
    fn self_principal(&self) -> Identity {
        self.ledger
    }

    fn import_external(
        &self,
        encoded: &EncodedValue,
        proof: &InputProof,
        ctx: &ImportContext,
    ) -> Result<Handle> {
        let value = self.open_input(encoded, proof, ctx)?;

        let mut inner = self.write();
        let handle = self.mint(&mut inner, ctx.width, value, encoded.0.as_bytes());
        debug!(position = ctx.position, handle = %handle.reference, "imported external input");
        Ok(handle)
    }

    fn grant_principal(&self, handle: &Handle, principal: &Identity) -> Result<()> {
        let mut inner = self.write();
        if !inner.values.contains_key(&handle.reference) {
            return Err(FheError::UnknownHandle(handle.reference));
        }
        inner.acl.grant(handle.reference, *principal);
        Ok(())
    }

    fn combine(&self, a: &Handle, b: &Handle) -> Result<Handle> {
        if a.width != b.width {
            return Err(FheError::WidthMismatch {
                expected: a.width,
                got: b.width,
            });
        }

        let mut inner = self.write();

        for operand in [a, b] {
            let stored = inner
                .values
                .get(&operand.reference)
                .ok_or(FheError::UnknownHandle(operand.reference))?;
            if stored.width != operand.width {
                return Err(FheError::WidthMismatch {
                    expected: stored.width,
                    got: operand.width,
                });
            }
            if !inner.acl.is_allowed(&operand.reference, &self.ledger) {
                return Err(FheError::NotAllowed {
                    principal: self.ledger,
                    handle: operand.reference,
                });
            }
        }

        let lhs = inner.values[&a.reference].plaintext;
        let rhs = inner.values[&b.reference].plaintext;
        let sum = lhs.wrapping_add(rhs) & a.width.max_value();

        let mut origin = Vec::with_capacity(64);
        origin.extend_from_slice(a.reference.as_bytes());
        origin.extend_from_slice(b.reference.as_bytes());

        let result = self.mint(&mut inner, a.width, sum, &origin);
        debug!(lhs = %a.reference, rhs = %b.reference, result = %result.reference, "combined handles");
        Ok(result)
    }

    fn is_allowed(&self, handle: &HandleRef, principal: &Identity) -> bool {
        self.read().acl.is_allowed(handle, principal)
    }
}

/// A signed request to decrypt one handle, issued by its owner.
#[derive(Debug, Clone)]
pub struct DecryptionRequest {
    pub requester: Ed25519PublicKey,
    pub handle: HandleRef,
    pub signature: Ed25519Signature,
}

impl DecryptionRequest {
    /// Sign a request for `handle` held by `ledger`.
    pub fn sign(keypair: &Keypair, ledger: &Identity, handle: HandleRef) -> Self {
        Self {
            requester: keypair.public_key(),
            handle,
            signature: keypair.sign(&Self::message(ledger, &handle)),
        }
    }

    fn message(ledger: &Identity, handle: &HandleRef) -> Vec<u8> {
        let mut msg = Vec::with_capacity(DECRYPT_DOMAIN.len() + 64);
        msg.extend_from_slice(DECRYPT_DOMAIN);
        msg.extend_from_slice(ledger.as_bytes());
        msg.extend_from_slice(handle.as_bytes());
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputBatch;

    struct Setup {
        coprocessor: SimulatedCoprocessor,
        ledger: Identity,
        owner: Keypair,
    }

    fn setup() -> Setup {
        let ledger = Identity::from_bytes([0x01; 32]);
        Setup {
            coprocessor: SimulatedCoprocessor::new(ledger, X25519StaticSecret::from_bytes([0x02; 32])),
            ledger,
            owner: Keypair::from_seed(&[0x03; 32]),
        }
    }

    fn ctx(caller: Identity, position: u8, width: Width) -> ImportContext {
        ImportContext {
            caller,
            position,
            width,
        }
    }

    fn decrypt(s: &Setup, handle: &Handle) -> Result<u64> {
        s.coprocessor
            .user_decrypt(&DecryptionRequest::sign(&s.owner, &s.ledger, handle.reference))
    }

    #[test]
    fn test_import_then_decrypt_requires_grant() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U32, 100)
            .encrypt()
            .unwrap();

        let handle = s
            .coprocessor
            .import_external(&inputs.values[0], &inputs.proof, &ctx(caller, 0, Width::U32))
            .unwrap();
        assert_eq!(handle.width, Width::U32);

        assert!(matches!(decrypt(&s, &handle), Err(FheError::NotAllowed { .. })));

        s.coprocessor.grant_principal(&handle, &caller).unwrap();
        assert_eq!(decrypt(&s, &handle).unwrap(), 100);
    }

    #[test]
    fn test_import_rejects_wrong_position() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U16, 1)
            .add(Width::U16, 2)
            .encrypt()
            .unwrap();

        let result = s.coprocessor.import_external(
            &inputs.values[1],
            &inputs.proof,
            &ctx(caller, 0, Width::U16),
        );
        assert!(matches!(result, Err(FheError::InvalidProof(_))));
    }

    #[test]
    fn test_import_rejects_other_caller() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U32, 7)
            .encrypt()
            .unwrap();

        let thief = Identity::from_bytes([0x66; 32]);
        let result = s.coprocessor.import_external(
            &inputs.values[0],
            &inputs.proof,
            &ctx(thief, 0, Width::U32),
        );
        assert!(matches!(result, Err(FheError::InvalidProof(_))));
    }

    #[test]
    fn test_import_rejects_foreign_proof() {
        let s = setup();
        let caller = s.owner.identity();
        let key = s.coprocessor.network_public_key();
        let a = InputBatch::new(key, s.ledger, caller).add(Width::U32, 1).encrypt().unwrap();
        let b = InputBatch::new(key, s.ledger, caller).add(Width::U32, 1).encrypt().unwrap();

        let result =
            s.coprocessor
                .import_external(&a.values[0], &b.proof, &ctx(caller, 0, Width::U32));
        assert!(matches!(result, Err(FheError::InvalidProof(_))));
    }

    #[test]
    fn test_import_rejects_width_mismatch() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U16, 7)
            .encrypt()
            .unwrap();

        let result = s.coprocessor.import_external(
            &inputs.values[0],
            &inputs.proof,
            &ctx(caller, 0, Width::U32),
        );
        assert!(matches!(result, Err(FheError::InvalidProof(_))));
    }

    #[test]
    fn test_combine_requires_self_grant() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U16, 5)
            .add(Width::U16, 1)
            .encrypt()
            .unwrap();

        let a = s
            .coprocessor
            .import_external(&inputs.values[0], &inputs.proof, &ctx(caller, 0, Width::U16))
            .unwrap();
        let b = s
            .coprocessor
            .import_external(&inputs.values[1], &inputs.proof, &ctx(caller, 1, Width::U16))
            .unwrap();

        assert!(matches!(
            s.coprocessor.combine(&a, &b),
            Err(FheError::NotAllowed { .. })
        ));

        s.coprocessor.grant_self(&a).unwrap();
        s.coprocessor.grant_self(&b).unwrap();
        let sum = s.coprocessor.combine(&a, &b).unwrap();

        // Fresh result carries no grants.
        assert!(s.coprocessor.holders(&sum.reference).is_empty());

        s.coprocessor.grant_principal(&sum, &caller).unwrap();
        assert_eq!(decrypt(&s, &sum).unwrap(), 6);
    }

    #[test]
    fn test_combine_wraps_at_width() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U16, 65_535)
            .add(Width::U16, 2)
            .encrypt()
            .unwrap();

        let handles: Vec<Handle> = (0..2u8)
            .map(|i| {
                let h = s
                    .coprocessor
                    .import_external(&inputs.values[i as usize], &inputs.proof, &ctx(caller, i, Width::U16))
                    .unwrap();
                s.coprocessor.grant_self(&h).unwrap();
                h
            })
            .collect();

        let sum = s.coprocessor.combine(&handles[0], &handles[1]).unwrap();
        s.coprocessor.grant_principal(&sum, &caller).unwrap();
        assert_eq!(decrypt(&s, &sum).unwrap(), 1);
    }

    #[test]
    fn test_combine_rejects_mixed_widths() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U32, 5)
            .add(Width::U16, 1)
            .encrypt()
            .unwrap();

        let a = s
            .coprocessor
            .import_external(&inputs.values[0], &inputs.proof, &ctx(caller, 0, Width::U32))
            .unwrap();
        let b = s
            .coprocessor
            .import_external(&inputs.values[1], &inputs.proof, &ctx(caller, 1, Width::U16))
            .unwrap();

        assert!(matches!(
            s.coprocessor.combine(&a, &b),
            Err(FheError::WidthMismatch { .. })
        ));
    }

    #[test]
    fn test_forged_decryption_request_rejected() {
        let s = setup();
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U32, 9)
            .encrypt()
            .unwrap();
        let handle = s
            .coprocessor
            .import_external(&inputs.values[0], &inputs.proof, &ctx(caller, 0, Width::U32))
            .unwrap();
        s.coprocessor.grant_principal(&handle, &caller).unwrap();

        let mut request = DecryptionRequest::sign(&Keypair::generate(), &s.ledger, handle.reference);
        request.requester = s.owner.public_key();

        assert!(matches!(
            s.coprocessor.user_decrypt(&request),
            Err(FheError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_grant_unknown_handle() {
        let s = setup();
        let bogus = Handle::new(HandleRef::from_bytes([0x99; 32]), Width::U16);
        assert!(matches!(
            s.coprocessor.grant_self(&bogus),
            Err(FheError::UnknownHandle(_))
        ));
    }

    fn imported_pair(s: &Setup, a: u64, b: u64) -> (Handle, Handle) {
        let caller = s.owner.identity();
        let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
            .add(Width::U16, a)
            .add(Width::U16, b)
            .encrypt()
            .unwrap();

        let mut handles = Vec::new();
        for (i, value) in inputs.values.iter().enumerate() {
            let h = s
                .coprocessor
                .import_external(value, &inputs.proof, &ctx(caller, i as u8, Width::U16))
                .unwrap();
            s.coprocessor.grant_self(&h).unwrap();
            handles.push(h);
        }
        (handles[0], handles[1])
    }

    #[test]
    fn test_restore_keeps_values_and_grants() {
        let s = setup();
        let caller = s.owner.identity();
        let (a, b) = imported_pair(&s, 40, 2);
        let sum = s.coprocessor.combine(&a, &b).unwrap();
        s.coprocessor.grant_principal(&sum, &caller).unwrap();

        let bytes = s.coprocessor.snapshot().unwrap();
        let restored = Setup {
            coprocessor: SimulatedCoprocessor::restore(
                s.ledger,
                X25519StaticSecret::from_bytes([0x02; 32]),
                &bytes,
            )
            .unwrap(),
            ledger: s.ledger,
            owner: s.owner.clone(),
        };

        assert_eq!(restored.coprocessor.ciphertext_count(), 3);
        assert_eq!(decrypt(&restored, &sum).unwrap(), 42);
        assert_eq!(restored.coprocessor.holders(&sum.reference), s.coprocessor.holders(&sum.reference));
        assert!(!restored.coprocessor.is_allowed(&a.reference, &caller));

        // Restored handles combine, and the mint counter carries over.
        let again = restored.coprocessor.combine(&a, &b).unwrap();
        assert_ne!(again.reference, sum.reference);
        restored.coprocessor.grant_principal(&again, &caller).unwrap();
        assert_eq!(decrypt(&restored, &again).unwrap(), 42);
    }

    #[test]
    fn test_restore_rejects_other_ledger() {
        let s = setup();
        imported_pair(&s, 1, 1);
        let bytes = s.coprocessor.snapshot().unwrap();

        let result = SimulatedCoprocessor::restore(
            Identity::from_bytes([0x77; 32]),
            X25519StaticSecret::from_bytes([0x02; 32]),
            &bytes,
        );
        assert!(matches!(result, Err(FheError::SerializationError(_))));

        let garbage = SimulatedCoprocessor::restore(
            s.ledger,
            X25519StaticSecret::from_bytes([0x02; 32]),
            b"not cbor",
        );
        assert!(matches!(garbage, Err(FheError::SerializationError(_))));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn prop_combine_is_modular_addition(a in 0u64..=65_535, b in 0u64..=65_535) {
            let s = setup();
            let caller = s.owner.identity();
            let inputs = InputBatch::new(s.coprocessor.network_public_key(), s.ledger, caller)
                .add(Width::U16, a)
                .add(Width::U16, b)
                .encrypt()
                .unwrap();

            let mut handles = Vec::new();
            for (i, value) in inputs.values.iter().enumerate() {
                let h = s
                    .coprocessor
                    .import_external(value, &inputs.proof, &ctx(caller, i as u8, Width::U16))
                    .unwrap();
                s.coprocessor.grant_self(&h).unwrap();
                handles.push(h);
            }

            let sum = s.coprocessor.combine(&handles[0], &handles[1]).unwrap();
            s.coprocessor.grant_principal(&sum, &caller).unwrap();
            proptest::prop_assert_eq!(decrypt(&s, &sum).unwrap(), (a + b) % 65_536);
        }
    }
}
