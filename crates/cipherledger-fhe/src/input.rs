//! Client-side input batches and the proofs that cover them.
//!
//! A client encrypts all inputs for one ledger call together, in field
//! order, producing one [`EncodedValue`] per input and a single
//! [`InputProof`] covering the whole batch. An encoded value is a 32-byte
//! external handle:
//!
//! ```text
//! bytes  0..21  digest of the entry ciphertext (prefix)
//! byte     21   batch index
//! bytes 22..30  digest of the entry ciphertext (suffix)
//! byte     30   width code
//! byte     31   input format version
//! ```
//!
//! Importing a value requires the proof entry at the embedded index to hash
//! to the same digest, so values cannot be reordered, swapped between
//! batches, or retyped.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use cipherledger_core::{Blake3Hash, HandleRef, Identity, Width};

use crate::crypto::{EncryptionNonce, EphemeralKeyPair, X25519PublicKey};
use crate::error::{FheError, Result};

/// Current input format version.
pub const INPUT_VERSION: u8 = 0;

/// Maximum number of values in one batch (index must fit one byte).
pub const MAX_BATCH: usize = 255;

const INDEX_BYTE: usize = 21;
const WIDTH_BYTE: usize = 30;
const VERSION_BYTE: usize = 31;

const ENCODED_CONTEXT: &str = "cipherledger-fhe-v0-encoded-value";

/// An externally encrypted value, as submitted to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedValue(pub HandleRef);

impl EncodedValue {
    /// Derive the external handle for a batch entry.
    pub fn derive(ciphertext: &[u8], index: u8, width: Width) -> Self {
        let mut bytes = Blake3Hash::derive(ENCODED_CONTEXT, &[ciphertext]).0;
        bytes[INDEX_BYTE] = index;
        bytes[WIDTH_BYTE] = width.code();
        bytes[VERSION_BYTE] = INPUT_VERSION;
        Self(HandleRef::from_bytes(bytes))
    }

    /// Batch position this value claims.
    pub fn index(&self) -> u8 {
        self.0.as_bytes()[INDEX_BYTE]
    }

    /// Width this value claims, if the code is known.
    pub fn width(&self) -> Option<Width> {
        Width::from_code(self.0.as_bytes()[WIDTH_BYTE])
    }

    pub fn version(&self) -> u8 {
        self.0.as_bytes()[VERSION_BYTE]
    }

    pub fn handle(&self) -> HandleRef {
        self.0
    }
}

/// One sealed entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEntry {
    pub width: Width,
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
}

/// Decoded body of an [`InputProof`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBody {
    pub version: u8,
    pub ephemeral: X25519PublicKey,
    pub entries: Vec<ProofEntry>,
}

/// Opaque proof bytes covering one batch of encoded values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof(Bytes);

impl InputProof {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn encode(body: &ProofBody) -> Result<Self> {
        let mut buf = Vec::new();
        ciborium::into_writer(body, &mut buf)
            .map_err(|e| FheError::SerializationError(e.to_string()))?;
        Ok(Self(buf.into()))
    }

    /// Parse the proof body.
    pub fn decode(&self) -> Result<ProofBody> {
        let body: ProofBody = ciborium::from_reader(self.as_bytes())
            .map_err(|e| FheError::InvalidProof(format!("undecodable proof: {e}")))?;
        if body.version != INPUT_VERSION {
            return Err(FheError::InvalidProof(format!(
                "unsupported proof version {}",
                body.version
            )));
        }
        Ok(body)
    }
}

/// Associated data binding an entry to its context.
pub(crate) fn entry_aad(ledger: &Identity, caller: &Identity, index: u8, width: Width) -> Vec<u8> {
    let mut aad = Vec::with_capacity(66);
    aad.extend_from_slice(ledger.as_bytes());
    aad.extend_from_slice(caller.as_bytes());
    aad.push(index);
    aad.push(width.code());
    aad
}

/// Per-entry key derivation context.
pub(crate) fn entry_key_context(index: u8) -> [u8; 1] {
    [index]
}

/// The output of [`InputBatch::encrypt`].
#[derive(Debug, Clone)]
pub struct EncryptedInputs {
    /// Encoded values in the order they were added.
    pub values: Vec<EncodedValue>,
    /// Proof covering all values.
    pub proof: InputProof,
}

/// Builder for a batch of client-side encrypted inputs.
pub struct InputBatch {
    network_key: X25519PublicKey,
    ledger: Identity,
    caller: Identity,
    values: Vec<(Width, u64)>,
}

impl InputBatch {
    /// Start a batch destined for `ledger`, submitted by `caller`.
    pub fn new(network_key: X25519PublicKey, ledger: Identity, caller: Identity) -> Self {
        Self {
            network_key,
            ledger,
            caller,
            values: Vec::new(),
        }
    }

    /// Append a plaintext of the given width.
    pub fn add(mut self, width: Width, value: u64) -> Self {
        self.values.push((width, value));
        self
    }

    /// Seal every value and produce the batch proof.
    pub fn encrypt(self) -> Result<EncryptedInputs> {
        if self.values.len() > MAX_BATCH {
            return Err(FheError::EncryptionError(format!(
                "batch of {} exceeds {MAX_BATCH} values",
                self.values.len()
            )));
        }

        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let shared = ephemeral.diffie_hellman(&self.network_key);

        let mut values = Vec::with_capacity(self.values.len());
        let mut entries = Vec::with_capacity(self.values.len());

        for (i, (width, value)) in self.values.into_iter().enumerate() {
            if value > width.max_value() {
                return Err(FheError::EncryptionError(format!(
                    "value at position {i} does not fit {width}"
                )));
            }

            let index = i as u8;
            let key = shared.derive_encryption_key(&entry_key_context(index));
            let nonce = EncryptionNonce::generate();
            let aad = entry_aad(&self.ledger, &self.caller, index, width);
            let ciphertext = key.seal(&value.to_le_bytes(), &aad, &nonce)?;

            values.push(EncodedValue::derive(&ciphertext, index, width));
            entries.push(ProofEntry {
                width,
                nonce,
                ciphertext,
            });
        }

        let proof = InputProof::encode(&ProofBody {
            version: INPUT_VERSION,
            ephemeral: ephemeral_public,
            entries,
        })?;

        Ok(EncryptedInputs { values, proof })
    }
}
