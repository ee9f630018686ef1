//! Test fixtures and helpers.
//!
//! A [`LedgerFixture`] wires a ledger to a [`SimulatedCoprocessor`] with
//! keys derived from one seed, and plays the client: it encrypts inputs
//! under the network key and decrypts the handles a caller was granted.

use cipherledger::{EncodedFields, Ledger, LedgerConfig, LedgerError, Result};
use cipherledger_core::{Blake3Hash, EventId, HandleRef, Identity, Keypair, Record, RecordId, FIELD_COUNT};
use cipherledger_fhe::{DecryptionRequest, InputBatch, InputProof, SimulatedCoprocessor, X25519StaticSecret};
use cipherledger_store::{MemoryStore, Store};

/// Plaintext field values in field order: primary, attr1..attr4.
pub type Fields = [u64; FIELD_COUNT];

/// A ledger over the simulated coprocessor.
pub type SimulatedLedger<S = MemoryStore> = Ledger<S, SimulatedCoprocessor>;

/// Seed used by [`LedgerFixture::new`].
pub const DEFAULT_SEED: [u8; 32] = [0x5e; 32];

/// A ledger plus the client-side keys needed to drive it.
pub struct LedgerFixture<S: Store = MemoryStore> {
    pub ledger: SimulatedLedger<S>,
    pub admin: Keypair,
    seed: [u8; 32],
}

impl LedgerFixture<MemoryStore> {
    /// In-memory ledger with the default seed.
    pub async fn new() -> Result<Self> {
        Self::open(MemoryStore::new(), DEFAULT_SEED).await
    }

    /// In-memory ledger with a random seed.
    pub async fn random() -> Result<Self> {
        Self::open(MemoryStore::new(), rand::random()).await
    }

    /// In-memory ledger with keys derived from `seed`.
    pub async fn with_seed(seed: [u8; 32]) -> Result<Self> {
        Self::open(MemoryStore::new(), seed).await
    }
}

impl<S: Store> LedgerFixture<S> {
    /// Open a ledger over `store` with an empty coprocessor.
    ///
    /// The ledger key, the network secret and the initial admin all derive
    /// from `seed`, so reopening a durable store with the same seed yields
    /// the same ledger identity.
    pub async fn open(store: S, seed: [u8; 32]) -> Result<Self> {
        let keypair = Keypair::from_seed(&seed);
        let backend = SimulatedCoprocessor::new(keypair.identity(), network_secret(&seed));
        Self::open_with(keypair, store, backend, seed).await
    }

    /// Reopen a ledger over `store`, reloading coprocessor state taken
    /// with [`snapshot`](Self::snapshot) so recorded handles stay usable.
    pub async fn restore(store: S, seed: [u8; 32], snapshot: &[u8]) -> Result<Self> {
        let keypair = Keypair::from_seed(&seed);
        let backend =
            SimulatedCoprocessor::restore(keypair.identity(), network_secret(&seed), snapshot)?;
        Self::open_with(keypair, store, backend, seed).await
    }

    async fn open_with(
        keypair: Keypair,
        store: S,
        backend: SimulatedCoprocessor,
        seed: [u8; 32],
    ) -> Result<Self> {
        let admin = Keypair::from_seed(&derive_seed("admin", &seed));
        let ledger = Ledger::open(
            keypair,
            store,
            backend,
            LedgerConfig::with_admin(admin.identity()),
        )
        .await?;

        Ok(Self { ledger, admin, seed })
    }

    /// Export the coprocessor's ciphertexts and grants.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(self.ledger.backend().snapshot()?)
    }

    /// The seed this fixture was opened with.
    pub fn seed(&self) -> [u8; 32] {
        self.seed
    }

    /// Encrypt five values for `caller`, as a client would.
    pub fn encrypt(&self, caller: &Identity, values: Fields) -> Result<(EncodedFields, InputProof)> {
        let mut batch = InputBatch::new(
            self.ledger.backend().network_public_key(),
            self.ledger.identity(),
            *caller,
        );
        for (value, width) in values.into_iter().zip(Record::field_widths()) {
            batch = batch.add(width, value);
        }

        let inputs = batch.encrypt()?;
        let fields = EncodedFields::from_batch(&inputs)
            .ok_or_else(|| LedgerError::InvalidProof("batch must hold five values".into()))?;
        Ok((fields, inputs.proof))
    }

    /// Encrypt `values` as `owner` and create record `record_id`.
    pub async fn create(&self, owner: &Keypair, record_id: u64, values: Fields) -> Result<EventId> {
        let caller = owner.identity();
        let (fields, proof) = self.encrypt(&caller, values)?;
        self.ledger
            .create(&caller, RecordId::new(record_id), &fields, &proof)
            .await
    }

    /// Encrypt `deltas` as `owner` and apply them to record `record_id`.
    pub async fn apply(&self, owner: &Keypair, record_id: u64, deltas: Fields) -> Result<EventId> {
        let caller = owner.identity();
        let (fields, proof) = self.encrypt(&caller, deltas)?;
        self.ledger
            .apply_delta(&caller, RecordId::new(record_id), &fields, &proof)
            .await
    }

    /// Decrypt one handle as `requester`.
    pub fn decrypt(&self, requester: &Keypair, handle: HandleRef) -> Result<u64> {
        let request = DecryptionRequest::sign(requester, &self.ledger.identity(), handle);
        Ok(self.ledger.backend().user_decrypt(&request)?)
    }

    /// Decrypt `owner`'s record through `my_handles`. `None` if absent.
    pub async fn read(&self, owner: &Keypair, record_id: u64) -> Result<Option<Fields>> {
        let owned = self
            .ledger
            .my_handles(&owner.identity(), RecordId::new(record_id))
            .await?;
        if !owned.exists {
            return Ok(None);
        }

        let mut values = [0u64; FIELD_COUNT];
        for (slot, handle) in values.iter_mut().zip(owned.handles.to_array()) {
            *slot = self.decrypt(owner, handle)?;
        }
        Ok(Some(values))
    }
}

/// Field-wise sum at each field's width, wrapping like the coprocessor.
pub fn wrapping_fields_add(a: Fields, b: Fields) -> Fields {
    let mut out = [0u64; FIELD_COUNT];
    for (i, width) in Record::field_widths().into_iter().enumerate() {
        out[i] = a[i].wrapping_add(b[i]) & width.max_value();
    }
    out
}

/// Deterministic keypairs for multi-party tests.
pub fn players(count: usize) -> Vec<Keypair> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = 1;
            seed[1] = i as u8;
            Keypair::from_seed(&seed)
        })
        .collect()
}

fn network_secret(seed: &[u8; 32]) -> X25519StaticSecret {
    X25519StaticSecret::from_bytes(derive_seed("network", seed))
}

fn derive_seed(role: &str, seed: &[u8; 32]) -> [u8; 32] {
    Blake3Hash::derive("cipherledger-testkit fixture", &[role.as_bytes(), &seed[..]]).0
}
