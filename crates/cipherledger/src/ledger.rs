//! The Ledger: the encrypted-state ledger entry point.
//!
//! Ties the Access Guard, the Progression Engine, the Record Store and the
//! ciphertext backend together. Callers are identified by an
//! already-authenticated [`Identity`] supplied by the host.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use cipherledger_core::{
    validate_event_chain, EventBuilder, EventId, EventKind, HandleRefs, Identity, Keypair,
    LedgerEvent, Record, RecordId, RecordKey,
};
use cipherledger_fhe::{CiphertextBackend, InputProof};
use cipherledger_store::{Store, StoreExt};

use crate::engine::{EncodedFields, Progression};
use crate::error::{LedgerError, Result};
use crate::guard::AccessGuard;
use crate::query::{OwnedHandles, RecordMeta, XpHandle};
use crate::sink::EventSink;

/// Configuration for the Ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Administrator installed on first open. Ignored once an admin has
    /// been persisted. Must not be the null identity.
    pub initial_admin: Identity,
    /// Verify signatures and hash links of the whole event log on open.
    pub verify_event_log_on_open: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_admin: Identity::ZERO,
            verify_event_log_on_open: true,
        }
    }
}

impl LedgerConfig {
    /// Default configuration with `admin` as the deployer.
    pub fn with_admin(admin: Identity) -> Self {
        Self {
            initial_admin: admin,
            ..Self::default()
        }
    }
}

/// The main Ledger struct.
pub struct Ledger<S: Store, B: CiphertextBackend> {
    /// Signs events; its identity is the ledger principal.
    keypair: Keypair,
    store: Arc<S>,
    backend: B,
    config: LedgerConfig,
    guard: AccessGuard,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl<S: Store, B: CiphertextBackend> Ledger<S, B> {
    /// Open a ledger over `store` and `backend`.
    ///
    /// Loads the persisted administrator, or installs
    /// `config.initial_admin` on first open.
    ///
    /// # Errors
    /// - `Misconfigured` if the backend's principal is not the key's identity.
    /// - `InvalidTarget` if no admin is persisted and `initial_admin` is null.
    /// - `Validation` if `verify_event_log_on_open` is set and the log is bad.
    pub async fn open(keypair: Keypair, store: S, backend: B, config: LedgerConfig) -> Result<Self> {
        if backend.self_principal() != keypair.identity() {
            return Err(LedgerError::Misconfigured(format!(
                "backend principal {} is not the ledger identity {}",
                backend.self_principal(),
                keypair.identity()
            )));
        }

        let admin = match store.load_admin().await? {
            Some(admin) => admin,
            None => {
                if config.initial_admin.is_zero() {
                    return Err(LedgerError::InvalidTarget);
                }
                store.store_admin(&config.initial_admin).await?;
                config.initial_admin
            }
        };

        let ledger = Self {
            guard: AccessGuard::new(admin)?,
            keypair,
            store: Arc::new(store),
            backend,
            config,
            sinks: RwLock::new(Vec::new()),
        };

        if ledger.config.verify_event_log_on_open {
            ledger.verify_event_log().await?;
        }

        info!(ledger = %ledger.identity(), admin = %admin, "ledger opened");
        Ok(ledger)
    }

    /// The ledger principal (also the backend's `self_principal`).
    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the backend reference.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Create record `record_id` for `caller` from five fresh inputs.
    ///
    /// Returns the id of the `RecordCreated` event.
    ///
    /// # Errors
    /// `AlreadyExists`, `InvalidProof`, `Reentrancy`; any other failure
    /// also aborts with no state change.
    pub async fn create(
        &self,
        caller: &Identity,
        record_id: RecordId,
        fields: &EncodedFields,
        proof: &InputProof,
    ) -> Result<EventId> {
        self.guard
            .guarded(async {
                let key = RecordKey::new(*caller, record_id);

                if self.store.record_exists(&key).await? {
                    warn!(caller = %caller, record = %record_id, "create on existing record");
                    return Err(LedgerError::AlreadyExists {
                        owner: *caller,
                        record_id,
                    });
                }

                let record = Progression::new(&self.backend, *caller)
                    .stage_create(fields, proof)
                    .map_err(|e| reject(caller, record_id, e))?;

                self.commit(EventKind::RecordCreated, key, &record).await
            })
            .await
    }

    /// Add five encrypted deltas to `caller`'s record `record_id`.
    ///
    /// Returns the id of the `RecordUpdated` event.
    ///
    /// # Errors
    /// `NotFound`, `InvalidProof`, `Reentrancy`, `Backend`; every failure
    /// aborts with no state change.
    pub async fn apply_delta(
        &self,
        caller: &Identity,
        record_id: RecordId,
        fields: &EncodedFields,
        proof: &InputProof,
    ) -> Result<EventId> {
        self.guard
            .guarded(async {
                let key = RecordKey::new(*caller, record_id);

                let current = match self.store.get_record(&key).await? {
                    Some(record) if record.exists => record,
                    _ => {
                        warn!(caller = %caller, record = %record_id, "update on missing record");
                        return Err(LedgerError::NotFound {
                            owner: *caller,
                            record_id,
                        });
                    }
                };

                let record = Progression::new(&self.backend, *caller)
                    .stage_update(&current, fields, proof)
                    .map_err(|e| reject(caller, record_id, e))?;

                self.commit(EventKind::RecordUpdated, key, &record).await
            })
            .await
    }

    /// Sign and persist the event for a staged record, then notify sinks.
    async fn commit(&self, kind: EventKind, key: RecordKey, record: &Record) -> Result<EventId> {
        let head = self.store.event_head().await?;

        let mut builder = EventBuilder::new(kind, key.owner, key.record_id)
            .seq(head.map_or(1, |h| h.seq + 1))
            .timestamp(now_millis())
            .handles(self.disclose_all(record));
        if let Some(head) = head {
            builder = builder.prev(head.event_id);
        }
        let event = builder.sign(&self.keypair);
        let event_id = event.compute_id();

        self.store.commit_transition(&key, record, &event).await?;

        info!(
            seq = event.seq(),
            kind = ?kind,
            caller = %key.owner,
            record = %key.record_id,
            event = %event_id,
            "committed transition"
        );

        self.notify(&event).await;
        Ok(event_id)
    }

    async fn notify(&self, event: &LedgerEvent) {
        let sinks: Vec<Arc<dyn EventSink>> = self
            .sinks
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone());

        for sink in sinks {
            sink.on_event(event).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `owner` has a record `record_id`.
    pub async fn meta(&self, owner: &Identity, record_id: RecordId) -> Result<RecordMeta> {
        let exists = self
            .store
            .record_exists(&RecordKey::new(*owner, record_id))
            .await?;
        Ok(RecordMeta { exists })
    }

    /// The caller's own five handle references for `record_id`.
    pub async fn my_handles(&self, caller: &Identity, record_id: RecordId) -> Result<OwnedHandles> {
        match self.live_record(caller, record_id).await? {
            Some(record) => Ok(OwnedHandles {
                handles: self.disclose_all(&record),
                exists: true,
            }),
            None => Ok(OwnedHandles::ABSENT),
        }
    }

    /// `owner`'s primary-counter reference, disclosed to the administrator.
    ///
    /// An absent record yields `exists == false` and a zero reference.
    pub async fn admin_xp_handle(
        &self,
        caller: &Identity,
        owner: &Identity,
        record_id: RecordId,
    ) -> Result<XpHandle> {
        self.guard.require_admin(caller).await?;

        match self.live_record(owner, record_id).await? {
            Some(record) => Ok(XpHandle {
                primary: self.backend.disclose(&record.primary),
                exists: true,
            }),
            None => Ok(XpHandle::ABSENT),
        }
    }

    fn disclose_all(&self, record: &Record) -> HandleRefs {
        HandleRefs::from_array(record.handles().map(|h| self.backend.disclose(&h)))
    }

    async fn live_record(&self, owner: &Identity, record_id: RecordId) -> Result<Option<Record>> {
        Ok(self
            .store
            .get_record(&RecordKey::new(*owner, record_id))
            .await?
            .filter(|r| r.exists))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// The current administrator.
    pub async fn admin(&self) -> Identity {
        self.guard.admin().await
    }

    /// Hand the administrator role to `new_admin`.
    ///
    /// # Errors
    /// `NotAdmin` if `caller` is not the administrator, `InvalidTarget` if
    /// `new_admin` is the null identity.
    pub async fn transfer_admin(&self, caller: &Identity, new_admin: Identity) -> Result<()> {
        let store = &self.store;
        let previous = self
            .guard
            .transfer(caller, new_admin, |admin| async move {
                store.store_admin(&admin).await?;
                Ok(())
            })
            .await?;

        info!(from = %previous, to = %new_admin, "admin transferred");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event log
    // ─────────────────────────────────────────────────────────────────────────

    /// Events emitted for `owner`, optionally for one record only.
    pub async fn events_for(
        &self,
        owner: &Identity,
        record_id: Option<RecordId>,
    ) -> Result<Vec<LedgerEvent>> {
        Ok(self.store.events_for(owner, record_id).await?)
    }

    /// Events with `start <= seq <= end`.
    pub async fn event_log(&self, start: u64, end: u64) -> Result<Vec<LedgerEvent>> {
        Ok(self.store.get_events_range(start, end).await?)
    }

    /// Check signatures, numbering and hash links of the whole log.
    ///
    /// Returns the number of events verified.
    pub async fn verify_event_log(&self) -> Result<usize> {
        let events = self.store.all_events().await?;
        validate_event_chain(&events, &self.keypair.public_key())?;
        Ok(events.len())
    }

    /// Register a sink for committed events.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }
}

fn reject(caller: &Identity, record_id: RecordId, error: LedgerError) -> LedgerError {
    warn!(caller = %caller, record = %record_id, error = %error, "transition rejected");
    error
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock, Weak};

    use async_trait::async_trait;
    use cipherledger_core::{Handle, HandleRef};
    use cipherledger_fhe::{
        DecryptionRequest, EncodedValue, FheError, ImportContext, InputBatch,
        SimulatedCoprocessor, X25519PublicKey, X25519StaticSecret,
    };
    use cipherledger_store::MemoryStore;

    use crate::sink::CollectingSink;

    type TestLedger = Ledger<MemoryStore, SimulatedCoprocessor>;

    const LEDGER_SEED: [u8; 32] = [0x10; 32];

    fn admin() -> Keypair {
        Keypair::from_seed(&[0xad; 32])
    }

    fn player(n: u8) -> Keypair {
        Keypair::from_seed(&[n; 32])
    }

    fn backend() -> SimulatedCoprocessor {
        SimulatedCoprocessor::new(
            Keypair::from_seed(&LEDGER_SEED).identity(),
            X25519StaticSecret::from_bytes([0x20; 32]),
        )
    }

    async fn open() -> TestLedger {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        Ledger::open(
            Keypair::from_seed(&LEDGER_SEED),
            MemoryStore::new(),
            backend(),
            LedgerConfig::with_admin(admin().identity()),
        )
        .await
        .unwrap()
    }

    fn encrypt(ledger: &TestLedger, caller: &Identity, values: [u64; 5]) -> (EncodedFields, InputProof) {
        seal(ledger.backend().network_public_key(), ledger.identity(), caller, values)
    }

    fn seal(
        network: X25519PublicKey,
        ledger: Identity,
        caller: &Identity,
        values: [u64; 5],
    ) -> (EncodedFields, InputProof) {
        let mut batch = InputBatch::new(network, ledger, *caller);
        for (value, width) in values.into_iter().zip(Record::field_widths()) {
            batch = batch.add(width, value);
        }
        let inputs = batch.encrypt().unwrap();
        (EncodedFields::from_batch(&inputs).unwrap(), inputs.proof)
    }

    fn decrypt(ledger: &TestLedger, owner: &Keypair, handle: HandleRef) -> u64 {
        let request = DecryptionRequest::sign(owner, &ledger.identity(), handle);
        ledger.backend().user_decrypt(&request).unwrap()
    }

    #[tokio::test]
    async fn test_open_rejects_mismatched_backend() {
        let other = SimulatedCoprocessor::new(
            Identity::from_bytes([0x99; 32]),
            X25519StaticSecret::from_bytes([0x20; 32]),
        );
        let result = Ledger::open(
            Keypair::from_seed(&LEDGER_SEED),
            MemoryStore::new(),
            other,
            LedgerConfig::with_admin(admin().identity()),
        )
        .await;
        assert!(matches!(result, Err(LedgerError::Misconfigured(_))));
    }

    #[tokio::test]
    async fn test_open_requires_initial_admin() {
        let result = Ledger::open(
            Keypair::from_seed(&LEDGER_SEED),
            MemoryStore::new(),
            backend(),
            LedgerConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(LedgerError::InvalidTarget)));
    }

    #[tokio::test]
    async fn test_open_persists_initial_admin() {
        let ledger = open().await;
        assert_eq!(ledger.admin().await, admin().identity());
        assert_eq!(
            ledger.store().load_admin().await.unwrap(),
            Some(admin().identity())
        );
    }

    #[tokio::test]
    async fn test_create_then_meta() {
        let ledger = open().await;
        let alice = player(1);
        let id = RecordId::new(1);

        assert!(!ledger.meta(&alice.identity(), id).await.unwrap().exists);

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [100, 5, 5, 5, 5]);
        ledger.create(&alice.identity(), id, &fields, &proof).await.unwrap();

        assert!(ledger.meta(&alice.identity(), id).await.unwrap().exists);
        assert!(!ledger.meta(&alice.identity(), RecordId::new(2)).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_second_create_rejected_and_handles_unchanged() {
        let ledger = open().await;
        let alice = player(1);
        let id = RecordId::new(1);

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [100, 5, 5, 5, 5]);
        ledger.create(&alice.identity(), id, &fields, &proof).await.unwrap();
        let before = ledger.my_handles(&alice.identity(), id).await.unwrap();

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [1, 1, 1, 1, 1]);
        let err = ledger
            .create(&alice.identity(), id, &fields, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { .. }));

        assert_eq!(ledger.my_handles(&alice.identity(), id).await.unwrap(), before);
        assert_eq!(ledger.event_log(1, u64::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_delta_on_missing_record() {
        let ledger = open().await;
        let bob = player(2);
        let id = RecordId::new(9);

        let (fields, proof) = encrypt(&ledger, &bob.identity(), [1, 1, 1, 1, 1]);
        let err = ledger
            .apply_delta(&bob.identity(), id, &fields, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        assert!(!ledger.meta(&bob.identity(), id).await.unwrap().exists);
        assert_eq!(
            ledger.my_handles(&bob.identity(), id).await.unwrap(),
            OwnedHandles::ABSENT
        );
        assert!(ledger.event_log(1, u64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_delta_adds_and_regrants() {
        let ledger = open().await;
        let alice = player(1);
        let id = RecordId::new(1);

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [100, 5, 5, 5, 5]);
        ledger.create(&alice.identity(), id, &fields, &proof).await.unwrap();

        let (deltas, proof) = encrypt(&ledger, &alice.identity(), [10, 1, 0, 0, 0]);
        ledger
            .apply_delta(&alice.identity(), id, &deltas, &proof)
            .await
            .unwrap();

        let owned = ledger.my_handles(&alice.identity(), id).await.unwrap();
        assert!(owned.exists);
        let values: Vec<u64> = owned
            .handles
            .to_array()
            .iter()
            .map(|h| decrypt(&ledger, &alice, *h))
            .collect();
        assert_eq!(values, vec![110, 6, 5, 5, 5]);

        for handle in owned.handles.to_array() {
            assert!(ledger.backend().is_allowed(&handle, &ledger.identity()));
            assert!(ledger.backend().is_allowed(&handle, &alice.identity()));
        }
    }

    #[tokio::test]
    async fn test_proof_for_other_caller_rejected_without_state_change() {
        let ledger = open().await;
        let alice = player(1);
        let mallory = player(3);
        let id = RecordId::new(1);

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [100, 5, 5, 5, 5]);
        let err = ledger
            .create(&mallory.identity(), id, &fields, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof(_)));

        assert!(!ledger.meta(&mallory.identity(), id).await.unwrap().exists);
        assert!(ledger.event_log(1, u64::MAX).await.unwrap().is_empty());
        assert_eq!(ledger.store().record_count(), 0);
    }

    #[tokio::test]
    async fn test_admin_xp_handle() {
        let ledger = open().await;
        let alice = player(1);
        let id = RecordId::new(4);

        let err = ledger
            .admin_xp_handle(&alice.identity(), &alice.identity(), id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotAdmin(_)));

        let absent = ledger
            .admin_xp_handle(&admin().identity(), &alice.identity(), id)
            .await
            .unwrap();
        assert_eq!(absent, XpHandle::ABSENT);

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [100, 5, 5, 5, 5]);
        ledger.create(&alice.identity(), id, &fields, &proof).await.unwrap();

        let xp = ledger
            .admin_xp_handle(&admin().identity(), &alice.identity(), id)
            .await
            .unwrap();
        assert!(xp.exists);
        let owned = ledger.my_handles(&alice.identity(), id).await.unwrap();
        assert_eq!(xp.primary, owned.handles.primary);

        // A reference is not a capability.
        assert!(!ledger.backend().is_allowed(&xp.primary, &admin().identity()));
    }

    #[tokio::test]
    async fn test_transfer_admin() {
        let ledger = open().await;
        let successor = player(7).identity();

        let err = ledger
            .transfer_admin(&successor, successor)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotAdmin(_)));

        let err = ledger
            .transfer_admin(&admin().identity(), Identity::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTarget));
        assert_eq!(ledger.admin().await, admin().identity());

        ledger
            .transfer_admin(&admin().identity(), successor)
            .await
            .unwrap();
        assert_eq!(ledger.admin().await, successor);
        assert_eq!(ledger.store().load_admin().await.unwrap(), Some(successor));

        let err = ledger
            .admin_xp_handle(&admin().identity(), &successor, RecordId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotAdmin(_)));
        ledger
            .admin_xp_handle(&successor, &successor, RecordId::new(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_events_chain_and_verify() {
        let ledger = open().await;
        let sink = Arc::new(CollectingSink::new());
        ledger.subscribe(sink.clone());

        let alice = player(1);
        let bob = player(2);

        for (who, id) in [(&alice, 1), (&bob, 1), (&alice, 2)] {
            let (fields, proof) = encrypt(&ledger, &who.identity(), [1, 2, 3, 4, 5]);
            ledger
                .create(&who.identity(), RecordId::new(id), &fields, &proof)
                .await
                .unwrap();
        }
        let (deltas, proof) = encrypt(&ledger, &alice.identity(), [1, 1, 1, 1, 1]);
        let last = ledger
            .apply_delta(&alice.identity(), RecordId::new(1), &deltas, &proof)
            .await
            .unwrap();

        assert_eq!(ledger.verify_event_log().await.unwrap(), 4);

        let log = ledger.event_log(1, 4).await.unwrap();
        assert_eq!(sink.events(), log);
        assert_eq!(log[3].compute_id(), last);
        assert_eq!(log[3].kind(), EventKind::RecordUpdated);

        let alice_one = ledger
            .events_for(&alice.identity(), Some(RecordId::new(1)))
            .await
            .unwrap();
        assert_eq!(alice_one.len(), 2);
        assert_eq!(
            *alice_one[1].handles(),
            ledger.my_handles(&alice.identity(), RecordId::new(1)).await.unwrap().handles
        );
    }

    /// Calls back into the ledger from inside the notification.
    struct ReentrantSink {
        ledger: OnceLock<Weak<TestLedger>>,
        replay: Mutex<Option<(EncodedFields, InputProof)>>,
        outcome: Mutex<Option<Result<EventId>>>,
    }

    #[async_trait]
    impl EventSink for ReentrantSink {
        async fn on_event(&self, event: &LedgerEvent) {
            let Some(ledger) = self.ledger.get().and_then(Weak::upgrade) else {
                return;
            };
            let replay = self.replay.lock().unwrap().take();
            if let Some((fields, proof)) = replay {
                let result = ledger
                    .create(event.caller(), RecordId::new(99), &fields, &proof)
                    .await;
                *self.outcome.lock().unwrap() = Some(result);
            }
        }
    }

    #[tokio::test]
    async fn test_sink_reentry_rejected() {
        let ledger = Arc::new(open().await);
        let alice = player(1);

        let sink = Arc::new(ReentrantSink {
            ledger: OnceLock::new(),
            replay: Mutex::new(Some(encrypt(&ledger, &alice.identity(), [1, 1, 1, 1, 1]))),
            outcome: Mutex::new(None),
        });
        let _ = sink.ledger.set(Arc::downgrade(&ledger));
        ledger.subscribe(sink.clone());

        let (fields, proof) = encrypt(&ledger, &alice.identity(), [100, 5, 5, 5, 5]);
        ledger
            .create(&alice.identity(), RecordId::new(1), &fields, &proof)
            .await
            .unwrap();

        let outcome = sink.outcome.lock().unwrap().take();
        assert!(matches!(outcome, Some(Err(LedgerError::Reentrancy))));
        assert!(!ledger.meta(&alice.identity(), RecordId::new(99)).await.unwrap().exists);

        // Latch released: a fresh call succeeds.
        let (fields, proof) = encrypt(&ledger, &alice.identity(), [1, 1, 1, 1, 1]);
        ledger
            .apply_delta(&alice.identity(), RecordId::new(1), &fields, &proof)
            .await
            .unwrap();
    }

    /// Fails the `fail_at`-th combine (1-based) and forwards everything else.
    struct FailingCombine {
        inner: SimulatedCoprocessor,
        combines: AtomicUsize,
        fail_at: usize,
    }

    impl CiphertextBackend for FailingCombine {
        fn self_principal(&self) -> Identity {
            self.inner.self_principal()
        }

        fn import_external(
            &self,
            encoded: &EncodedValue,
            proof: &InputProof,
            ctx: &ImportContext,
        ) -> cipherledger_fhe::Result<Handle> {
            self.inner.import_external(encoded, proof, ctx)
        }

        fn grant_principal(&self, handle: &Handle, principal: &Identity) -> cipherledger_fhe::Result<()> {
            self.inner.grant_principal(handle, principal)
        }

        fn combine(&self, a: &Handle, b: &Handle) -> cipherledger_fhe::Result<Handle> {
            if self.combines.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(FheError::EncryptionError("coprocessor unavailable".into()));
            }
            self.inner.combine(a, b)
        }

        fn is_allowed(&self, handle: &HandleRef, principal: &Identity) -> bool {
            self.inner.is_allowed(handle, principal)
        }
    }

    #[tokio::test]
    async fn test_combine_failure_midway_commits_nothing() {
        let ledger = Ledger::open(
            Keypair::from_seed(&LEDGER_SEED),
            MemoryStore::new(),
            FailingCombine {
                inner: backend(),
                combines: AtomicUsize::new(0),
                fail_at: 3,
            },
            LedgerConfig::with_admin(admin().identity()),
        )
        .await
        .unwrap();
        let network = ledger.backend().inner.network_public_key();
        let alice = player(1);
        let id = RecordId::new(1);

        let (fields, proof) = seal(network, ledger.identity(), &alice.identity(), [100, 5, 5, 5, 5]);
        ledger.create(&alice.identity(), id, &fields, &proof).await.unwrap();
        let before = ledger.my_handles(&alice.identity(), id).await.unwrap();
        let log = ledger.event_log(1, u64::MAX).await.unwrap();

        // Primary and first attribute combine, the second attribute fails.
        let (deltas, proof) = seal(network, ledger.identity(), &alice.identity(), [10, 1, 1, 1, 1]);
        let err = ledger
            .apply_delta(&alice.identity(), id, &deltas, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Backend(FheError::EncryptionError(_))));
        assert_eq!(ledger.backend().combines.load(Ordering::SeqCst), 3);

        assert_eq!(ledger.my_handles(&alice.identity(), id).await.unwrap(), before);
        assert_eq!(ledger.event_log(1, u64::MAX).await.unwrap(), log);
        assert_eq!(ledger.verify_event_log().await.unwrap(), 1);

        // The next update starts from the untouched record.
        let (deltas, proof) = seal(network, ledger.identity(), &alice.identity(), [1, 0, 0, 0, 2]);
        ledger
            .apply_delta(&alice.identity(), id, &deltas, &proof)
            .await
            .unwrap();
        let values: Vec<u64> = ledger
            .my_handles(&alice.identity(), id)
            .await
            .unwrap()
            .handles
            .to_array()
            .iter()
            .map(|h| {
                let request = DecryptionRequest::sign(&alice, &ledger.identity(), *h);
                ledger.backend().inner.user_decrypt(&request).unwrap()
            })
            .collect();
        assert_eq!(values, vec![101, 5, 5, 5, 7]);
    }
}
