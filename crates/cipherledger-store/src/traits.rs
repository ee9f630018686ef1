//! Store trait: the abstract interface for ledger persistence.
//!
//! The ledger is storage-agnostic. Implementations include SQLite (primary)
//! and in-memory (tests, ephemeral hosts).

use async_trait::async_trait;
use cipherledger_core::{EventId, Identity, LedgerEvent, Record, RecordId, RecordKey};

use crate::error::Result;

/// Position of the newest event in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHead {
    pub seq: u64,
    pub event_id: EventId,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` keeps the runtime free.
///
/// # Design Notes
///
/// - **Absent means default**: `get_record` returns `None` for keys that
///   were never written; callers treat that as [`Record::default`].
/// - **Single writer path**: records change only through
///   [`commit_transition`](Store::commit_transition), which also appends
///   the event describing the change.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the record stored at `key`, if any.
    async fn get_record(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Replace the record at `key` and append `event`, atomically.
    ///
    /// # Errors
    /// - [`Conflict`](crate::StoreError::Conflict) if `event.seq()` is not
    ///   the log head plus one.
    /// - [`BrokenLink`](crate::StoreError::BrokenLink) if the event's
    ///   `prev_event_id` is not the current head.
    ///
    /// On error nothing is written.
    async fn commit_transition(
        &self,
        key: &RecordKey,
        record: &Record,
        event: &LedgerEvent,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Event log
    // ─────────────────────────────────────────────────────────────────────────

    /// The newest event's position, or `None` for an empty log.
    async fn event_head(&self) -> Result<Option<EventHead>>;

    /// Get an event by its content-addressed ID.
    async fn get_event(&self, id: &EventId) -> Result<Option<LedgerEvent>>;

    /// Events with `start <= seq <= end`, ordered by seq.
    async fn get_events_range(&self, start: u64, end: u64) -> Result<Vec<LedgerEvent>>;

    /// Events emitted for `caller`, optionally narrowed to one record,
    /// ordered by seq.
    async fn events_for(
        &self,
        caller: &Identity,
        record_id: Option<RecordId>,
    ) -> Result<Vec<LedgerEvent>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Admin slot
    // ─────────────────────────────────────────────────────────────────────────

    /// The persisted administrator, if one was ever stored.
    async fn load_admin(&self) -> Result<Option<Identity>>;

    /// Overwrite the persisted administrator.
    async fn store_admin(&self, admin: &Identity) -> Result<()>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Whether a live record exists at `key`.
    fn record_exists(
        &self,
        key: &RecordKey,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// The whole event log, ordered by seq.
    fn all_events(&self) -> impl std::future::Future<Output = Result<Vec<LedgerEvent>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn record_exists(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.get_record(key).await?.is_some_and(|r| r.exists))
    }

    async fn all_events(&self) -> Result<Vec<LedgerEvent>> {
        match self.event_head().await? {
            Some(head) => self.get_events_range(1, head.seq).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Check that `event` extends the log at `head`.
pub(crate) fn check_append(head: Option<EventHead>, event: &LedgerEvent) -> Result<()> {
    let expected = head.map_or(1, |h| h.seq + 1);
    if event.seq() != expected {
        return Err(crate::StoreError::Conflict {
            expected,
            got: event.seq(),
        });
    }
    if event.header.prev_event_id != head.map(|h| h.event_id) {
        return Err(crate::StoreError::BrokenLink { seq: event.seq() });
    }
    Ok(())
}
