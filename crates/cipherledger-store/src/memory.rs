//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use cipherledger_core::{EventId, Identity, LedgerEvent, Record, RecordId, RecordKey};

use crate::error::Result;
use crate::traits::{check_append, EventHead, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records by key.
    records: HashMap<RecordKey, Record>,

    /// The event log; `events[i]` has seq `i + 1`.
    events: Vec<LedgerEvent>,

    /// Event id -> seq.
    ids: HashMap<EventId, u64>,

    /// Caller -> seqs of its events, ascending.
    by_caller: HashMap<Identity, Vec<u64>>,

    admin: Option<Identity>,
}

impl MemoryStoreInner {
    fn head(&self) -> Option<EventHead> {
        self.events.last().map(|e| EventHead {
            seq: e.seq(),
            event_id: e.compute_id(),
        })
    }

    fn event_at(&self, seq: u64) -> Option<&LedgerEvent> {
        seq.checked_sub(1)
            .and_then(|i| self.events.get(i as usize))
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, live or not.
    pub fn record_count(&self) -> usize {
        self.read().records.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_record(&self, key: &RecordKey) -> Result<Option<Record>> {
        Ok(self.read().records.get(key).cloned())
    }

    async fn commit_transition(
        &self,
        key: &RecordKey,
        record: &Record,
        event: &LedgerEvent,
    ) -> Result<()> {
        let mut inner = self.write();

        check_append(inner.head(), event)?;

        let seq = event.seq();
        inner.records.insert(*key, record.clone());
        inner.ids.insert(event.compute_id(), seq);
        inner.by_caller.entry(*event.caller()).or_default().push(seq);
        inner.events.push(event.clone());

        Ok(())
    }

    async fn event_head(&self) -> Result<Option<EventHead>> {
        Ok(self.read().head())
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<LedgerEvent>> {
        let inner = self.read();
        Ok(inner
            .ids
            .get(id)
            .and_then(|&seq| inner.event_at(seq))
            .cloned())
    }

    async fn get_events_range(&self, start: u64, end: u64) -> Result<Vec<LedgerEvent>> {
        let inner = self.read();
        let start = start.max(1);
        if start > end {
            return Ok(Vec::new());
        }
        Ok((start..=end)
            .map_while(|seq| inner.event_at(seq).cloned())
            .collect())
    }

    async fn events_for(
        &self,
        caller: &Identity,
        record_id: Option<RecordId>,
    ) -> Result<Vec<LedgerEvent>> {
        let inner = self.read();
        let Some(seqs) = inner.by_caller.get(caller) else {
            return Ok(Vec::new());
        };

        Ok(seqs
            .iter()
            .filter_map(|&seq| inner.event_at(seq))
            .filter(|e| record_id.map_or(true, |id| e.record_id() == id))
            .cloned()
            .collect())
    }

    async fn load_admin(&self) -> Result<Option<Identity>> {
        Ok(self.read().admin)
    }

    async fn store_admin(&self, admin: &Identity) -> Result<()> {
        self.write().admin = Some(*admin);
        Ok(())
    }
}
