//! SQLite implementation of the Store trait.
//!
//! The primary storage backend. rusqlite with bundled SQLite, wrapped in
//! async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use cipherledger_core::{EventId, Identity, LedgerEvent, Record, RecordId, RecordKey};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{check_append, EventHead, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file (and missing parent directories) and runs
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Record ids are u64; SQLite integers are i64.
///
/// Flipping the top bit before the cast maps `0..=u64::MAX` onto
/// `i64::MIN..=i64::MAX` in order, so `ORDER BY record_id` follows record
/// id order. Flipping the same bit back recovers the id.
fn record_id_to_sql(id: RecordId) -> i64 {
    (id.get() ^ SIGN_BIT) as i64
}

const SIGN_BIT: u64 = 1 << 63;

fn event_id_from_blob(bytes: Vec<u8>) -> Result<EventId> {
    EventId::try_from(bytes.as_slice())
        .map_err(|_| StoreError::InvalidData(format!("event id of {} bytes", bytes.len())))
}

fn decode_events(blobs: Vec<Vec<u8>>) -> Result<Vec<LedgerEvent>> {
    blobs.iter().map(|b| decode(b)).collect()
}

fn head_of(conn: &Connection) -> Result<Option<EventHead>> {
    let row: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT seq, event_id FROM events ORDER BY seq DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(seq, id)| {
        Ok(EventHead {
            seq: seq as u64,
            event_id: event_id_from_blob(id)?,
        })
    })
    .transpose()
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_record(&self, key: &RecordKey) -> Result<Option<Record>> {
        let key = *key;

        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT record FROM records WHERE owner = ?1 AND record_id = ?2",
                    params![key.owner.as_bytes().as_slice(), record_id_to_sql(key.record_id)],
                    |row| row.get(0),
                )
                .optional()?;

            blob.map(|b| decode(&b)).transpose()
        })
        .await
    }

    async fn commit_transition(
        &self,
        key: &RecordKey,
        record: &Record,
        event: &LedgerEvent,
    ) -> Result<()> {
        let key = *key;
        let record_blob = encode(record)?;
        let event_blob = encode(event)?;
        let event = event.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            check_append(head_of(&tx)?, &event)?;

            let seq = event.seq() as i64;
            tx.execute(
                "INSERT INTO records (owner, record_id, record, last_seq)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(owner, record_id) DO UPDATE SET
                    record = excluded.record,
                    last_seq = excluded.last_seq",
                params![
                    key.owner.as_bytes().as_slice(),
                    record_id_to_sql(key.record_id),
                    record_blob,
                    seq,
                ],
            )?;

            tx.execute(
                "INSERT INTO events (seq, event_id, caller, record_id, kind, event, committed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    seq,
                    event.compute_id().as_bytes().as_slice(),
                    event.caller().as_bytes().as_slice(),
                    record_id_to_sql(event.record_id()),
                    event.kind().to_u16() as i64,
                    event_blob,
                    now_millis(),
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn event_head(&self) -> Result<Option<EventHead>> {
        self.run(|conn| head_of(conn)).await
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<LedgerEvent>> {
        let id = *id;

        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT event FROM events WHERE event_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            blob.map(|b| decode(&b)).transpose()
        })
        .await
    }

    async fn get_events_range(&self, start: u64, end: u64) -> Result<Vec<LedgerEvent>> {
        // Clamp to SQLite's integer range; seqs never get near it.
        let start = start.min(i64::MAX as u64) as i64;
        let end = end.min(i64::MAX as u64) as i64;

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event FROM events WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq ASC",
            )?;
            let blobs = stmt
                .query_map(params![start, end], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<Vec<u8>>>>()?;
            decode_events(blobs)
        })
        .await
    }

    async fn events_for(
        &self,
        caller: &Identity,
        record_id: Option<RecordId>,
    ) -> Result<Vec<LedgerEvent>> {
        let caller = *caller;

        self.run(move |conn| {
            let blobs = match record_id {
                Some(id) => {
                    let mut stmt = conn.prepare(
                        "SELECT event FROM events
                         WHERE caller = ?1 AND record_id = ?2
                         ORDER BY seq ASC",
                    )?;
                    let rows = stmt
                        .query_map(
                            params![caller.as_bytes().as_slice(), record_id_to_sql(id)],
                            |row| row.get(0),
                        )?
                        .collect::<rusqlite::Result<Vec<Vec<u8>>>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT event FROM events WHERE caller = ?1 ORDER BY seq ASC",
                    )?;
                    let rows = stmt
                        .query_map(params![caller.as_bytes().as_slice()], |row| row.get(0))?
                        .collect::<rusqlite::Result<Vec<Vec<u8>>>>()?;
                    rows
                }
            };
            decode_events(blobs)
        })
        .await
    }

    async fn load_admin(&self) -> Result<Option<Identity>> {
        self.run(|conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row("SELECT identity FROM admin WHERE slot = 0", [], |row| {
                    row.get(0)
                })
                .optional()?;

            blob.map(|b| {
                Identity::try_from(b.as_slice()).map_err(|_| {
                    StoreError::InvalidData(format!("admin identity of {} bytes", b.len()))
                })
            })
            .transpose()
        })
        .await
    }

    async fn store_admin(&self, admin: &Identity) -> Result<()> {
        let admin = *admin;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO admin (slot, identity, updated_at) VALUES (0, ?1, ?2)
                 ON CONFLICT(slot) DO UPDATE SET
                    identity = excluded.identity,
                    updated_at = excluded.updated_at",
                params![admin.as_bytes().as_slice(), now_millis()],
            )?;
            Ok(())
        })
        .await
    }
}
