//! Append-only event log backed by SQLite
//!
//! The log owns sequence allocation. Every event row carries a
//! `sequence_number` with a UNIQUE constraint, and a cached counter
//! (`metadata.last_sequence`) is advanced in the same transaction as each
//! insert.
//!
//! Allocation never trusts the counter alone: the true maximum is
//! re-derived from the `events` table and the larger of the two wins. A
//! counter left behind by an unclean shutdown, or by a writer that bypassed
//! it, is repaired on the spot. A collision with another writer surfaces as
//! [`TimelineError::SequenceCollision`] so the caller can retry with a
//! fresh number.
//!
//! The store is a single process-wide handle; a mutex serializes access to
//! the connection, and SQLite's WAL mode keeps other connections' readers
//! unblocked.

use crate::error::{Result, TimelineError};
use crate::event::{Event, EventPayload, EventType};
use crate::migrations::{self, MigrationOutcome};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Column list shared by every event read
pub(crate) const EVENT_COLUMNS: &str = "id, timestamp, sequence_number, actor, event_type, aggregate_id, \
     aggregate_type, payload, correlation_id, causation_id, metadata, checksum";

const META_LAST_SEQUENCE: &str = "last_sequence";
pub(crate) const META_LAST_SNAPSHOT_SEQUENCE: &str = "last_snapshot_sequence";

/// Row form of an event, exactly as written to the `events` table
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub timestamp: i64,
    pub sequence_number: u64,
    pub event_type: String,
    pub actor: String,
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    /// Serialized payload; the checksum covers exactly these bytes
    pub payload: String,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub metadata: Option<String>,
    pub checksum: String,
    /// Denormalized from `payload.session_id`
    pub session_id: Option<String>,
}

impl EventRecord {
    /// Decode into the typed read model
    pub fn to_event(&self) -> Event {
        build_event(
            self.id.clone(),
            self.timestamp,
            self.sequence_number,
            self.actor.clone(),
            &self.event_type,
            self.aggregate_id.clone(),
            self.aggregate_type.clone(),
            &self.payload,
            self.correlation_id.clone(),
            self.causation_id.clone(),
            self.metadata.as_deref(),
            self.checksum.clone(),
        )
    }
}

/// Durable append-only event log
pub struct LogStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    has_session_column: bool,
    migration_outcome: MigrationOutcome,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("path", &self.path)
            .field("has_session_column", &self.has_session_column)
            .finish()
    }
}

impl LogStore {
    /// Open (creating if needed) the log database at `path`
    ///
    /// Applies pending migrations. Optional migrations that fail are
    /// skipped and reported by [`migration_outcome`](Self::migration_outcome).
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Database`] if the file cannot be opened
    /// - [`TimelineError::Migration`] if the base schema cannot be created
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        info!("Opened event log at {:?}", path);
        Ok(store)
    }

    /// Open a private in-memory log
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let outcome = migrations::run_migrations(&conn)?;
        let has_session_column = migrations::has_column(&conn, "events", "session_id")?;
        if !has_session_column {
            warn!("events.session_id column unavailable; session filters fall back to payload lookup");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            has_session_column,
            migration_outcome: outcome,
        })
    }

    /// Database file, if not in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the denormalized `session_id` column exists
    pub fn has_session_column(&self) -> bool {
        self.has_session_column
    }

    /// Migrations applied or skipped when this handle was opened
    pub fn migration_outcome(&self) -> &MigrationOutcome {
        &self.migration_outcome
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Allocate the next sequence number
    ///
    /// Re-derives the maximum from the events table and repairs a lagging
    /// counter. The number is not reserved: the subsequent insert may still
    /// collide with another connection, which [`append`](Self::append)
    /// reports as [`TimelineError::SequenceCollision`].
    pub fn next_sequence(&self) -> Result<u64> {
        let conn = self.conn.lock();
        next_sequence_in(&conn)
    }

    /// Highest sequence number issued so far (0 for an empty log)
    pub fn current_sequence(&self) -> Result<u64> {
        let conn = self.conn.lock();
        Ok(next_sequence_in(&conn)? - 1)
    }

    /// Insert one event with the sequence number it already carries
    ///
    /// # Errors
    ///
    /// - [`TimelineError::SequenceCollision`] if the sequence is taken
    /// - [`TimelineError::Database`] for any other SQLite failure
    pub fn append(&self, record: &EventRecord) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_record(&tx, record, self.has_session_column)?;
        advance_counter(&tx, record.sequence_number)?;
        tx.commit()?;
        trace!("Appended event {} at sequence {}", record.id, record.sequence_number);
        Ok(())
    }

    /// Insert several events atomically, each with its own sequence number
    ///
    /// Either every record is written or none is. On success the inner
    /// vector holds one `Ok(())` per record.
    pub fn append_batch(&self, records: &[EventRecord]) -> Result<Vec<Result<()>>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut max_sequence = 0;
        for record in records {
            insert_record(&tx, record, self.has_session_column)?;
            max_sequence = max_sequence.max(record.sequence_number);
        }
        advance_counter(&tx, max_sequence)?;
        tx.commit()?;
        debug!("Appended batch of {} events", records.len());
        Ok(records.iter().map(|_| Ok(())).collect())
    }

    /// Allocate a sequence number and insert, as one write transaction
    ///
    /// The record's `sequence_number` is overwritten with the allocated one.
    pub fn append_next(&self, record: &mut EventRecord) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        record.sequence_number = next_sequence_in(&tx)?;
        insert_record(&tx, record, self.has_session_column)?;
        advance_counter(&tx, record.sequence_number)?;
        tx.commit()?;
        trace!("Appended event {} at sequence {}", record.id, record.sequence_number);
        Ok(record.sequence_number)
    }

    /// Allocate consecutive sequence numbers for a batch and insert atomically
    pub fn append_batch_next(&self, records: &mut [EventRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut next = next_sequence_in(&tx)?;
        for record in records.iter_mut() {
            record.sequence_number = next;
            insert_record(&tx, record, self.has_session_column)?;
            next += 1;
        }
        if next > 1 {
            advance_counter(&tx, next - 1)?;
        }
        tx.commit()?;
        debug!("Appended batch of {} events", records.len());
        Ok(())
    }

    /// Fetch one event by id
    pub fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], event_from_row).optional()?)
    }

    /// Stored payload text and checksum for one event
    pub fn get_payload_and_checksum(&self, id: &str) -> Result<Option<(String, String)>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT payload, checksum FROM events WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }

    /// Every event's id, stored payload and checksum, in sequence order
    pub fn all_payloads(&self) -> Result<Vec<(String, String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, payload, checksum FROM events ORDER BY sequence_number")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replay feed: events with sequence > `after_sequence` and timestamp <= `until`, by sequence
    pub fn events_after(&self, after_sequence: u64, until: i64) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events WHERE sequence_number > ?1 AND timestamp <= ?2 ORDER BY sequence_number ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![after_sequence as i64, until], event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Events with sequence in `(after_sequence, up_to_sequence]`, by sequence
    pub fn events_between_sequences(&self, after_sequence: u64, up_to_sequence: u64) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM events WHERE sequence_number > ?1 AND sequence_number <= ?2 ORDER BY sequence_number ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![after_sequence as i64, up_to_sequence as i64], event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of stored events
    pub fn event_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Missing sequence ranges `(first_missing, last_missing)` between 1 and the maximum
    pub fn sequence_gaps(&self) -> Result<Vec<(u64, u64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT sequence_number FROM events ORDER BY sequence_number ASC")?;
        let sequences = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut gaps = Vec::new();
        let mut expected: u64 = 1;
        for sequence in sequences {
            let sequence = sequence? as u64;
            if sequence > expected {
                gaps.push((expected, sequence - 1));
            }
            expected = sequence + 1;
        }
        Ok(gaps)
    }

    /// Read a metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        get_meta_in(&conn, key)
    }

    /// Write a metadata value
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        set_meta_in(&conn, key, value)
    }
}

pub(crate) fn get_meta_in(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

pub(crate) fn set_meta_in(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Self-healing allocation: max(events, counter) + 1, repairing a lagging counter
fn next_sequence_in(conn: &Connection) -> Result<u64> {
    let max_in_table: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence_number), 0) FROM events",
        [],
        |row| row.get(0),
    )?;
    let max_in_table = max_in_table.max(0) as u64;

    let counter = get_meta_in(conn, META_LAST_SEQUENCE)?
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    if counter < max_in_table {
        warn!(
            counter,
            max_in_table, "sequence counter behind event table, repairing"
        );
        set_meta_in(conn, META_LAST_SEQUENCE, &max_in_table.to_string())?;
    }

    Ok(counter.max(max_in_table) + 1)
}

/// Advance the counter, never moving it backwards
fn advance_counter(conn: &Connection, sequence: u64) -> Result<()> {
    conn.execute(
        "UPDATE metadata SET value = CAST(?1 AS TEXT)
          WHERE key = ?2 AND CAST(value AS INTEGER) < ?1",
        params![sequence as i64, META_LAST_SEQUENCE],
    )?;
    Ok(())
}

fn insert_record(conn: &Connection, record: &EventRecord, with_session: bool) -> Result<()> {
    let result = if with_session {
        conn.execute(
            "INSERT INTO events (id, timestamp, sequence_number, actor, event_type, aggregate_id,
                 aggregate_type, payload, correlation_id, causation_id, metadata, checksum, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.timestamp,
                record.sequence_number as i64,
                record.actor,
                record.event_type,
                record.aggregate_id,
                record.aggregate_type,
                record.payload,
                record.correlation_id,
                record.causation_id,
                record.metadata,
                record.checksum,
                record.session_id,
            ],
        )
    } else {
        conn.execute(
            "INSERT INTO events (id, timestamp, sequence_number, actor, event_type, aggregate_id,
                 aggregate_type, payload, correlation_id, causation_id, metadata, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id,
                record.timestamp,
                record.sequence_number as i64,
                record.actor,
                record.event_type,
                record.aggregate_id,
                record.aggregate_type,
                record.payload,
                record.correlation_id,
                record.causation_id,
                record.metadata,
                record.checksum,
            ],
        )
    };

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_sequence_collision(&e) => Err(TimelineError::SequenceCollision(record.sequence_number)),
        Err(e) => Err(e.into()),
    }
}

fn is_sequence_collision(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message
                    .as_deref()
                    .map_or(true, |m| m.contains("sequence_number"))
        }
        _ => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_event(
    id: String,
    timestamp: i64,
    sequence_number: u64,
    actor: String,
    event_type: &str,
    aggregate_id: Option<String>,
    aggregate_type: Option<String>,
    payload: &str,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    metadata: Option<&str>,
    checksum: String,
) -> Event {
    let event_type = EventType::from_name(event_type);
    let payload_value = parse_json_lenient(payload);
    Event {
        id,
        timestamp,
        sequence_number,
        payload: EventPayload::decode(&event_type, payload_value),
        event_type,
        actor,
        aggregate_id,
        aggregate_type,
        correlation_id,
        causation_id,
        metadata: metadata.map(parse_json_lenient),
        checksum,
    }
}

/// Unparseable stored JSON is surfaced as a string rather than dropped
fn parse_json_lenient(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Map a row selected with [`EVENT_COLUMNS`] into an [`Event`]
pub(crate) fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let event_type: String = row.get(4)?;
    let payload: String = row.get(7)?;
    let metadata: Option<String> = row.get(10)?;
    Ok(build_event(
        row.get(0)?,
        row.get(1)?,
        row.get::<_, i64>(2)? as u64,
        row.get(3)?,
        &event_type,
        row.get(5)?,
        row.get(6)?,
        &payload,
        row.get(8)?,
        row.get(9)?,
        metadata.as_deref(),
        row.get(11)?,
    ))
}
