//! Snapshot manager
//!
//! A snapshot is a compressed checkpoint of the derived state after a given
//! sequence number. Rewind starts from the nearest snapshot instead of the
//! beginning of the log, which bounds replay cost.
//!
//! ## Capture
//!
//! The captured state is itself produced by replay: the newest existing
//! snapshot plus every event after it, up to the current sequence. A
//! snapshot therefore always equals what a full replay would give at its
//! sequence number. Live pointers from a [`StateProvider`] (the embedding
//! application's session manager or git hook) only fill the denormalized
//! metadata columns and are advisory.
//!
//! ## Storage
//!
//! Rows live in the `snapshots` table of the log database. The payload is a
//! bincode-encoded [`SnapshotData`], framed by the LZ4 compression engine.
//!
//! ## Triggers and retention
//!
//! [`SnapshotManager::on_event_appended`] drives the event-count trigger and
//! [`SnapshotManager::tick`] the time trigger. Both re-check their condition
//! under the creation lock against the time and sequence of the last
//! snapshot, whichever trigger made it, so two triggers firing together
//! produce one snapshot.
//!
//! [`SnapshotManager::cleanup`] keeps the newest `max_snapshots` and never
//! deletes a snapshot pinned by an in-flight rewind.

use crate::clock::ClockRef;
use crate::collections::GxBuildHasher;
use crate::compression::CompressionEngine;
use crate::error::{Result, TimelineError};
use crate::event::{EventInput, EventType, SnapshotEventPayload};
use crate::log_store::{get_meta_in, set_meta_in, LogStore, META_LAST_SNAPSHOT_SEQUENCE};
use crate::logger::EventLogger;
use crate::state::{DerivedState, FileState, GitState, SessionState};
use crate::types::SnapshotConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SNAPSHOT_COLUMNS: &str = "snapshot_id, timestamp, sequence_number, event_count, session_id, session_name, \
     working_dir, git_commit_hash, git_branch, file_count, compressed_size_bytes, uncompressed_size_bytes, \
     created_at, reason";

/// Row-level description of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_id: String,
    /// Instant the snapshot represents; never earlier than any event it incorporates
    pub timestamp: i64,
    /// Last event sequence incorporated
    pub sequence_number: u64,
    pub event_count: u64,
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub working_dir: Option<String>,
    pub git_commit_hash: Option<String>,
    pub git_branch: Option<String>,
    pub file_count: u64,
    pub compressed_size_bytes: u64,
    pub uncompressed_size_bytes: u64,
    pub created_at: i64,
    pub reason: String,
}

/// Decoded snapshot payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub metadata: SnapshotMetadata,
    pub session_state: SessionState,
    pub file_state: FileState,
    pub git_state: GitState,
}

impl SnapshotData {
    /// Path to content hash for every existing file
    pub fn file_checksums(&self) -> BTreeMap<String, String> {
        self.file_state.checksums()
    }

    /// The derived state this snapshot captured
    pub fn derived_state(&self) -> DerivedState {
        DerivedState {
            session: self.session_state.clone(),
            files: self.file_state.clone(),
            git: self.git_state.clone(),
        }
    }
}

/// Aggregate snapshot statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_compressed_bytes: u64,
    pub avg_compressed_size_kb: f64,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// Live pointers known to the embedding application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivePointers {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub working_dir: Option<String>,
    pub git_commit_hash: Option<String>,
    pub git_branch: Option<String>,
}

/// Source of advisory "current state" for snapshot metadata
pub trait StateProvider: Send + Sync {
    /// Best-effort reading of the live session and git pointers
    fn live_pointers(&self) -> LivePointers;
}

/// What caused a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTrigger {
    /// `events_interval` events since the last snapshot
    EventCount,
    /// `time_interval` elapsed since the last snapshot
    Interval,
}

impl SnapshotTrigger {
    fn reason(&self) -> &'static str {
        match self {
            SnapshotTrigger::EventCount => "auto_event",
            SnapshotTrigger::Interval => "auto_time",
        }
    }
}

type PinMap = DashMap<String, usize, GxBuildHasher>;

/// Keeps a snapshot safe from retention while held
///
/// Released on drop.
#[derive(Debug)]
pub struct SnapshotPin {
    pins: Arc<PinMap>,
    metadata: SnapshotMetadata,
}

impl SnapshotPin {
    /// The pinned snapshot
    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        release_pin(&self.pins, &self.metadata.snapshot_id);
    }
}

fn release_pin(pins: &PinMap, snapshot_id: &str) {
    if let Entry::Occupied(mut entry) = pins.entry(snapshot_id.to_string()) {
        if *entry.get() <= 1 {
            entry.remove();
        } else {
            *entry.get_mut() -= 1;
        }
    }
}

/// Creates, loads and prunes snapshots
pub struct SnapshotManager {
    store: Arc<LogStore>,
    logger: Arc<EventLogger>,
    clock: ClockRef,
    config: SnapshotConfig,
    compression: CompressionEngine,
    provider: RwLock<Option<Arc<dyn StateProvider>>>,
    pins: Arc<PinMap>,
    /// Serializes snapshot creation
    creating: Mutex<()>,
    /// Serializes pinning against deletion
    retention: Mutex<()>,
    last_snapshot_at: AtomicI64,
    events_since: AtomicU64,
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("config", &self.config)
            .field("pinned", &self.pins.len())
            .finish()
    }
}

impl SnapshotManager {
    /// Create a manager over `store`, emitting lifecycle events through `logger`
    ///
    /// Trigger state is seeded from the newest existing snapshot, so a
    /// restarted process keeps honouring the intervals.
    pub fn new(
        store: Arc<LogStore>,
        logger: Arc<EventLogger>,
        clock: ClockRef,
        config: SnapshotConfig,
        compression: CompressionEngine,
    ) -> Result<Self> {
        let manager = Self {
            store,
            logger,
            clock,
            config,
            compression,
            provider: RwLock::new(None),
            pins: Arc::new(DashMap::with_hasher(GxBuildHasher::default())),
            creating: Mutex::new(()),
            retention: Mutex::new(()),
            last_snapshot_at: AtomicI64::new(0),
            events_since: AtomicU64::new(0),
        };

        if let Some(latest) = manager.latest_by_sequence()? {
            manager.last_snapshot_at.store(latest.timestamp, Ordering::SeqCst);
        }
        let last_sequence = manager
            .store
            .get_meta(META_LAST_SNAPSHOT_SEQUENCE)?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let current = manager.store.current_sequence()?;
        manager
            .events_since
            .store(current.saturating_sub(last_sequence), Ordering::SeqCst);

        Ok(manager)
    }

    /// Install the provider of live session/git pointers
    pub fn set_state_provider(&self, provider: Arc<dyn StateProvider>) {
        *self.provider.write() = Some(provider);
    }

    /// Snapshot policy in effect
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Capture the current derived state
    ///
    /// Emits `SNAPSHOT_CREATED` and then applies retention.
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Database`] if the log cannot be read or the row written
    /// - [`TimelineError::Bincode`] if the state cannot be encoded
    pub fn create_snapshot(&self, reason: &str) -> Result<SnapshotMetadata> {
        let _guard = self.creating.lock();
        self.create_locked(reason)
    }

    fn create_locked(&self, reason: &str) -> Result<SnapshotMetadata> {
        let sequence = self.store.current_sequence()?;
        let (base, base_sequence, base_timestamp) = self.replay_base(sequence)?;

        let events = self.store.events_between_sequences(base_sequence, sequence)?;
        let latest_event_ts = events.iter().map(|e| e.timestamp).max().unwrap_or(0);
        let state = DerivedState::replay(base, &events);

        let now = self.clock.now_micros();
        let timestamp = now.max(latest_event_ts).max(base_timestamp);
        let live = self
            .provider
            .read()
            .as_ref()
            .map(|p| p.live_pointers())
            .unwrap_or_default();

        let mut metadata = SnapshotMetadata {
            snapshot_id: new_snapshot_id(now),
            timestamp,
            sequence_number: sequence,
            event_count: self.store.event_count()?,
            session_id: live.session_id.or_else(|| state.session.session_id.clone()),
            session_name: live.session_name.or_else(|| state.session.session_name.clone()),
            working_dir: live.working_dir.or_else(|| state.session.working_dir.clone()),
            git_commit_hash: live.git_commit_hash.or_else(|| state.git.commit_hash.clone()),
            git_branch: live.git_branch.or_else(|| state.git.branch.clone()),
            file_count: state.files.existing_count() as u64,
            compressed_size_bytes: 0,
            uncompressed_size_bytes: 0,
            created_at: now,
            reason: reason.to_string(),
        };

        let data = SnapshotData {
            metadata: metadata.clone(),
            session_state: state.session,
            file_state: state.files,
            git_state: state.git,
        };
        let encoded = bincode::serde::encode_to_vec(&data, bincode::config::standard())?;
        let framed = self.compression.compress(&encoded)?;
        metadata.uncompressed_size_bytes = encoded.len() as u64;
        metadata.compressed_size_bytes = framed.len() as u64;

        self.store.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO snapshots ({}, snapshot_data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    SNAPSHOT_COLUMNS
                ),
                params![
                    metadata.snapshot_id,
                    metadata.timestamp,
                    metadata.sequence_number as i64,
                    metadata.event_count as i64,
                    metadata.session_id,
                    metadata.session_name,
                    metadata.working_dir,
                    metadata.git_commit_hash,
                    metadata.git_branch,
                    metadata.file_count as i64,
                    metadata.compressed_size_bytes as i64,
                    metadata.uncompressed_size_bytes as i64,
                    metadata.created_at,
                    metadata.reason,
                    framed,
                ],
            )?;
            set_meta_in(&tx, META_LAST_SNAPSHOT_SEQUENCE, &sequence.to_string())?;
            tx.commit()?;
            Ok(())
        })?;

        self.last_snapshot_at.store(now, Ordering::SeqCst);
        self.events_since.store(0, Ordering::SeqCst);

        info!(
            "Created snapshot {} at sequence {} ({} files, {} bytes)",
            metadata.snapshot_id, sequence, metadata.file_count, metadata.compressed_size_bytes
        );

        self.emit(
            EventType::SnapshotCreated,
            SnapshotEventPayload {
                snapshot_id: metadata.snapshot_id.clone(),
                sequence_number: Some(sequence),
                reason: Some(reason.to_string()),
                compressed_size_bytes: Some(metadata.compressed_size_bytes),
                uncompressed_size_bytes: Some(metadata.uncompressed_size_bytes),
                ..Default::default()
            },
        );

        if self.config.max_snapshots > 0 {
            if let Err(e) = self.cleanup() {
                warn!("Snapshot retention failed: {}", e);
            }
        }

        Ok(metadata)
    }

    /// Newest snapshot at or below `sequence`, decoded, as a replay base
    fn replay_base(&self, sequence: u64) -> Result<(DerivedState, u64, i64)> {
        let latest = self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM snapshots WHERE sequence_number <= ?1
                 ORDER BY sequence_number DESC, timestamp DESC LIMIT 1",
                SNAPSHOT_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![sequence as i64], metadata_from_row)
                .optional()?)
        })?;

        let Some(latest) = latest else {
            return Ok((DerivedState::default(), 0, 0));
        };

        match self.read_data(&latest.snapshot_id) {
            Ok(Some(data)) => Ok((data.derived_state(), latest.sequence_number, latest.timestamp)),
            Ok(None) => Ok((DerivedState::default(), 0, 0)),
            Err(e) => {
                warn!(
                    "Snapshot {} unreadable, capturing from the start of the log: {}",
                    latest.snapshot_id, e
                );
                Ok((DerivedState::default(), 0, 0))
            }
        }
    }

    /// Decode and return a snapshot, emitting `SNAPSHOT_LOADED`
    ///
    /// Returns `Ok(None)` for unknown ids.
    pub fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<SnapshotData>> {
        let data = self.read_data(snapshot_id)?;
        if let Some(data) = &data {
            self.emit(
                EventType::SnapshotLoaded,
                SnapshotEventPayload {
                    snapshot_id: snapshot_id.to_string(),
                    sequence_number: Some(data.metadata.sequence_number),
                    ..Default::default()
                },
            );
        }
        Ok(data)
    }

    /// Decode a snapshot without emitting any event
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Decompression`] or [`TimelineError::Bincode`] if the payload is corrupt
    pub fn read_data(&self, snapshot_id: &str) -> Result<Option<SnapshotData>> {
        let row = self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, snapshot_data FROM snapshots WHERE snapshot_id = ?1",
                SNAPSHOT_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![snapshot_id], |row| {
                    Ok((metadata_from_row(row)?, row.get::<_, Vec<u8>>(14)?))
                })
                .optional()?)
        })?;

        let Some((metadata, framed)) = row else {
            return Ok(None);
        };

        let encoded = self.compression.decompress(&framed)?;
        let (mut data, _): (SnapshotData, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard())?;
        // The row carries the sizes, which are unknown when the payload is encoded
        data.metadata = metadata;
        debug!("Loaded snapshot {} ({} files)", snapshot_id, data.file_state.files.len());
        Ok(Some(data))
    }

    /// Most recent snapshot whose timestamp is at or before `timestamp`
    ///
    /// `None` means replay from the beginning of the log.
    pub fn get_snapshot_before(&self, timestamp: i64) -> Result<Option<SnapshotMetadata>> {
        self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM snapshots WHERE timestamp <= ?1
                 ORDER BY timestamp DESC, sequence_number DESC LIMIT 1",
                SNAPSHOT_COLUMNS
            );
            Ok(conn.query_row(&sql, params![timestamp], metadata_from_row).optional()?)
        })
    }

    /// Select and pin the snapshot a rewind to `timestamp` should start from
    ///
    /// Selection and pinning happen under the retention lock, so the
    /// returned snapshot cannot be pruned while the pin is held.
    pub fn pin_snapshot_before(&self, timestamp: i64) -> Result<Option<SnapshotPin>> {
        let _retention = self.retention.lock();
        let Some(metadata) = self.get_snapshot_before(timestamp)? else {
            return Ok(None);
        };
        *self.pins.entry(metadata.snapshot_id.clone()).or_insert(0) += 1;
        debug!("Pinned snapshot {}", metadata.snapshot_id);
        Ok(Some(SnapshotPin {
            pins: Arc::clone(&self.pins),
            metadata,
        }))
    }

    /// Protect a snapshot from deletion until a matching [`unpin`](Self::unpin)
    ///
    /// Pins are counted; each `pin` needs its own `unpin`.
    pub fn pin(&self, snapshot_id: &str) -> Result<()> {
        let _retention = self.retention.lock();
        if self.get_snapshot_metadata(snapshot_id)?.is_none() {
            return Err(TimelineError::SnapshotNotFound(snapshot_id.to_string()));
        }
        *self.pins.entry(snapshot_id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    /// Release one pin
    pub fn unpin(&self, snapshot_id: &str) {
        release_pin(&self.pins, snapshot_id);
    }

    /// Whether any in-flight operation pins this snapshot
    pub fn is_pinned(&self, snapshot_id: &str) -> bool {
        self.pins.contains_key(snapshot_id)
    }

    /// Metadata of one snapshot
    pub fn get_snapshot_metadata(&self, snapshot_id: &str) -> Result<Option<SnapshotMetadata>> {
        self.store.with_conn(|conn| {
            let sql = format!("SELECT {} FROM snapshots WHERE snapshot_id = ?1", SNAPSHOT_COLUMNS);
            Ok(conn.query_row(&sql, params![snapshot_id], metadata_from_row).optional()?)
        })
    }

    /// All snapshots, newest first
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotMetadata>> {
        self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM snapshots ORDER BY timestamp DESC, sequence_number DESC",
                SNAPSHOT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], metadata_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn latest_by_sequence(&self) -> Result<Option<SnapshotMetadata>> {
        self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM snapshots ORDER BY sequence_number DESC, timestamp DESC LIMIT 1",
                SNAPSHOT_COLUMNS
            );
            Ok(conn.query_row(&sql, [], metadata_from_row).optional()?)
        })
    }

    /// Delete one snapshot, emitting `SNAPSHOT_DELETED`
    ///
    /// # Errors
    ///
    /// - [`TimelineError::SnapshotPinned`] if an in-flight rewind uses it
    /// - [`TimelineError::SnapshotNotFound`] for unknown ids
    pub fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let _retention = self.retention.lock();
        self.delete_locked(snapshot_id)
    }

    fn delete_locked(&self, snapshot_id: &str) -> Result<()> {
        if self.is_pinned(snapshot_id) {
            return Err(TimelineError::SnapshotPinned(snapshot_id.to_string()));
        }

        let removed = self.store.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM snapshots WHERE snapshot_id = ?1", params![snapshot_id])?)
        })?;
        if removed == 0 {
            return Err(TimelineError::SnapshotNotFound(snapshot_id.to_string()));
        }

        debug!("Deleted snapshot {}", snapshot_id);
        self.emit(
            EventType::SnapshotDeleted,
            SnapshotEventPayload {
                snapshot_id: snapshot_id.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    /// Keep only the newest `max_snapshots`, skipping pinned ones
    ///
    /// Returns the number deleted.
    pub fn cleanup(&self) -> Result<usize> {
        if self.config.max_snapshots == 0 {
            return Ok(0);
        }

        let _retention = self.retention.lock();
        let snapshots = self.list_snapshots()?;
        let mut deleted = 0;

        for snapshot in snapshots.iter().skip(self.config.max_snapshots) {
            match self.delete_locked(&snapshot.snapshot_id) {
                Ok(()) => deleted += 1,
                Err(TimelineError::SnapshotPinned(id)) => {
                    debug!("Retention skipped pinned snapshot {}", id);
                }
                Err(e) => return Err(e),
            }
        }

        if deleted > 0 {
            info!("Retention removed {} snapshots", deleted);
        }
        Ok(deleted)
    }

    /// Count, size and age range of stored snapshots
    pub fn get_stats(&self) -> Result<SnapshotStats> {
        self.store.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(compressed_size_bytes), 0), COALESCE(AVG(compressed_size_bytes), 0),
                        MIN(timestamp), MAX(timestamp)
                   FROM snapshots",
                [],
                |row| {
                    Ok(SnapshotStats {
                        total_snapshots: row.get::<_, i64>(0)? as u64,
                        total_compressed_bytes: row.get::<_, i64>(1)? as u64,
                        avg_compressed_size_kb: row.get::<_, f64>(2)? / 1024.0,
                        oldest_timestamp: row.get(3)?,
                        newest_timestamp: row.get(4)?,
                    })
                },
            )?)
        })
    }

    /// Sequence number of the newest snapshot, from store metadata
    pub fn last_snapshot_sequence(&self) -> Result<u64> {
        self.store.with_conn(|conn| {
            Ok(get_meta_in(conn, META_LAST_SNAPSHOT_SEQUENCE)?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0))
        })
    }

    /// Count one appended event toward the event trigger
    ///
    /// Returns the snapshot if this event tipped the trigger.
    pub fn on_event_appended(&self, _sequence: u64) -> Option<SnapshotMetadata> {
        if !self.config.auto_enabled {
            return None;
        }
        let since = self.events_since.fetch_add(1, Ordering::SeqCst) + 1;
        if self.config.events_interval > 0 && since >= self.config.events_interval {
            return self.maybe_snapshot(SnapshotTrigger::EventCount);
        }
        None
    }

    /// Check the time trigger; called periodically by the auto-snapshot task
    pub fn tick(&self) -> Option<SnapshotMetadata> {
        if !self.config.auto_enabled {
            return None;
        }
        self.maybe_snapshot(SnapshotTrigger::Interval)
    }

    /// Take an automatic snapshot if `trigger` still holds
    ///
    /// The condition is re-evaluated under the creation lock, after any
    /// snapshot another trigger just took. Failures are logged, not returned.
    pub fn maybe_snapshot(&self, trigger: SnapshotTrigger) -> Option<SnapshotMetadata> {
        let _guard = self.creating.lock();

        let since = self.events_since.load(Ordering::SeqCst);
        let due = match trigger {
            SnapshotTrigger::EventCount => {
                self.config.events_interval > 0 && since >= self.config.events_interval
            }
            SnapshotTrigger::Interval => {
                let last = self.last_snapshot_at.load(Ordering::SeqCst);
                let elapsed = self.clock.now_micros().saturating_sub(last);
                since > 0 && self.config.time_interval_secs > 0 && elapsed >= self.config.time_interval_micros()
            }
        };
        if !due {
            return None;
        }

        match self.create_locked(trigger.reason()) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Automatic snapshot failed: {}", e);
                None
            }
        }
    }

    fn emit(&self, event_type: EventType, payload: SnapshotEventPayload) {
        let input = EventInput::new(event_type, "system")
            .aggregate(payload.snapshot_id.clone(), "snapshot")
            .payload(payload);
        let result = self.logger.log(input);
        if !result.success {
            warn!(
                "Snapshot event not recorded: {}",
                result.error.unwrap_or_default()
            );
        }
    }
}

fn new_snapshot_id(now: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("snapshot_{}_{}", now, &suffix[..8])
}

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotMetadata> {
    Ok(SnapshotMetadata {
        snapshot_id: row.get(0)?,
        timestamp: row.get(1)?,
        sequence_number: row.get::<_, i64>(2)? as u64,
        event_count: row.get::<_, i64>(3)? as u64,
        session_id: row.get(4)?,
        session_name: row.get(5)?,
        working_dir: row.get(6)?,
        git_commit_hash: row.get(7)?,
        git_branch: row.get(8)?,
        file_count: row.get::<_, i64>(9)? as u64,
        compressed_size_bytes: row.get::<_, i64>(10)? as u64,
        uncompressed_size_bytes: row.get::<_, i64>(11)? as u64,
        created_at: row.get(12)?,
        reason: row.get(13)?,
    })
}
