//! Schema migrations for the event store
//!
//! Migrations are additive and applied in version order, each in its own
//! transaction, with applied versions recorded in `schema_version`.
//! Re-running is idempotent.
//!
//! Only the base schema is required. A later migration that fails is rolled
//! back, logged and skipped: the store keeps serving with the older schema,
//! and the migration is retried on the next open. Callers that depend on an
//! optional column must check for it (see [`has_column`]).

use crate::error::{Result, TimelineError};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

/// A single schema migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
    /// Failure aborts startup instead of being skipped
    pub required: bool,
}

/// Result of a migration run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Versions applied during this run
    pub applied: Vec<u32>,
    /// Versions that failed and were skipped
    pub skipped: Vec<u32>,
    /// Highest applied version after the run
    pub current_version: u32,
}

const V001_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id              TEXT    PRIMARY KEY,
    timestamp       INTEGER NOT NULL,
    sequence_number INTEGER NOT NULL UNIQUE,
    actor           TEXT    NOT NULL,
    event_type      TEXT    NOT NULL,
    aggregate_id    TEXT,
    aggregate_type  TEXT,
    payload         TEXT    NOT NULL,
    correlation_id  TEXT,
    causation_id    TEXT,
    metadata        TEXT,
    checksum        TEXT    NOT NULL CHECK (length(checksum) = 64)
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp   ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_type        ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_aggregate   ON events(aggregate_type, aggregate_id);
CREATE INDEX IF NOT EXISTS idx_events_correlation ON events(correlation_id);
CREATE INDEX IF NOT EXISTS idx_events_causation   ON events(causation_id);
CREATE INDEX IF NOT EXISTS idx_events_actor       ON events(actor);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id             TEXT    PRIMARY KEY,
    timestamp               INTEGER NOT NULL,
    sequence_number         INTEGER NOT NULL,
    event_count             INTEGER NOT NULL,
    session_id              TEXT,
    session_name            TEXT,
    working_dir             TEXT,
    git_commit_hash         TEXT,
    git_branch              TEXT,
    file_count              INTEGER NOT NULL DEFAULT 0,
    compressed_size_bytes   INTEGER NOT NULL,
    uncompressed_size_bytes INTEGER NOT NULL,
    created_at              INTEGER NOT NULL,
    reason                  TEXT    NOT NULL DEFAULT 'manual',
    snapshot_data           BLOB    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON snapshots(timestamp);

CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
INSERT OR IGNORE INTO metadata (key, value) VALUES ('created_at', CAST(strftime('%s', 'now') AS TEXT));
INSERT OR IGNORE INTO metadata (key, value) VALUES ('last_sequence', '0');
INSERT OR IGNORE INTO metadata (key, value) VALUES ('last_snapshot_sequence', '0');
";

const V002_SESSION_COLUMN: &str = "
ALTER TABLE events ADD COLUMN session_id TEXT;
UPDATE events
   SET session_id = CAST(json_extract(payload, '$.session_id') AS TEXT)
 WHERE json_valid(payload)
   AND json_extract(payload, '$.session_id') IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
";

/// All migrations in version order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Base schema: events, snapshots, metadata",
        sql: V001_SCHEMA,
        required: true,
    },
    Migration {
        version: 2,
        description: "Denormalized session_id column on events",
        sql: V002_SESSION_COLUMN,
        required: false,
    },
];

/// Apply all pending migrations
///
/// # Errors
///
/// Returns [`TimelineError::Migration`] only when a required migration
/// fails; optional failures are reported in [`MigrationOutcome::skipped`].
pub fn run_migrations(conn: &Connection) -> Result<MigrationOutcome> {
    run_migration_set(conn, MIGRATIONS)
}

pub(crate) fn run_migration_set(conn: &Connection, migrations: &[Migration]) -> Result<MigrationOutcome> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut outcome = MigrationOutcome {
        current_version: current,
        ..Default::default()
    };

    for migration in migrations {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied, skipping");
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );

        match apply_migration(conn, migration) {
            Ok(()) => {
                outcome.applied.push(migration.version);
                outcome.current_version = migration.version;
            }
            Err(e) if !migration.required => {
                warn!(version = migration.version, error = %e, "optional migration failed, continuing with older schema");
                outcome.skipped.push(migration.version);
                // Later migrations may depend on this one
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if !outcome.applied.is_empty() {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![outcome.current_version.to_string()],
        )?;
        info!(applied = outcome.applied.len(), version = outcome.current_version, "migrations complete");
    }

    Ok(outcome)
}

/// Highest applied migration version, or 0 if none
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .map_err(|e| TimelineError::Migration {
            version: 0,
            message: format!("failed to read schema_version: {e}"),
        })
}

/// Latest migration version defined in code
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Whether `table` has a column named `column`
pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| TimelineError::Migration {
        version: 0,
        message: format!("failed to create schema_version table: {e}"),
    })
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let fail = |e: rusqlite::Error| TimelineError::Migration {
        version: migration.version,
        message: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(fail)?;
    tx.execute_batch(migration.sql).map_err(fail)?;
    tx.execute(
        "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, datetime('now'), ?2)",
        params![migration.version, migration.description],
    )
    .map_err(fail)?;
    tx.commit().map_err(fail)
}
