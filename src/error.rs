//! Error types for the chronolog library
//!
//! Errors fall into four families that callers treat differently:
//!
//! - **Integrity**: sequence collisions, checksum mismatches, migration
//!   inconsistencies. Surfaced and logged, never silently corrected.
//! - **Not found**: missing events, snapshots or blobs. Most read paths turn
//!   these into `None` or an empty result rather than an error.
//! - **Validation**: rejected before any side effect (future rewind target,
//!   malformed filter, pre-existing output directory).
//! - **Storage**: underlying I/O or SQLite failures.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the chronolog library
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Main error type for all timeline operations
#[derive(Debug, Error)]
pub enum TimelineError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors raised by the SQLite event store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// Another writer already claimed this sequence number
    #[error("Sequence collision: sequence {0} is already taken")]
    SequenceCollision(u64),

    /// Stored checksum does not match the recomputed one
    #[error("Checksum mismatch for event {event_id} - expected: {expected}, actual: {actual}")]
    ChecksumMismatch {
        /// Event whose payload failed verification
        event_id: String,
        /// Checksum stored alongside the event
        expected: String,
        /// Checksum recomputed from the stored payload
        actual: String,
    },

    /// Generic integrity violation
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Schema migration failed
    #[error("Migration v{version} failed: {message}")]
    Migration {
        /// Migration version that failed
        version: u32,
        /// Underlying failure
        message: String,
    },

    /// Event not found in the log
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Snapshot not found
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Blob not found in the content store
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Input rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rewind target lies in the future
    #[error("Target timestamp {target} is in the future (now: {now})")]
    FutureTimestamp {
        /// Requested target, microseconds since epoch
        target: i64,
        /// Clock reading at validation time
        now: i64,
    },

    /// Rewind output directory already exists
    #[error("Output directory already exists: {0:?}")]
    OutputExists(PathBuf),

    /// Snapshot is referenced by an in-flight rewind
    #[error("Snapshot {0} is pinned by an in-flight rewind")]
    SnapshotPinned(String),

    /// Timeline logging has been switched off
    #[error("Timeline logging is disabled")]
    LoggingDisabled,

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Store is not initialized
    #[error("Store not initialized at path: {0:?}")]
    StoreNotInitialized(PathBuf),

    /// Store already exists
    #[error("Store already exists at path: {0:?}")]
    StoreAlreadyExists(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Blocking task was cancelled or panicked
    #[error("Background task failed: {0}")]
    Task(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bincode::error::DecodeError> for TimelineError {
    fn from(err: bincode::error::DecodeError) -> Self {
        TimelineError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for TimelineError {
    fn from(err: bincode::error::EncodeError) -> Self {
        TimelineError::Bincode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TimelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        TimelineError::Task(err.to_string())
    }
}

impl TimelineError {
    /// Create a validation error with a custom message
    pub fn validation(msg: impl Into<String>) -> Self {
        TimelineError::Validation(msg.into())
    }

    /// Create an integrity error with a custom message
    pub fn integrity(msg: impl Into<String>) -> Self {
        TimelineError::Integrity(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        TimelineError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        TimelineError::Internal(msg.into())
    }

    /// Check if this error is an integrity violation
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            TimelineError::SequenceCollision(_)
                | TimelineError::ChecksumMismatch { .. }
                | TimelineError::Integrity(_)
                | TimelineError::Migration { .. }
        )
    }

    /// Check if this error means "absent"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TimelineError::EventNotFound(_)
                | TimelineError::SnapshotNotFound(_)
                | TimelineError::BlobNotFound(_)
        )
    }

    /// Check if this error was a rejected input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TimelineError::Validation(_)
                | TimelineError::FutureTimestamp { .. }
                | TimelineError::OutputExists(_)
        )
    }

    /// Check if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            TimelineError::SequenceCollision(_) | TimelineError::SnapshotPinned(_) => true,
            TimelineError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            TimelineError::SnapshotNotFound(id) => {
                format!("Snapshot '{}' not found. Use 'chronolog snapshot list' to see available snapshots.", id)
            }
            TimelineError::FutureTimestamp { .. } => {
                "Cannot rewind to the future. Pick a timestamp at or before now.".to_string()
            }
            TimelineError::OutputExists(path) => {
                format!("Output directory {:?} already exists. Rewind never overwrites; choose a fresh path.", path)
            }
            TimelineError::StoreNotInitialized(path) => {
                format!("No timeline store at {:?}. Run 'chronolog init' first.", path)
            }
            TimelineError::SequenceCollision(seq) => {
                format!("Sequence {} was claimed by another writer. Retry the append.", seq)
            }
            _ => self.to_string(),
        }
    }
}
