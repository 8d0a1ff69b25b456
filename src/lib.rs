//! # Chronolog - an event timeline with time-travel rewind
//!
//! Chronolog records everything that happens in an interactive coding
//! session as an append-only, totally ordered log of immutable events, and
//! can reconstruct the state of the session at any past instant.
//!
//! ## Overview
//!
//! - **Append log**: every event gets a UUID, a microsecond timestamp, a
//!   gapless sequence number and a SHA-256 checksum of its payload. Events
//!   are never updated or deleted.
//! - **Blob store**: file contents live in a content-addressable store keyed
//!   by SHA-256, so events carry a hash instead of the bytes.
//! - **Snapshots**: periodic compressed checkpoints of derived state bound
//!   replay cost. They are an optimization; replay is authoritative.
//! - **Rewind**: nearest snapshot at or before the target, plus replay of
//!   later events up to the target, materialized into a fresh directory.
//!   Rewinds never touch the live working tree.
//! - **Queries**: filtered reads, causation trees, correlation chains,
//!   payload search and aggregate statistics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronolog::{EventInput, EventType, FileChangePayload, RewindOptions, TimelineBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let timeline = TimelineBuilder::new()
//!     .events_interval(100)
//!     .build(".chronolog")?;
//!
//! let hash = timeline.store_blob(b"fn main() {}")?.expect("under the size limit");
//! timeline.log(
//!     EventInput::new(EventType::FileCreated, "user")
//!         .aggregate("src/main.rs", "file")
//!         .payload(FileChangePayload::new("src/main.rs", hash)),
//! );
//!
//! let target = chrono::Utc::now().timestamp_micros();
//! let report = timeline.rewind(&RewindOptions::new(target).output_dir("/tmp/rewind"));
//! assert!(report.success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Producers
//!
//! Hosts usually record activity through the hooks rather than building
//! events by hand:
//!
//! ```rust,no_run
//! # fn example(timeline: &chronolog::Timeline) {
//! let files = timeline.file_hook("/path/to/project");
//! files.record_modified("src/lib.rs");
//!
//! let git = timeline.git_hook();
//! git.record_head(std::path::Path::new("/path/to/project"));
//! # }
//! ```
//!
//! Hooks are fail-soft: a storage problem becomes a `warn!` and a `None`,
//! never an error in the host's flow.
//!
//! Consumers that react to new events subscribe instead of polling:
//!
//! ```rust,no_run
//! # fn example(timeline: &chronolog::Timeline) {
//! use std::sync::Arc;
//!
//! let id = timeline.subscribe(
//!     Some(chronolog::EventType::ToolCallFailed),
//!     Arc::new(|event: &chronolog::Event| eprintln!("tool failed: {}", event.id)),
//! );
//! timeline.unsubscribe(id);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T>`] with [`TimelineError`]. Logging
//! and rewinding report failures inside their result values
//! ([`LogResult`], [`RewindReport`]) instead.
//!
//! ## Module Organization
//!
//! - [`timeline`]: the facade and its builder
//! - [`event`]: event types, categories and typed payloads
//! - [`log_store`] / [`logger`]: append log and the event producer API
//! - [`blob_store`]: content-addressable storage
//! - [`snapshot`]: snapshot creation, retention and pinning
//! - [`state`]: derived state and its reducers
//! - [`rewind`]: time-travel reconstruction
//! - [`query`]: read side
//! - [`hooks`]: file, git, session and tool producers
//! - [`verification`]: whole-store integrity checks

pub mod blob_store;
pub mod clock;
pub mod compression;
pub mod error;
pub mod event;
pub mod hooks;
pub mod log_store;
pub mod logger;
pub mod migrations;
pub mod query;
pub mod rewind;
pub mod snapshot;
pub mod state;
pub mod timeline;
pub mod types;
pub mod utils;
pub mod verification;

mod collections;

pub use blob_store::BlobStore;
pub use clock::{Clock, ClockRef, ManualClock, SystemClock};
pub use compression::{CompressionEngine, CompressionStrategy};
pub use error::{Result, TimelineError};
pub use event::{
    Event, EventCategory, EventInput, EventPayload, EventType, FileChangePayload, FileMovePayload,
    GitBranchPayload, GitCommitPayload, GitSyncPayload, MessagePayload, ModelChangePayload, Role,
    SessionPayload, ToolCallPayload,
};
pub use hooks::{EventSink, FileHook, GitHook, SessionHook, ToolHook};
pub use logger::{ChecksumSummary, EventListener, EventLogger, LogResult, SubscriptionId};
pub use query::{CausationNode, EventStats, QueryEngine, QueryFilter, QueryResult, SortOrder};
pub use rewind::{ComparisonReport, ComparisonStatus, GitMode, RewindOptions, RewindReport};
pub use snapshot::{SnapshotData, SnapshotManager, SnapshotMetadata, SnapshotStats, StateProvider};
pub use state::{DerivedState, FileEntry, FileState, GitState, SessionState};
pub use timeline::{Timeline, TimelineBuilder};
pub use types::*;
pub use verification::{IntegrityReport, IntegrityVerifier};
