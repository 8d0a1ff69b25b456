//! Rewind engine: reconstruct and materialize the state at a past instant
//!
//! A rewind walks a fixed sequence of steps, each announced in the log it
//! reads from:
//!
//! ```text
//! STARTED -> SNAPSHOT_SELECTED -> EVENTS_REPLAYED -> STATE_MATERIALIZED -> COMPLETED
//!     \______________________________________________________________/
//!                                   FAILED
//! ```
//!
//! The target is validated (not in the future, output path not present)
//! before anything is written. State comes from the nearest snapshot at or
//! before the target plus every later event, by sequence, whose timestamp
//! does not exceed the target. With no usable snapshot, replay starts from
//! empty state.
//!
//! Output is a fresh directory:
//!
//! ```text
//! output/
//! ├── session_state.json
//! ├── git_state.json       # unless git mode is `none`
//! ├── file_manifest.json
//! └── files/               # existing files whose blobs could be read
//! ```
//!
//! The live working tree and the log's history are never touched. A
//! rewind abandoned midway leaves a partial output directory that nothing
//! refers to.

use crate::blob_store::BlobStore;
use crate::clock::ClockRef;
use crate::error::{Result, TimelineError};
use crate::event::{EventInput, EventType, RewindEventPayload};
use crate::log_store::LogStore;
use crate::logger::EventLogger;
use crate::snapshot::{SnapshotManager, SnapshotMetadata, SnapshotPin};
use crate::hooks::run_git;
use crate::state::{DerivedState, FileEntry, GitState};
use crate::types::{ProgressCallback, ProgressInfo};
use crate::utils::{format_timestamp, hash_file_content, safe_relative_path};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const SESSION_STATE_FILE: &str = "session_state.json";
const GIT_STATE_FILE: &str = "git_state.json";
const FILE_MANIFEST_FILE: &str = "file_manifest.json";
const FILES_DIR: &str = "files";
const REPOSITORY_DIR: &str = "repository";

/// How much git state a rewind writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitMode {
    /// No git output
    None,
    /// `git_state.json` with commit and branch
    #[default]
    Metadata,
    /// Metadata plus a clone of the source repository checked out at the
    /// recorded commit, under `repository/`
    Full,
}

impl FromStr for GitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(GitMode::None),
            "metadata" => Ok(GitMode::Metadata),
            "full" => Ok(GitMode::Full),
            other => Err(format!("unknown git mode: {} (expected none, metadata or full)", other)),
        }
    }
}

/// Parameters of one rewind
#[derive(Clone)]
pub struct RewindOptions {
    /// Instant to reconstruct, microseconds
    pub target_timestamp: i64,
    /// Defaults to `<store>/rewinds/rewind_<target>`; must not exist
    pub output_dir: Option<PathBuf>,
    pub include_files: bool,
    /// When off, `session_state.json` omits the conversation
    pub include_conversations: bool,
    pub git_mode: GitMode,
    /// Repository cloned by [`GitMode::Full`]; the current directory when unset
    pub git_source: Option<PathBuf>,
    /// Directory to diff the restored files against
    pub compare_with: Option<PathBuf>,
    /// Recorded in the rewind events
    pub requested_by: String,
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for RewindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewindOptions")
            .field("target_timestamp", &self.target_timestamp)
            .field("output_dir", &self.output_dir)
            .field("include_files", &self.include_files)
            .field("include_conversations", &self.include_conversations)
            .field("git_mode", &self.git_mode)
            .field("git_source", &self.git_source)
            .field("compare_with", &self.compare_with)
            .field("requested_by", &self.requested_by)
            .finish()
    }
}

impl RewindOptions {
    /// Defaults for a rewind to `target_timestamp`
    pub fn new(target_timestamp: i64) -> Self {
        Self {
            target_timestamp,
            output_dir: None,
            include_files: true,
            include_conversations: true,
            git_mode: GitMode::default(),
            git_source: None,
            compare_with: None,
            requested_by: "user".to_string(),
            progress: None,
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn include_files(mut self, include: bool) -> Self {
        self.include_files = include;
        self
    }

    pub fn include_conversations(mut self, include: bool) -> Self {
        self.include_conversations = include;
        self
    }

    pub fn git_mode(mut self, mode: GitMode) -> Self {
        self.git_mode = mode;
        self
    }

    pub fn git_source(mut self, repo: impl Into<PathBuf>) -> Self {
        self.git_source = Some(repo.into());
        self
    }

    pub fn compare_with(mut self, dir: impl Into<PathBuf>) -> Self {
        self.compare_with = Some(dir.into());
        self
    }

    pub fn requested_by(mut self, actor: impl Into<String>) -> Self {
        self.requested_by = actor.into();
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }
}

/// Step of the rewind state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewindStep {
    Validating,
    Started,
    SnapshotSelected,
    EventsReplayed,
    StateMaterialized,
    Completed,
}

impl RewindStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewindStep::Validating => "validating",
            RewindStep::Started => "started",
            RewindStep::SnapshotSelected => "snapshot_selected",
            RewindStep::EventsReplayed => "events_replayed",
            RewindStep::StateMaterialized => "state_materialized",
            RewindStep::Completed => "completed",
        }
    }
}

impl fmt::Display for RewindStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one path in a directory comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    /// Present only in the comparison directory
    Added,
    /// Present only in the rewind output
    Deleted,
    /// Present in both with different content
    Modified,
    Unchanged,
}

/// One compared path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileComparison {
    pub path: String,
    pub status: ComparisonStatus,
}

/// Rewind output versus another directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    /// Sorted by status, then path
    pub files: Vec<FileComparison>,
    pub added: usize,
    pub deleted: usize,
    pub modified: usize,
    pub unchanged: usize,
}

/// Outcome of a rewind; failures are reported here, never thrown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewindReport {
    pub success: bool,
    pub target_timestamp: i64,
    pub snapshot_used: Option<String>,
    pub events_replayed: usize,
    pub files_restored: usize,
    pub files_skipped: usize,
    pub output_directory: PathBuf,
    pub duration_ms: u64,
    /// Step reached when the rewind failed
    pub failed_step: Option<RewindStep>,
    pub error: Option<String>,
    pub comparison: Option<ComparisonReport>,
    /// Checkout written by [`GitMode::Full`]
    pub git_repository: Option<PathBuf>,
}

/// Reconstructed state without materialization
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub state: DerivedState,
    /// Snapshot the replay started from
    pub snapshot: Option<SnapshotMetadata>,
    pub events_replayed: usize,
}

/// Mutable progress of one rewind
struct RewindRun<'a> {
    options: &'a RewindOptions,
    output_dir: PathBuf,
    correlation_id: String,
    started_event: Option<String>,
    step: RewindStep,
    snapshot_used: Option<String>,
    events_replayed: usize,
    files_restored: usize,
    files_skipped: usize,
    comparison: Option<ComparisonReport>,
    git_repository: Option<PathBuf>,
}

enum RestoreOutcome {
    Restored,
    Skipped,
}

/// Time machine over the log, snapshots and blobs
pub struct RewindEngine {
    store: Arc<LogStore>,
    logger: Arc<EventLogger>,
    snapshots: Arc<SnapshotManager>,
    blobs: BlobStore,
    clock: ClockRef,
    store_root: PathBuf,
    parallel_workers: usize,
}

impl fmt::Debug for RewindEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewindEngine")
            .field("store_root", &self.store_root)
            .field("parallel_workers", &self.parallel_workers)
            .finish()
    }
}

impl RewindEngine {
    pub fn new(
        store: Arc<LogStore>,
        logger: Arc<EventLogger>,
        snapshots: Arc<SnapshotManager>,
        blobs: BlobStore,
        clock: ClockRef,
        store_root: impl Into<PathBuf>,
        parallel_workers: usize,
    ) -> Self {
        Self {
            store,
            logger,
            snapshots,
            blobs,
            clock,
            store_root: store_root.into(),
            parallel_workers: parallel_workers.max(1),
        }
    }

    /// Default output location for a target
    pub fn default_output_dir(&self, target_timestamp: i64) -> PathBuf {
        self.store_root
            .join("rewinds")
            .join(format!("rewind_{}", target_timestamp))
    }

    /// Reconstruct and materialize the state at `options.target_timestamp`
    ///
    /// Never returns an error: every failure is reported in the
    /// [`RewindReport`], and failures after validation are also recorded as
    /// a `REWIND_FAILED` event.
    #[instrument(skip(self, options), fields(target = options.target_timestamp))]
    pub fn rewind(&self, options: &RewindOptions) -> RewindReport {
        let start = Instant::now();
        let mut run = RewindRun {
            options,
            output_dir: options
                .output_dir
                .clone()
                .unwrap_or_else(|| self.default_output_dir(options.target_timestamp)),
            correlation_id: Uuid::new_v4().to_string(),
            started_event: None,
            step: RewindStep::Validating,
            snapshot_used: None,
            events_replayed: 0,
            files_restored: 0,
            files_skipped: 0,
            comparison: None,
            git_repository: None,
        };

        let outcome = self.validate(&run).and_then(|()| self.execute(&mut run, start));
        let duration_ms = start.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(()) => {
                info!(
                    "Rewind to {} completed: {} events replayed, {} files restored, {} skipped",
                    format_timestamp(options.target_timestamp),
                    run.events_replayed,
                    run.files_restored,
                    run.files_skipped
                );
                None
            }
            Err(e) => {
                warn!("Rewind failed at step {}: {}", run.step, e);
                if run.step != RewindStep::Validating {
                    let payload = RewindEventPayload {
                        step: Some(run.step.as_str().to_string()),
                        error: Some(e.to_string()),
                        duration_ms: Some(duration_ms),
                        ..self.payload(&run)
                    };
                    self.emit(&run, EventType::RewindFailed, payload);
                }
                Some(e.user_message())
            }
        };

        RewindReport {
            success: error.is_none(),
            target_timestamp: options.target_timestamp,
            snapshot_used: run.snapshot_used,
            events_replayed: run.events_replayed,
            files_restored: run.files_restored,
            files_skipped: run.files_skipped,
            output_directory: run.output_dir,
            duration_ms,
            failed_step: error.as_ref().map(|_| run.step),
            error,
            comparison: run.comparison,
            git_repository: run.git_repository,
        }
    }

    fn validate(&self, run: &RewindRun<'_>) -> Result<()> {
        let target = run.options.target_timestamp;
        let now = self.clock.now_micros();
        if target > now {
            return Err(TimelineError::FutureTimestamp { target, now });
        }
        if run.output_dir.exists() {
            return Err(TimelineError::OutputExists(run.output_dir.clone()));
        }
        if let Some(compare) = &run.options.compare_with {
            if !compare.is_dir() {
                return Err(TimelineError::validation(format!(
                    "comparison directory {:?} does not exist",
                    compare
                )));
            }
        }
        Ok(())
    }

    fn execute(&self, run: &mut RewindRun<'_>, start: Instant) -> Result<()> {
        let target = run.options.target_timestamp;

        run.step = RewindStep::Started;
        run.started_event = self.emit(run, EventType::RewindStarted, self.payload(run));
        self.report(run, "Selecting snapshot", 0, None);

        // Held until the rewind returns, so retention cannot prune the base
        let pin = self.snapshots.pin_snapshot_before(target)?;
        let (base, snapshot) = self.replay_base(pin.as_ref());
        run.snapshot_used = snapshot.as_ref().map(|s| s.snapshot_id.clone());
        let base_sequence = snapshot.as_ref().map_or(0, |s| s.sequence_number);
        run.step = RewindStep::SnapshotSelected;
        debug!("Rewind base: {:?} at sequence {}", run.snapshot_used, base_sequence);
        self.emit(run, EventType::RewindSnapshotLoaded, self.payload(run));

        self.report(run, "Replaying events", 0, None);
        let events = self.store.events_after(base_sequence, target)?;
        let mut state = base;
        run.events_replayed = state.apply_all(&events);
        run.step = RewindStep::EventsReplayed;
        self.emit(run, EventType::RewindEventsReplayed, self.payload(run));

        self.materialize(run, &state)?;
        run.step = RewindStep::StateMaterialized;
        self.emit(run, EventType::RewindStateMaterialized, self.payload(run));

        if let Some(compare) = &run.options.compare_with {
            self.report(run, "Comparing directories", 0, None);
            run.comparison = Some(compare_directories(&run.output_dir.join(FILES_DIR), compare)?);
        }

        run.step = RewindStep::Completed;
        let payload = RewindEventPayload {
            duration_ms: Some(start.elapsed().as_millis() as u64),
            ..self.payload(run)
        };
        self.emit(run, EventType::RewindCompleted, payload);
        self.report(run, "Rewind complete", 1, Some(1));
        drop(pin);
        Ok(())
    }

    fn materialize(&self, run: &mut RewindRun<'_>, state: &DerivedState) -> Result<()> {
        if let Some(parent) = run.output_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        // create_dir rather than create_dir_all: a directory that appeared
        // since validation must not be written into
        fs::create_dir(&run.output_dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => TimelineError::OutputExists(run.output_dir.clone()),
            _ => e.into(),
        })?;

        let mut session = state.session.clone();
        if !run.options.include_conversations {
            session.conversation.clear();
        }
        write_json(&run.output_dir.join(SESSION_STATE_FILE), &session)?;
        if run.options.git_mode != GitMode::None {
            write_json(&run.output_dir.join(GIT_STATE_FILE), &state.git)?;
        }
        write_json(&run.output_dir.join(FILE_MANIFEST_FILE), &state.files.files)?;

        if run.options.include_files {
            let files_dir = run.output_dir.join(FILES_DIR);
            fs::create_dir(&files_dir)?;
            let (restored, skipped) = self.restore_files(run, &files_dir, &state.files.files)?;
            run.files_restored = restored;
            run.files_skipped = skipped;
        }

        if run.options.git_mode == GitMode::Full {
            self.report(run, "Materializing git repository", 0, None);
            run.git_repository = checkout_repository(run.options.git_source.as_deref(), &run.output_dir, &state.git);
        }
        Ok(())
    }

    /// Write every existing file's blob under `files_dir`, in parallel
    fn restore_files(
        &self,
        run: &RewindRun<'_>,
        files_dir: &Path,
        files: &BTreeMap<String, FileEntry>,
    ) -> Result<(usize, usize)> {
        let existing: Vec<(&String, &FileEntry)> = files.iter().filter(|(_, entry)| entry.exists).collect();
        let total = existing.len();
        let processed = AtomicUsize::new(0);
        debug!("Restoring {} files with {} workers", total, self.parallel_workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()
            .map_err(|e| TimelineError::internal(format!("failed to build restore pool: {}", e)))?;

        let results: Vec<Result<RestoreOutcome>> = pool.install(|| {
            existing
                .par_iter()
                .map(|(path, entry)| -> Result<RestoreOutcome> {
                    let outcome = self.restore_one(files_dir, path, entry);
                    let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.report(run, &format!("Restored {}", path), done, Some(total));
                    outcome
                })
                .collect()
        });

        let mut restored = 0;
        let mut skipped = 0;
        for result in results {
            match result? {
                RestoreOutcome::Restored => restored += 1,
                RestoreOutcome::Skipped => skipped += 1,
            }
        }
        Ok((restored, skipped))
    }

    fn restore_one(&self, files_dir: &Path, path: &str, entry: &FileEntry) -> Result<RestoreOutcome> {
        let Some(relative) = safe_relative_path(path) else {
            warn!("Skipping unsafe path {:?}", path);
            return Ok(RestoreOutcome::Skipped);
        };
        let Some(hash) = entry.content_hash.as_deref() else {
            debug!("No content recorded for {}, skipping", path);
            return Ok(RestoreOutcome::Skipped);
        };
        let Some(content) = self.blobs.retrieve(hash) else {
            warn!("Blob {} for {} unavailable, skipping", hash, path);
            return Ok(RestoreOutcome::Skipped);
        };

        let target = files_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &content)?;
        trace!("Restored {} ({} bytes)", path, content.len());
        Ok(RestoreOutcome::Restored)
    }

    /// State at `target` via the nearest snapshot plus replay
    pub fn reconstruct(&self, target: i64) -> Result<Reconstruction> {
        let pin = self.snapshots.pin_snapshot_before(target)?;
        let (mut state, snapshot) = self.replay_base(pin.as_ref());
        let after = snapshot.as_ref().map_or(0, |s| s.sequence_number);
        let events = self.store.events_after(after, target)?;
        let events_replayed = state.apply_all(&events);
        Ok(Reconstruction {
            state,
            snapshot,
            events_replayed,
        })
    }

    /// Starting state for replay: the pinned snapshot's state, or empty
    ///
    /// A snapshot that is gone or fails to decode yields an empty base, and
    /// replay then starts at the beginning of the log.
    fn replay_base(&self, pin: Option<&SnapshotPin>) -> (DerivedState, Option<SnapshotMetadata>) {
        let Some(pin) = pin else {
            return (DerivedState::default(), None);
        };
        let metadata = pin.metadata();
        match self.snapshots.read_data(&metadata.snapshot_id) {
            Ok(Some(data)) => (data.derived_state(), Some(metadata.clone())),
            Ok(None) => (DerivedState::default(), None),
            Err(e) => {
                warn!(
                    "Snapshot {} unreadable, replaying from the beginning: {}",
                    metadata.snapshot_id, e
                );
                (DerivedState::default(), None)
            }
        }
    }

    /// State at `target` by replaying the whole log, ignoring snapshots
    pub fn reconstruct_from_scratch(&self, target: i64) -> Result<Reconstruction> {
        let events = self.store.events_after(0, target)?;
        let mut state = DerivedState::default();
        let events_replayed = state.apply_all(&events);
        Ok(Reconstruction {
            state,
            snapshot: None,
            events_replayed,
        })
    }

    fn payload(&self, run: &RewindRun<'_>) -> RewindEventPayload {
        RewindEventPayload {
            target_timestamp: run.options.target_timestamp,
            target_timestamp_human: Some(format_timestamp(run.options.target_timestamp)),
            output_dir: Some(run.output_dir.display().to_string()),
            requested_by: Some(run.options.requested_by.clone()),
            snapshot_id: run.snapshot_used.clone(),
            events_replayed: Some(run.events_replayed as u64),
            files_restored: Some(run.files_restored as u64),
            files_skipped: Some(run.files_skipped as u64),
            step: Some(run.step.as_str().to_string()),
            ..Default::default()
        }
    }

    /// Record a state transition; returns the new event's id
    fn emit(&self, run: &RewindRun<'_>, event_type: EventType, payload: RewindEventPayload) -> Option<String> {
        let mut input = EventInput::new(event_type, "system")
            .aggregate(run.options.target_timestamp.to_string(), "rewind")
            .correlation(run.correlation_id.clone())
            .payload(payload);
        if let Some(started) = &run.started_event {
            input = input.caused_by(started.clone());
        }

        let result = self.logger.log(input);
        if !result.success {
            warn!("Rewind event not recorded: {}", result.error.unwrap_or_default());
        }
        result.event_id
    }

    fn report(&self, run: &RewindRun<'_>, message: &str, processed: usize, total: Option<usize>) {
        if let Some(callback) = &run.options.progress {
            callback(ProgressInfo {
                operation: "rewind".to_string(),
                message: message.to_string(),
                processed,
                total,
            });
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Relative path to content hash for every visible file under `root`
fn hash_tree(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    if !root.is_dir() {
        return Ok(hashes);
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| TimelineError::internal(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        hashes.insert(relative, hash_file_content(entry.path())?);
    }
    Ok(hashes)
}

/// Clone `source` under `output_dir` and check out the recorded commit
///
/// Best effort: a missing repository, a failed clone or an unknown commit
/// is logged and leaves no checkout behind. A branch that cannot be checked
/// out leaves the clone detached at the commit.
fn checkout_repository(source: Option<&Path>, output_dir: &Path, git: &GitState) -> Option<PathBuf> {
    let source = match source {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    if run_git(&source, &["rev-parse", "--git-dir"]).is_none() {
        warn!("{:?} is not a git repository, skipping git materialization", source);
        return None;
    }

    let destination = match fs::canonicalize(output_dir) {
        Ok(dir) => dir.join(REPOSITORY_DIR),
        Err(e) => {
            warn!("Cannot resolve {:?}, skipping git materialization: {}", output_dir, e);
            return None;
        }
    };
    let destination_arg = destination.to_string_lossy().to_string();
    if run_git(&source, &["clone", "--quiet", ".", &destination_arg]).is_none() {
        warn!("Failed to clone {:?}, skipping git materialization", source);
        return None;
    }

    if let Some(commit) = &git.commit_hash {
        if run_git(&destination, &["checkout", "--quiet", commit]).is_none() {
            warn!("Commit {} not found in {:?}, skipping git materialization", commit, source);
            if let Err(e) = fs::remove_dir_all(&destination) {
                warn!("Failed to remove partial clone {:?}: {}", destination, e);
            }
            return None;
        }
    }
    if let Some(branch) = &git.branch {
        // With a recorded commit the branch is re-pointed at it, not at its current tip
        let args: &[&str] = match git.commit_hash {
            Some(_) => &["checkout", "--quiet", "-B", branch],
            None => &["checkout", "--quiet", branch],
        };
        if run_git(&destination, args).is_none() {
            warn!("Could not check out branch {}, staying on {:?}", branch, git.commit_hash);
        }
    }
    debug!("Materialized git repository at {:?}", destination);
    Some(destination)
}

/// Classify every file under `rewound` and `current` by content
///
/// Hidden entries are ignored on both sides.
pub fn compare_directories(rewound: &Path, current: &Path) -> Result<ComparisonReport> {
    let before = hash_tree(rewound)?;
    let after = hash_tree(current)?;

    let mut files = Vec::new();
    for (path, hash) in &before {
        let status = match after.get(path) {
            None => ComparisonStatus::Deleted,
            Some(other) if other == hash => ComparisonStatus::Unchanged,
            Some(_) => ComparisonStatus::Modified,
        };
        files.push(FileComparison {
            path: path.clone(),
            status,
        });
    }
    for path in after.keys().filter(|p| !before.contains_key(*p)) {
        files.push(FileComparison {
            path: path.clone(),
            status: ComparisonStatus::Added,
        });
    }
    files.sort_by(|a, b| a.status.cmp(&b.status).then_with(|| a.path.cmp(&b.path)));

    let count = |status| files.iter().filter(|f| f.status == status).count();
    Ok(ComparisonReport {
        added: count(ComparisonStatus::Added),
        deleted: count(ComparisonStatus::Deleted),
        modified: count(ComparisonStatus::Modified),
        unchanged: count(ComparisonStatus::Unchanged),
        files,
    })
}
