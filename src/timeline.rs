//! Timeline facade
//!
//! [`Timeline`] owns one store's log, blobs, snapshots and engines and is
//! the main entry point of the crate. It is cheap to clone: clones share the
//! same components, which lets the async wrappers move a handle onto the
//! blocking pool.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── config.json     # StoreMetadata, written by init
//! ├── timeline.db     # events, snapshots, metadata
//! ├── objects/        # content-addressed blobs
//! └── rewinds/        # default rewind outputs
//! ```
//!
//! ## Examples
//!
//! ```rust,no_run
//! use chronolog::{EventInput, EventType, RewindOptions, Timeline};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let timeline = Timeline::init(".chronolog")?;
//! let result = timeline.log(EventInput::new(EventType::SessionCreated, "user"));
//! assert!(result.success);
//!
//! let report = timeline.rewind(&RewindOptions::new(chrono::Utc::now().timestamp_micros()));
//! println!("restored {} files", report.files_restored);
//! # Ok(())
//! # }
//! ```

use crate::blob_store::BlobStore;
use crate::clock::{system_clock, ClockRef};
use crate::compression::{CompressionEngine, CompressionStrategy};
use crate::error::{Result, TimelineError};
use crate::event::{EventInput, EventType};
use crate::hooks::{EventSink, FileHook, GitHook, SessionHook, ToolHook};
use crate::log_store::{EventRecord, LogStore};
use crate::logger::{EventListener, EventLogger, LogResult, SubscriptionId};
use crate::query::QueryEngine;
use crate::rewind::{RewindEngine, RewindOptions, RewindReport};
use crate::snapshot::{SnapshotManager, SnapshotMetadata, StateProvider};
use crate::types::{SnapshotConfig, StoreMetadata, TimelineConfig};
use crate::utils::atomic_write;
use crate::verification::{IntegrityReport, IntegrityVerifier};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Database file name under the store root
pub const DATABASE_FILE: &str = "timeline.db";
/// Configuration file name under the store root
pub const CONFIG_FILE: &str = "config.json";
/// Current on-disk layout version
pub const FORMAT_VERSION: u32 = 1;

struct Inner {
    root: PathBuf,
    config: TimelineConfig,
    clock: ClockRef,
    store: Arc<LogStore>,
    logger: Arc<EventLogger>,
    blobs: BlobStore,
    snapshots: Arc<SnapshotManager>,
    query: QueryEngine,
    rewind: RewindEngine,
}

/// Handle to one timeline store
#[derive(Clone)]
pub struct Timeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("root", &self.inner.root)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Timeline {
    /// Create a new store at `root` with default settings
    ///
    /// # Errors
    ///
    /// [`TimelineError::StoreAlreadyExists`] if `root` already holds a store.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        TimelineBuilder::new().init(root)
    }

    /// Open an existing store at `root`
    ///
    /// # Errors
    ///
    /// [`TimelineError::StoreNotInitialized`] if `root` holds no store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        TimelineBuilder::new().open(root)
    }

    pub fn builder() -> TimelineBuilder {
        TimelineBuilder::new()
    }

    /// Whether `root` holds a store
    pub fn exists(root: impl AsRef<Path>) -> bool {
        root.as_ref().join(CONFIG_FILE).is_file()
    }

    fn assemble(root: PathBuf, config: TimelineConfig, clock: ClockRef) -> Result<Self> {
        let store = Arc::new(LogStore::open(root.join(DATABASE_FILE))?);
        let logger = Arc::new(EventLogger::new(store.clone(), clock.clone()));
        logger.set_enabled(config.logging_enabled);

        let blobs = BlobStore::open(&root, CompressionEngine::new(config.compression_strategy.clone()))?;
        let snapshots = Arc::new(SnapshotManager::new(
            store.clone(),
            logger.clone(),
            clock.clone(),
            config.snapshot.clone(),
            CompressionEngine::new(config.compression_strategy.clone()),
        )?);
        let query = QueryEngine::new(store.clone());
        let rewind = RewindEngine::new(
            store.clone(),
            logger.clone(),
            snapshots.clone(),
            blobs.clone(),
            clock.clone(),
            root.clone(),
            config.parallel_workers,
        );

        Ok(Self {
            inner: Arc::new(Inner {
                root,
                config,
                clock,
                store,
                logger,
                blobs,
                snapshots,
                query,
                rewind,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &ClockRef {
        &self.inner.clock
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.inner.store
    }

    pub fn logger(&self) -> &Arc<EventLogger> {
        &self.inner.logger
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.inner.snapshots
    }

    pub fn query(&self) -> &QueryEngine {
        &self.inner.query
    }

    pub fn rewind_engine(&self) -> &RewindEngine {
        &self.inner.rewind
    }

    /// Install the live session/git accessor consulted by snapshots
    pub fn set_state_provider(&self, provider: Arc<dyn StateProvider>) {
        self.inner.snapshots.set_state_provider(provider);
    }

    /// Append one event and consult the event-count snapshot trigger
    ///
    /// Fail-soft like [`EventLogger::log`].
    pub fn log(&self, input: EventInput) -> LogResult {
        let result = self.inner.logger.log(input);
        if let Some(sequence) = result.sequence_number {
            self.inner.snapshots.on_event_appended(sequence);
        }
        result
    }

    /// Append several events atomically
    pub fn log_batch(&self, inputs: Vec<EventInput>) -> Vec<LogResult> {
        let results = self.inner.logger.log_batch(inputs);
        for sequence in results.iter().filter_map(|r| r.sequence_number) {
            self.inner.snapshots.on_event_appended(sequence);
        }
        results
    }

    /// Store content as a blob, honouring `max_blob_size`
    ///
    /// `Ok(None)` means the content is over the limit.
    pub fn store_blob(&self, content: &[u8]) -> Result<Option<String>> {
        self.inner.blobs.store_with_limit(content, self.inner.config.max_blob_size)
    }

    pub fn retrieve_blob(&self, hash: &str) -> Option<Vec<u8>> {
        self.inner.blobs.retrieve(hash)
    }

    #[instrument(skip(self))]
    pub fn create_snapshot(&self, reason: &str) -> Result<SnapshotMetadata> {
        self.inner.snapshots.create_snapshot(reason)
    }

    /// Reconstruct the state at a past instant into a fresh directory
    #[instrument(skip(self, options), fields(target = options.target_timestamp))]
    pub fn rewind(&self, options: &RewindOptions) -> RewindReport {
        self.inner.rewind.rewind(options)
    }

    /// Check events, blobs and snapshots
    #[instrument(skip(self))]
    pub fn verify(&self) -> Result<IntegrityReport> {
        IntegrityVerifier::new(
            &self.inner.store,
            &self.inner.logger,
            &self.inner.blobs,
            &self.inner.snapshots,
        )
        .verify_store()
    }

    /// File hook rooted at `working_dir`, appending through this timeline
    pub fn file_hook(&self, working_dir: impl Into<PathBuf>) -> FileHook {
        FileHook::new(
            Arc::new(self.clone()),
            self.inner.blobs.clone(),
            working_dir,
            self.inner.config.max_blob_size,
        )
    }

    pub fn git_hook(&self) -> GitHook {
        GitHook::new(Arc::new(self.clone()))
    }

    pub fn session_hook(&self) -> SessionHook {
        SessionHook::new(Arc::new(self.clone()))
    }

    pub fn tool_hook(&self) -> ToolHook {
        ToolHook::new(Arc::new(self.clone()))
    }

    /// Run `listener` after each appended event of `event_type`, or of
    /// every type when `None`
    ///
    /// Covers events from every producer, including the snapshot and
    /// rewind events the timeline writes itself. See
    /// [`EventLogger::subscribe`].
    pub fn subscribe(&self, event_type: Option<EventType>, listener: EventListener) -> SubscriptionId {
        self.inner.logger.subscribe(event_type, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.logger.unsubscribe(id)
    }

    /// [`log`](Self::log) on the blocking pool
    pub async fn log_async(&self, input: EventInput) -> Result<LogResult> {
        let this = self.clone();
        Ok(tokio::task::spawn_blocking(move || this.log(input)).await?)
    }

    /// [`rewind`](Self::rewind) on the blocking pool
    pub async fn rewind_async(&self, options: RewindOptions) -> Result<RewindReport> {
        let this = self.clone();
        Ok(tokio::task::spawn_blocking(move || this.rewind(&options)).await?)
    }

    /// [`create_snapshot`](Self::create_snapshot) on the blocking pool
    pub async fn create_snapshot_async(&self, reason: String) -> Result<SnapshotMetadata> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.create_snapshot(&reason)).await?
    }

    /// Drive the time-based snapshot trigger from a tokio interval
    ///
    /// The task checks the trigger every `poll` and runs until aborted.
    /// Must be called from within a tokio runtime.
    pub fn start_auto_snapshots(&self, poll: Duration) -> JoinHandle<()> {
        let snapshots = self.inner.snapshots.clone();
        let poll = poll.max(Duration::from_millis(10));
        info!("Auto snapshots polling every {:?}", poll);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let snapshots = snapshots.clone();
                match tokio::task::spawn_blocking(move || snapshots.tick()).await {
                    Ok(Some(metadata)) => debug!("Interval snapshot {}", metadata.snapshot_id),
                    Ok(None) => {}
                    Err(e) => debug!("Snapshot tick task failed: {}", e),
                }
            }
        })
    }
}

impl EventSink for Timeline {
    fn append(&self, input: EventInput) -> Result<EventRecord> {
        let record = self.inner.logger.try_log(input)?;
        self.inner.snapshots.on_event_appended(record.sequence_number);
        Ok(record)
    }
}

/// Builder for [`Timeline`]
///
/// # Defaults
///
/// - `max_blob_size`: 10 MiB
/// - compression: fast LZ4
/// - snapshots: every 100 events or 5 minutes, 50 kept
/// - `parallel_workers`: number of CPU cores
/// - clock: system clock
#[derive(Clone)]
pub struct TimelineBuilder {
    config: TimelineConfig,
    clock: Option<ClockRef>,
}

impl std::fmt::Debug for TimelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self {
            config: TimelineConfig::default(),
            clock: None,
        }
    }

    /// Largest content stored as a blob, 0 for no limit
    pub fn max_blob_size(mut self, size: u64) -> Self {
        self.config.max_blob_size = size;
        self
    }

    pub fn compression_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.config.compression_strategy = strategy;
        self
    }

    pub fn snapshot_config(mut self, snapshot: SnapshotConfig) -> Self {
        self.config.snapshot = snapshot;
        self
    }

    /// Snapshot after this many events, 0 to disable the count trigger
    pub fn events_interval(mut self, events: u64) -> Self {
        self.config.snapshot.events_interval = events;
        self
    }

    pub fn time_interval(mut self, interval: Duration) -> Self {
        self.config.snapshot.time_interval_secs = interval.as_secs();
        self
    }

    pub fn max_snapshots(mut self, count: usize) -> Self {
        self.config.snapshot.max_snapshots = count;
        self
    }

    pub fn auto_snapshots(mut self, enabled: bool) -> Self {
        self.config.snapshot.auto_enabled = enabled;
        self
    }

    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.config.logging_enabled = enabled;
        self
    }

    /// Restore threads during rewind (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.config.parallel_workers = count.max(1);
        self
    }

    /// Clock used to stamp events; not persisted
    pub fn clock(mut self, clock: ClockRef) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Open the store at `root`, creating it if needed
    pub fn build(self, root: impl AsRef<Path>) -> Result<Timeline> {
        if Timeline::exists(&root) {
            self.open(root)
        } else {
            self.init(root)
        }
    }

    /// Create a new store at `root` with this configuration
    #[instrument(skip(self, root), fields(path = %root.as_ref().display()))]
    pub fn init(self, root: impl AsRef<Path>) -> Result<Timeline> {
        let root = root.as_ref().to_path_buf();
        if Timeline::exists(&root) {
            return Err(TimelineError::StoreAlreadyExists(root));
        }
        if self.config.parallel_workers == 0 {
            return Err(TimelineError::InvalidConfiguration(
                "parallel_workers must be at least 1".to_string(),
            ));
        }
        fs::create_dir_all(&root)?;

        let timeline = Timeline::assemble(root.clone(), self.config.clone(), self.clock.unwrap_or_else(system_clock))?;
        let metadata = StoreMetadata {
            format_version: FORMAT_VERSION,
            chronolog_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now(),
            config: self.config,
        };
        atomic_write(&root.join(CONFIG_FILE), &serde_json::to_vec_pretty(&metadata)?)?;
        info!("Initialized timeline store at {:?}", root);
        Ok(timeline)
    }

    /// Open an existing store; its persisted configuration wins over the
    /// builder's, except for the clock
    #[instrument(skip(self, root), fields(path = %root.as_ref().display()))]
    pub fn open(self, root: impl AsRef<Path>) -> Result<Timeline> {
        let root = root.as_ref().to_path_buf();
        let config_path = root.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(TimelineError::StoreNotInitialized(root));
        }
        let metadata: StoreMetadata = serde_json::from_slice(&fs::read(&config_path)?)?;
        if metadata.format_version > FORMAT_VERSION {
            return Err(TimelineError::InvalidConfiguration(format!(
                "store format {} is newer than supported format {}",
                metadata.format_version, FORMAT_VERSION
            )));
        }
        debug!("Opening store created by chronolog {}", metadata.chronolog_version);
        Timeline::assemble(root, metadata.config, self.clock.unwrap_or_else(system_clock))
    }
}

impl Default for TimelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::{Event, FileChangePayload};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn builder(clock: &Arc<ManualClock>) -> TimelineBuilder {
        TimelineBuilder::new().clock(clock.clone()).parallel_workers(2)
    }

    #[test]
    fn test_init_then_open() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("store");
        let clock = Arc::new(ManualClock::new(1_000));

        let timeline = builder(&clock).max_blob_size(64).init(&root).unwrap();
        assert!(root.join(CONFIG_FILE).is_file());
        assert!(root.join(DATABASE_FILE).is_file());
        assert!(timeline.log(EventInput::new(EventType::CliStarted, "user")).success);
        drop(timeline);

        assert!(matches!(
            builder(&clock).init(&root),
            Err(TimelineError::StoreAlreadyExists(_))
        ));

        let reopened = builder(&clock).max_blob_size(1).open(&root).unwrap();
        assert_eq!(reopened.config().max_blob_size, 64);
        assert_eq!(reopened.store().event_count().unwrap(), 1);
    }

    #[test]
    fn test_open_missing_store() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Timeline::open(temp_dir.path().join("nothing")),
            Err(TimelineError::StoreNotInitialized(_))
        ));
    }

    #[test]
    fn test_log_drives_event_trigger() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock).events_interval(3).build(temp_dir.path()).unwrap();

        for i in 0..3 {
            clock.advance(10);
            let input = EventInput::new(EventType::FileCreated, "user")
                .payload(FileChangePayload::path_only(format!("f{}.txt", i)));
            assert!(timeline.log(input).success);
        }
        let snapshots = timeline.snapshots().list_snapshots().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].sequence_number, 3);
        assert_eq!(snapshots[0].reason, "auto_event");
    }

    #[test]
    fn test_snapshot_config_disables_triggers() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock)
            .snapshot_config(SnapshotConfig {
                events_interval: 1,
                auto_enabled: false,
                ..Default::default()
            })
            .build(temp_dir.path())
            .unwrap();

        for _ in 0..3 {
            clock.advance(10);
            assert!(timeline.log(EventInput::new(EventType::CliCommandExecuted, "user")).success);
        }
        assert!(timeline.snapshots().list_snapshots().unwrap().is_empty());
        assert_eq!(timeline.config().snapshot.events_interval, 1);
    }

    #[test]
    fn test_hooks_append_through_timeline() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock).events_interval(2).build(temp_dir.path().join("store")).unwrap();
        let work = temp_dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("a.txt"), b"hello").unwrap();

        let hook = timeline.file_hook(&work);
        hook.record_created("a.txt").unwrap();
        hook.record_deleted("a.txt").unwrap();
        assert_eq!(timeline.snapshots().list_snapshots().unwrap().len(), 1);
    }

    #[test]
    fn test_subscribers_see_internal_events() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock).events_interval(2).build(temp_dir.path()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = timeline.subscribe(
            Some(EventType::SnapshotCreated),
            Arc::new(move |event: &Event| sink.lock().push(event.sequence_number)),
        );
        let hook = timeline.tool_hook();
        hook.record_call_started("s1", "bash", serde_json::Value::Null).unwrap();
        clock.advance(10);
        hook.record_call_failed("s1", "bash", serde_json::Value::Null, "exit 1", None, None)
            .unwrap();
        assert_eq!(*seen.lock(), vec![3]);

        assert!(timeline.unsubscribe(id));
        timeline.create_snapshot("manual").unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_store_blob_honours_limit() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock).max_blob_size(4).build(temp_dir.path()).unwrap();

        let hash = timeline.store_blob(b"tiny").unwrap().unwrap();
        assert_eq!(timeline.retrieve_blob(&hash).unwrap(), b"tiny");
        assert!(timeline.store_blob(b"too large").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock).auto_snapshots(false).build(temp_dir.path()).unwrap();

        let result = timeline
            .log_async(EventInput::new(EventType::SessionCreated, "user"))
            .await
            .unwrap();
        assert!(result.success);

        let snapshot = timeline.create_snapshot_async("manual".to_string()).await.unwrap();
        assert_eq!(snapshot.sequence_number, 1);

        clock.advance(1_000);
        let report = timeline
            .rewind_async(RewindOptions::new(1_500).output_dir(temp_dir.path().join("out")))
            .await
            .unwrap();
        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.snapshot_used, Some(snapshot.snapshot_id));
    }

    #[tokio::test]
    async fn test_auto_snapshot_task_ticks() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let timeline = builder(&clock)
            .events_interval(0)
            .time_interval(Duration::from_secs(1))
            .build(temp_dir.path())
            .unwrap();
        assert!(timeline.log(EventInput::new(EventType::CliStarted, "user")).success);
        clock.advance(2_000_000);

        let handle = timeline.start_auto_snapshots(Duration::from_millis(10));
        for _ in 0..200 {
            if !timeline.snapshots().list_snapshots().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        let snapshots = timeline.snapshots().list_snapshots().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].reason, "auto_time");
    }
}
