//! End-to-end timeline scenarios
//!
//! Drives a real on-disk store through a manual clock so every event lands
//! at a known instant, then checks rewinds, queries and snapshots against
//! what the history says should be true.

use ::chronolog::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Store plus manual clock, rooted in a temporary directory
pub struct TimelineTestHarness {
    pub temp_dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub timeline: Timeline,
}

impl TimelineTestHarness {
    pub fn new() -> Self {
        Self::with_builder(TimelineBuilder::new().auto_snapshots(false))
    }

    pub fn with_builder(builder: TimelineBuilder) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let timeline = builder
            .clock(clock.clone())
            .init(temp_dir.path().join("store"))
            .unwrap();
        Self {
            temp_dir,
            clock,
            timeline,
        }
    }

    /// Append `input` with the clock set to `at`
    pub fn log_at(&self, at: i64, input: EventInput) -> LogResult {
        self.clock.set(at);
        let result = self.timeline.log(input);
        assert!(result.success, "append failed: {:?}", result.error);
        result
    }

    pub fn file_event(&self, at: i64, event_type: EventType, path: &str, content: Option<&[u8]>) -> (LogResult, Option<String>) {
        let hash = content.map(|bytes| self.timeline.store_blob(bytes).unwrap().unwrap());
        let payload = match &hash {
            Some(hash) => FileChangePayload::new(path, hash.clone()),
            None => FileChangePayload::path_only(path),
        };
        let result = self.log_at(
            at,
            EventInput::new(event_type, "user").aggregate(path, "file").payload(payload),
        );
        (result, hash)
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Rewind with the clock parked well after every event
    pub fn rewind_to(&self, target: i64, name: &str) -> (RewindReport, PathBuf) {
        self.clock.set(target.max(self.clock.now_micros()) + 1_000_000);
        let output = self.output(name);
        let report = self.timeline.rewind(&RewindOptions::new(target).output_dir(&output));
        assert!(report.success, "rewind failed: {:?}", report.error);
        (report, output)
    }
}

impl Default for TimelineTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn manifest(output: &Path) -> Value {
    serde_json::from_slice(&fs::read(output.join("file_manifest.json")).unwrap()).unwrap()
}

fn json_file(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn test_file_history_rewind_points() {
    let harness = TimelineTestHarness::new();
    let (_, h1) = harness.file_event(100, EventType::FileCreated, "a.txt", Some(b"first"));
    let (_, h2) = harness.file_event(200, EventType::FileModified, "a.txt", Some(b"second"));
    harness.file_event(300, EventType::FileDeleted, "a.txt", None);
    let h1 = h1.unwrap();
    let h2 = h2.unwrap();
    assert_ne!(h1, h2);

    let (report, output) = harness.rewind_to(250, "at_250");
    assert_eq!(report.events_replayed, 2);
    assert_eq!(report.files_restored, 1);
    assert_eq!(fs::read(output.join("files/a.txt")).unwrap(), b"second");
    let entry = &manifest(&output)["a.txt"];
    assert_eq!(entry["exists"], true);
    assert_eq!(entry["content_hash"], h2.as_str());

    let (report, output) = harness.rewind_to(350, "at_350");
    assert_eq!(report.events_replayed, 3);
    assert_eq!(report.files_restored, 0);
    assert!(!output.join("files/a.txt").exists());
    let entry = &manifest(&output)["a.txt"];
    assert_eq!(entry["exists"], false);
    assert!(entry["content_hash"].is_null());

    let (_, output) = harness.rewind_to(150, "at_150");
    assert_eq!(fs::read(output.join("files/a.txt")).unwrap(), b"first");
    assert_eq!(manifest(&output)["a.txt"]["content_hash"], h1.as_str());
}

#[test]
fn test_replay_survives_mistyped_side_fields() {
    let harness = TimelineTestHarness::new();
    harness.log_at(
        100,
        EventInput::new(EventType::FileCreated, "user").payload_json(serde_json::json!({"path": "a.txt", "new_hash": "H1"})),
    );
    harness.log_at(
        200,
        EventInput::new(EventType::FileModified, "user")
            .payload_json(serde_json::json!({"path": "a.txt", "new_hash": "H2", "size": "12"})),
    );
    harness.log_at(
        220,
        EventInput::new(EventType::GitCommit, "git").payload_json(serde_json::json!({"hash": "abc123", "message": null})),
    );
    harness.clock.set(1_000);

    let state = harness.timeline.rewind_engine().reconstruct(250).unwrap().state;
    assert_eq!(state.files.get("a.txt").unwrap().content_hash.as_deref(), Some("H2"));
    assert_eq!(state.git.commit_hash.as_deref(), Some("abc123"));

    // The stored text is untouched, so the checksums still verify
    assert!(harness.timeline.logger().verify_all().unwrap().is_clean());
}

#[test]
fn test_replay_overrides_snapshot_contents() {
    let harness = TimelineTestHarness::new();
    let (_, h3) = harness.file_event(1_000, EventType::FileCreated, "b.txt", Some(b"from snapshot"));
    for i in 1..50 {
        harness.log_at(
            1_000 + i * 10,
            EventInput::new(EventType::CliCommandExecuted, "user").payload_json(serde_json::json!({ "n": i })),
        );
    }
    assert_eq!(harness.timeline.store().current_sequence().unwrap(), 50);

    harness.clock.set(2_000);
    let snapshot = harness.timeline.create_snapshot("manual").unwrap();
    assert_eq!(snapshot.sequence_number, 50);
    assert_eq!(snapshot.file_count, 1);
    let data = harness.timeline.snapshots().read_data(&snapshot.snapshot_id).unwrap().unwrap();
    assert_eq!(data.file_state.get("b.txt").unwrap().content_hash, h3);

    let (modified, h4) = harness.file_event(3_000, EventType::FileModified, "b.txt", Some(b"after snapshot"));
    assert!(modified.sequence_number.unwrap() > snapshot.sequence_number);

    let (report, output) = harness.rewind_to(4_000, "after_snapshot");
    assert_eq!(report.snapshot_used.as_deref(), Some(snapshot.snapshot_id.as_str()));
    assert_eq!(manifest(&output)["b.txt"]["content_hash"], h4.unwrap().as_str());
    assert_eq!(fs::read(output.join("files/b.txt")).unwrap(), b"after snapshot");

    let (report, output) = harness.rewind_to(2_500, "at_snapshot");
    assert_eq!(report.snapshot_used.as_deref(), Some(snapshot.snapshot_id.as_str()));
    assert_eq!(fs::read(output.join("files/b.txt")).unwrap(), b"from snapshot");
}

#[test]
fn test_causation_tree_shape() {
    let harness = TimelineTestHarness::new();
    let root = harness.log_at(10, EventInput::new(EventType::ToolCallStarted, "assistant"));
    let root_id = root.event_id.unwrap();
    let first = harness.log_at(20, EventInput::new(EventType::FileModified, "assistant").caused_by(&root_id));
    let second = harness.log_at(30, EventInput::new(EventType::ToolCallSuccess, "assistant").caused_by(&root_id));
    let first_id = first.event_id.unwrap();
    let grandchild = harness.log_at(40, EventInput::new(EventType::GitAdd, "assistant").caused_by(&first_id));
    harness.log_at(50, EventInput::new(EventType::CliCommandExecuted, "user"));

    let tree = harness.timeline.query().get_causation_chain(&root_id).unwrap().unwrap();
    assert_eq!(tree.event.id, root_id);
    assert_eq!(tree.descendant_count(), 3);
    assert_eq!(tree.height(), 2);

    let children: Vec<&str> = tree.children.iter().map(|c| c.event.id.as_str()).collect();
    assert_eq!(children, vec![first_id.as_str(), second.event_id.as_deref().unwrap()]);
    assert_eq!(tree.children[0].children.len(), 1);
    assert_eq!(tree.children[0].children[0].event.id, grandchild.event_id.unwrap());
    assert!(tree.children[1].children.is_empty());
}

#[test]
fn test_rewind_leaves_history_untouched() {
    let harness = TimelineTestHarness::new();
    for (i, name) in ["one.txt", "two.txt", "three.txt"].iter().enumerate() {
        harness.file_event(100 * (i as i64 + 1), EventType::FileCreated, name, Some(name.as_bytes()));
    }
    harness.clock.set(1_000);
    harness.timeline.create_snapshot("manual").unwrap();
    harness.file_event(2_000, EventType::FileModified, "one.txt", Some(b"changed"));

    let store = harness.timeline.store();
    let before_events = store.events_after(0, i64::MAX).unwrap();
    let before_snapshots = harness.timeline.snapshots().list_snapshots().unwrap();
    let before_blobs = harness.timeline.blobs().stats().unwrap();

    let output = harness.output("rewound");
    assert!(!output.exists());
    harness.clock.set(10_000);
    let report = harness
        .timeline
        .rewind(&RewindOptions::new(1_500).output_dir(&output));
    assert!(report.success);

    for event in &before_events {
        let stored = store.get_event(&event.id).unwrap().unwrap();
        assert_eq!(stored.checksum, event.checksum);
        assert_eq!(stored.sequence_number, event.sequence_number);
    }
    let after_snapshots = harness.timeline.snapshots().list_snapshots().unwrap();
    assert_eq!(after_snapshots, before_snapshots);
    assert_eq!(harness.timeline.blobs().stats().unwrap(), before_blobs);
    assert!(harness.timeline.logger().verify_all().unwrap().is_clean());

    // The only growth is the rewind's own audit trail
    let appended = store.events_after(before_events.len() as u64, i64::MAX).unwrap();
    assert!(appended.iter().all(|e| e.category() == Some(EventCategory::Rewind)));
}

#[test]
fn test_rewind_audit_trail() {
    let harness = TimelineTestHarness::new();
    harness.file_event(100, EventType::FileCreated, "x.txt", Some(b"x"));
    let (report, _) = harness.rewind_to(150, "audit");

    let filter = QueryFilter {
        categories: vec![EventCategory::Rewind],
        ..Default::default()
    };
    let events = harness.timeline.query().query(&filter).unwrap().events;
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "REWIND_STARTED",
            "REWIND_SNAPSHOT_LOADED",
            "REWIND_EVENTS_REPLAYED",
            "REWIND_STATE_MATERIALIZED",
            "REWIND_COMPLETED"
        ]
    );

    let correlation = events[0].correlation_id.clone().unwrap();
    let chain = harness.timeline.query().get_correlation_chain(&correlation).unwrap();
    assert_eq!(chain.len(), 5);

    let tree = harness.timeline.query().get_causation_chain(&events[0].id).unwrap().unwrap();
    assert_eq!(tree.descendant_count(), 4);
    info!("Rewind took {}ms", report.duration_ms);
}

#[test]
fn test_hooks_feed_rewind_and_comparison() {
    let harness = TimelineTestHarness::new();
    let work = harness.output("work");
    fs::create_dir_all(work.join("src")).unwrap();
    let files = harness.timeline.file_hook(&work).with_session("s-1");

    fs::write(work.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(work.join("README.md"), "# demo").unwrap();
    harness.clock.set(100);
    assert!(files.record_created(work.join("src/main.rs")).is_some());
    assert!(files.record_created("README.md").is_some());

    fs::write(work.join("src/main.rs"), "fn main() { println!(\"hi\"); }").unwrap();
    harness.clock.set(200);
    assert!(files.record_modified("src/main.rs").is_some());

    fs::write(work.join("NOTES.md"), "later").unwrap();
    harness.clock.set(300);
    files.record_created("NOTES.md");

    harness.clock.set(1_000);
    let output = harness.output("compare");
    let report = harness
        .timeline
        .rewind(&RewindOptions::new(150).output_dir(&output).compare_with(&work));
    assert!(report.success, "{:?}", report.error);
    assert_eq!(fs::read_to_string(output.join("files/src/main.rs")).unwrap(), "fn main() {}");

    let comparison = report.comparison.unwrap();
    assert_eq!(comparison.modified, 1);
    assert_eq!(comparison.added, 1);
    assert_eq!(comparison.unchanged, 1);
    assert_eq!(comparison.deleted, 0);
    let added: Vec<&str> = comparison
        .files
        .iter()
        .filter(|f| f.status == ComparisonStatus::Added)
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(added, vec!["NOTES.md"]);

    let history = harness.timeline.query().get_file_events("src/main.rs", Some(10)).unwrap();
    assert_eq!(history.total, 2);
    let session = harness.timeline.query().get_session_events("s-1", None).unwrap();
    assert_eq!(session.total, 4);
}

#[test]
fn test_session_and_git_state_outputs() {
    let harness = TimelineTestHarness::new();
    let sessions = harness.timeline.session_hook();
    let git = harness.timeline.git_hook().with_session("s-9");

    harness.clock.set(100);
    sessions.record_session_created(SessionPayload {
        session_id: Some("s-9".to_string()),
        session_name: Some("refactor".to_string()),
        working_dir: Some("/work".to_string()),
        model: Some("model-a".to_string()),
        ..Default::default()
    });
    harness.clock.set(110);
    sessions.record_message("s-9", Role::User, "rename the module", None);
    harness.clock.set(120);
    sessions.record_message("s-9", Role::Assistant, "done", Some("model-a"));
    harness.clock.set(130);
    git.record_branch_switch("feature", Some("main"));
    harness.clock.set(140);
    git.record_commit(GitCommitPayload {
        hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
        message: "Rename module".to_string(),
        author: "Dev".to_string(),
        ..Default::default()
    });
    harness.clock.set(150);
    sessions.record_model_changed("s-9", Some("model-a"), "model-b");

    harness.clock.set(1_000);
    let full = harness.output("full");
    assert!(harness.timeline.rewind(&RewindOptions::new(145).output_dir(&full)).success);
    let session = json_file(&full.join("session_state.json"));
    assert_eq!(session["session_id"], "s-9");
    assert_eq!(session["model"], "model-a");
    assert_eq!(session["conversation"].as_array().unwrap().len(), 2);
    let git_state = json_file(&full.join("git_state.json"));
    assert_eq!(git_state["branch"], "feature");
    assert_eq!(git_state["last_commit_message"], "Rename module");
    assert_eq!(git_state["is_clean"], true);

    let trimmed = harness.output("trimmed");
    let options = RewindOptions::new(200)
        .output_dir(&trimmed)
        .include_conversations(false)
        .include_files(false)
        .git_mode(GitMode::None);
    assert!(harness.timeline.rewind(&options).success);
    let session = json_file(&trimmed.join("session_state.json"));
    assert_eq!(session["model"], "model-b");
    assert!(session["conversation"].as_array().unwrap().is_empty());
    assert!(!trimmed.join("git_state.json").exists());
    assert!(!trimmed.join("files").exists());
}

#[test]
fn test_automatic_snapshots_bound_replay() {
    let harness = TimelineTestHarness::with_builder(
        TimelineBuilder::new()
            .events_interval(10)
            .time_interval(std::time::Duration::from_secs(3600))
            .max_snapshots(3),
    );
    for i in 0..45 {
        harness.file_event(
            (i + 1) * 1_000,
            EventType::FileModified,
            &format!("f{}.txt", i % 5),
            Some(format!("v{}", i).as_bytes()),
        );
    }

    let snapshots = harness.timeline.snapshots().list_snapshots().unwrap();
    assert!(!snapshots.is_empty());
    assert!(snapshots.len() <= 3);
    assert!(snapshots.iter().all(|s| s.reason == "auto_event"));

    let target = 40_500;
    harness.clock.set(100_000_000);
    let fast = harness.timeline.rewind_engine().reconstruct(target).unwrap();
    let slow = harness.timeline.rewind_engine().reconstruct_from_scratch(target).unwrap();
    assert!(fast.snapshot.is_some());
    assert!(fast.events_replayed < slow.events_replayed);
    assert_eq!(fast.state.files, slow.state.files);
    assert_eq!(fast.state.git, slow.state.git);
}

#[test]
fn test_reopen_preserves_history() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("store");
    let first_id = {
        let timeline = TimelineBuilder::new().max_blob_size(1024).init(&root).unwrap();
        let hash = timeline.store_blob(b"persisted").unwrap().unwrap();
        timeline
            .log(
                EventInput::new(EventType::FileCreated, "user")
                    .aggregate("p.txt", "file")
                    .payload(FileChangePayload::new("p.txt", hash)),
            )
            .event_id
            .unwrap()
    };

    let timeline = Timeline::open(&root).unwrap();
    assert_eq!(timeline.config().max_blob_size, 1024);
    assert!(timeline.logger().verify(&first_id));
    let next = timeline.log(EventInput::new(EventType::CliStarted, "user"));
    assert_eq!(next.sequence_number, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_async_appends() {
    let harness = TimelineTestHarness::new();
    harness.clock.set(500);

    let mut handles = Vec::new();
    for i in 0..32 {
        let timeline = harness.timeline.clone();
        handles.push(tokio::spawn(async move {
            timeline
                .log_async(EventInput::new(EventType::CliCommandExecuted, format!("worker-{}", i)))
                .await
                .unwrap()
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.success, "{:?}", result.error);
        sequences.push(result.sequence_number.unwrap());
    }
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=32).collect::<Vec<u64>>());
}
