//! Property-based tests for the timeline's core laws
//!
//! Random histories of file, conversation and git activity are appended
//! through the facade, with snapshots sprinkled in, and the laws that make
//! rewinds trustworthy are checked against them.

use ::chronolog::*;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const PATHS: [&str; 5] = ["a.txt", "b.txt", "dir/c.txt", "dir/d.txt", "notes/e.md"];

#[derive(Debug, Clone)]
enum Operation {
    Write { path: usize, content: Vec<u8>, created: bool },
    Delete { path: usize },
    Rename { from: usize, to: usize },
    MoveDirectory,
    Message { user: bool, text: String },
    Commit { n: u8 },
    Snapshot,
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        5 => (0..PATHS.len(), prop::collection::vec(any::<u8>(), 0..64), any::<bool>())
            .prop_map(|(path, content, created)| Operation::Write { path, content, created }),
        1 => (0..PATHS.len()).prop_map(|path| Operation::Delete { path }),
        1 => (0..PATHS.len(), 0..PATHS.len()).prop_map(|(from, to)| Operation::Rename { from, to }),
        1 => Just(Operation::MoveDirectory),
        2 => (any::<bool>(), "[a-z ]{0,24}").prop_map(|(user, text)| Operation::Message { user, text }),
        1 => any::<u8>().prop_map(|n| Operation::Commit { n }),
        1 => Just(Operation::Snapshot),
    ]
}

struct History {
    temp_dir: TempDir,
    clock: Arc<ManualClock>,
    timeline: Timeline,
    /// Timestamp of the last appended operation
    end: i64,
}

fn new_timeline() -> (TempDir, Arc<ManualClock>, Timeline) {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let timeline = TimelineBuilder::new()
        .clock(clock.clone())
        .auto_snapshots(false)
        .init(temp_dir.path().join("store"))
        .unwrap();
    (temp_dir, clock, timeline)
}

fn apply_operation(timeline: &Timeline, op: &Operation) {
    let input = match op {
        Operation::Write { path, content, created } => {
            let hash = timeline.store_blob(content).unwrap().unwrap();
            let event_type = if *created { EventType::FileCreated } else { EventType::FileModified };
            EventInput::new(event_type, "user")
                .aggregate(PATHS[*path], "file")
                .payload(FileChangePayload::new(PATHS[*path], hash))
        }
        Operation::Delete { path } => EventInput::new(EventType::FileDeleted, "user")
            .aggregate(PATHS[*path], "file")
            .payload(FileChangePayload::path_only(PATHS[*path])),
        Operation::Rename { from, to } => EventInput::new(EventType::FileRenamed, "user")
            .aggregate(PATHS[*to], "file")
            .payload(FileMovePayload {
                old_path: PATHS[*from].to_string(),
                new_path: PATHS[*to].to_string(),
                ..Default::default()
            }),
        Operation::MoveDirectory => EventInput::new(EventType::DirectoryRenamed, "user")
            .aggregate("dir", "file")
            .payload(FileMovePayload {
                old_path: "dir".to_string(),
                new_path: "notes".to_string(),
                ..Default::default()
            }),
        Operation::Message { user, text } => {
            let event_type = if *user { EventType::LlmMessageUser } else { EventType::LlmMessageAssistant };
            EventInput::new(event_type, if *user { "user" } else { "assistant" }).payload(MessagePayload {
                content: text.clone(),
                session_id: Some("s".to_string()),
                ..Default::default()
            })
        }
        Operation::Commit { n } => EventInput::new(EventType::GitCommit, "user").payload(GitCommitPayload {
            hash: format!("{:040x}", n),
            message: format!("commit {}", n),
            author: "dev".to_string(),
            ..Default::default()
        }),
        Operation::Snapshot => {
            timeline.create_snapshot("manual").unwrap();
            return;
        }
    };
    let result = timeline.log(input);
    assert!(result.success, "{:?}", result.error);
}

/// Append `ops` ten microseconds apart, starting at 10
fn build_history(ops: &[Operation]) -> History {
    let (temp_dir, clock, timeline) = new_timeline();
    let mut now = 0;
    for op in ops {
        now += 10;
        clock.set(now);
        apply_operation(&timeline, op);
    }
    clock.set(now + 1_000_000);
    History {
        temp_dir,
        clock,
        timeline,
        end: now,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn snapshot_plus_replay_matches_full_replay(
        ops in prop::collection::vec(operation_strategy(), 1..60),
        target_fraction in 0.0f64..1.2,
    ) {
        let history = build_history(&ops);
        let target = (history.end as f64 * target_fraction) as i64;

        let engine = history.timeline.rewind_engine();
        let fast = engine.reconstruct(target).unwrap();
        let slow = engine.reconstruct_from_scratch(target).unwrap();

        prop_assert_eq!(&fast.state, &slow.state);
        if let Some(snapshot) = &fast.snapshot {
            prop_assert!(snapshot.timestamp <= target);
            prop_assert!(fast.events_replayed <= slow.events_replayed);
        }
    }

    #[test]
    fn replay_is_deterministic(ops in prop::collection::vec(operation_strategy(), 0..50)) {
        let history = build_history(&ops);
        let events = history.timeline.store().events_after(0, i64::MAX).unwrap();

        let first = DerivedState::replay(DerivedState::default(), &events);
        let second = DerivedState::replay(DerivedState::default(), &events);
        prop_assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );

        // Events come back from storage exactly as they replay from memory
        let reloaded = history.timeline.store().events_after(0, i64::MAX).unwrap();
        prop_assert_eq!(DerivedState::replay(DerivedState::default(), &reloaded), first);
    }

    #[test]
    fn sequences_are_gapless_under_concurrency(
        per_thread in prop::collection::vec(1usize..12, 1..5),
        batch_size in 1usize..6,
    ) {
        let (_temp_dir, clock, timeline) = new_timeline();
        clock.set(42);

        let sequences: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = per_thread
                .iter()
                .enumerate()
                .map(|(worker, &count)| {
                    let timeline = timeline.clone();
                    scope.spawn(move || {
                        let mut seen = Vec::new();
                        let mut remaining = count;
                        while remaining > 0 {
                            let take = remaining.min(batch_size);
                            let inputs = (0..take)
                                .map(|_| EventInput::new(EventType::CliCommandExecuted, format!("worker-{}", worker)))
                                .collect();
                            for result in timeline.log_batch(inputs) {
                                assert!(result.success, "{:?}", result.error);
                                seen.push(result.sequence_number.unwrap());
                            }
                            remaining -= take;
                        }
                        seen
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let total: usize = per_thread.iter().sum();
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (1..=total as u64).collect::<Vec<_>>());
        prop_assert!(timeline.store().sequence_gaps().unwrap().is_empty());

        let summary = timeline.logger().verify_all().unwrap();
        prop_assert_eq!(summary.total, total);
        prop_assert!(summary.is_clean());
    }

    #[test]
    fn blob_store_is_idempotent(content in prop::collection::vec(any::<u8>(), 0..4096)) {
        let (_temp_dir, _clock, timeline) = new_timeline();
        let first = timeline.store_blob(&content).unwrap().unwrap();
        let count = timeline.blobs().stats().unwrap().blob_count;

        let second = timeline.store_blob(&content).unwrap().unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(timeline.blobs().stats().unwrap().blob_count, count);
        prop_assert_eq!(timeline.retrieve_blob(&first), Some(content));
    }

    #[test]
    fn rewind_output_matches_reconstruction(ops in prop::collection::vec(operation_strategy(), 1..30)) {
        let history = build_history(&ops);
        let target = history.end;
        let output = history.temp_dir.path().join("rewound");

        let report = history.timeline.rewind(&RewindOptions::new(target).output_dir(&output));
        prop_assert!(report.success, "{:?}", report.error);

        let expected = history.timeline.rewind_engine().reconstruct_from_scratch(target).unwrap().state;
        let restorable = expected.files.checksums();
        prop_assert_eq!(report.files_restored, restorable.len());
        for (path, hash) in restorable {
            let bytes = std::fs::read(output.join("files").join(&path)).unwrap();
            prop_assert_eq!(chronolog::utils::hash_data(&bytes), hash);
        }
        prop_assert!(history.clock.now_micros() > target);
    }
}
