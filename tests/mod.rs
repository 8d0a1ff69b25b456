//! Main test module for Chronolog
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end timeline scenarios
//! - Chaos tests for tampering and damaged storage
//! - Property-based tests for sequencing and replay laws

pub mod chaos;
pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::chronolog::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn manual_timeline(temp_dir: &TempDir, start: i64) -> (Timeline, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let timeline = TimelineBuilder::new()
            .clock(clock.clone())
            .auto_snapshots(false)
            .init(temp_dir.path().join("store"))
            .unwrap();
        (timeline, clock)
    }

    #[test]
    fn test_rewind_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, _clock) = manual_timeline(&temp_dir, 1_000);
        let output = temp_dir.path().join("out");

        let report = timeline.rewind(&RewindOptions::new(500).output_dir(&output));

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.events_replayed, 0);
        assert_eq!(report.files_restored, 0);
        assert!(report.snapshot_used.is_none());
        assert!(output.join("session_state.json").exists());
        assert!(output.join("file_manifest.json").exists());
        assert!(output.join("files").is_dir());
    }

    #[test]
    fn test_rewind_before_first_event() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, clock) = manual_timeline(&temp_dir, 100);
        let hash = timeline.store_blob(b"late").unwrap().unwrap();
        timeline.log(
            EventInput::new(EventType::FileCreated, "user")
                .aggregate("late.txt", "file")
                .payload(FileChangePayload::new("late.txt", hash)),
        );
        clock.set(1_000);

        let output = temp_dir.path().join("out");
        let report = timeline.rewind(&RewindOptions::new(50).output_dir(&output));
        assert!(report.success);
        assert_eq!(report.events_replayed, 0);
        assert!(!output.join("files/late.txt").exists());
    }

    #[test]
    fn test_rewind_exactly_at_event_timestamp_includes_it() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, clock) = manual_timeline(&temp_dir, 100);
        let hash = timeline.store_blob(b"edge").unwrap().unwrap();
        timeline.log(
            EventInput::new(EventType::FileCreated, "user")
                .aggregate("edge.txt", "file")
                .payload(FileChangePayload::new("edge.txt", hash)),
        );
        clock.set(1_000);

        let output = temp_dir.path().join("out");
        let report = timeline.rewind(&RewindOptions::new(100).output_dir(&output));
        assert!(report.success);
        assert_eq!(report.events_replayed, 1);
        assert_eq!(fs::read(output.join("files/edge.txt")).unwrap(), b"edge");
    }

    #[test]
    fn test_unknown_event_type_is_stored_and_ignored_by_replay() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, clock) = manual_timeline(&temp_dir, 100);

        let result = timeline.log(
            EventInput::new(EventType::from_name("PLUGIN_LOADED"), "plugin")
                .payload_json(serde_json::json!({ "name": "spellcheck" })),
        );
        assert!(result.success);

        let event = timeline
            .query()
            .get_event_by_id(result.event_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type.as_str(), "PLUGIN_LOADED");
        assert!(!event.event_type.is_known());

        clock.set(1_000);
        let reconstruction = timeline.rewind_engine().reconstruct(500).unwrap();
        assert_eq!(reconstruction.events_replayed, 1);
        assert_eq!(reconstruction.state, DerivedState::default());
    }

    #[test]
    fn test_empty_payload_and_unicode_actor() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, _clock) = manual_timeline(&temp_dir, 100);

        let result = timeline.log(EventInput::new(EventType::CliStarted, "開発者"));
        assert!(result.success);
        assert!(timeline.logger().verify(result.event_id.as_deref().unwrap()));

        let filter = QueryFilter {
            actor: Some("開発者".to_string()),
            ..Default::default()
        };
        assert_eq!(timeline.query().query(&filter).unwrap().total, 1);
    }

    #[test]
    fn test_query_offset_past_end() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, _clock) = manual_timeline(&temp_dir, 100);
        for _ in 0..3 {
            timeline.log(EventInput::new(EventType::CliCommandExecuted, "user"));
        }

        let filter = QueryFilter {
            offset: 10,
            ..Default::default()
        };
        let result = timeline.query().query(&filter).unwrap();
        assert!(result.events.is_empty());
        assert_eq!(result.total, 3);
        assert!(!result.has_more);
    }

    #[test]
    fn test_zero_byte_file_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, clock) = manual_timeline(&temp_dir, 100);
        let work = temp_dir.path().join("work");
        fs::create_dir(&work).unwrap();
        fs::write(work.join("empty.txt"), b"").unwrap();

        let hook = timeline.file_hook(&work);
        assert!(hook.record_created("empty.txt").is_some());
        clock.set(1_000);

        let output = temp_dir.path().join("out");
        let report = timeline.rewind(&RewindOptions::new(500).output_dir(&output));
        assert!(report.success);
        assert_eq!(report.files_restored, 1);
        assert_eq!(fs::read(output.join("files/empty.txt")).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_nested_paths_restore_into_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let (timeline, clock) = manual_timeline(&temp_dir, 100);
        let hash = timeline.store_blob(b"deep").unwrap().unwrap();
        timeline.log(
            EventInput::new(EventType::FileCreated, "user")
                .aggregate("a/b/c/deep.txt", "file")
                .payload(FileChangePayload::new("a/b/c/deep.txt", hash)),
        );
        clock.set(1_000);

        let output = temp_dir.path().join("out");
        let report = timeline.rewind(&RewindOptions::new(500).output_dir(&output));
        assert!(report.success);
        assert_eq!(fs::read(output.join("files/a/b/c/deep.txt")).unwrap(), b"deep");
    }
}
