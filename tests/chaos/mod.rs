//! Chaos tests: damaged storage and tampered history
//!
//! Rows are rewritten and deleted behind the store's back, blob objects are
//! bit-flipped or removed, counters are truncated and snapshot payloads are
//! garbled. Every case checks that the damage is reported rather than
//! silently trusted, and that rewinds degrade instead of failing.

use ::chronolog::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct ChaosStore {
    temp_dir: TempDir,
    clock: Arc<ManualClock>,
    timeline: Timeline,
    hashes: Vec<(String, String)>,
}

impl ChaosStore {
    /// A store with `files` tracked files, each created once
    fn with_files(files: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let timeline = TimelineBuilder::new()
            .clock(clock.clone())
            .auto_snapshots(false)
            .init(temp_dir.path().join("store"))
            .unwrap();

        let mut hashes = Vec::new();
        for i in 0..files {
            clock.set((i as i64 + 1) * 100);
            let path = format!("src/file_{:02}.rs", i);
            let content = format!("// file {}\nfn f{}() {{}}\n", i, i);
            let hash = timeline.store_blob(content.as_bytes()).unwrap().unwrap();
            let result = timeline.log(
                EventInput::new(EventType::FileCreated, "user")
                    .aggregate(&path, "file")
                    .payload(FileChangePayload::new(&path, &hash)),
            );
            assert!(result.success);
            hashes.push((path, hash));
        }
        clock.set(1_000_000);

        Self {
            temp_dir,
            clock,
            timeline,
            hashes,
        }
    }

    fn object_path(&self, hash: &str) -> PathBuf {
        self.timeline.root().join("objects").join(&hash[..2]).join(&hash[2..])
    }

    fn rewind(&self, name: &str) -> RewindReport {
        self.clock.advance(1_000);
        let output = self.temp_dir.path().join(name);
        self.timeline
            .rewind(&RewindOptions::new(self.clock.now_micros() - 500).output_dir(output))
    }

    fn exec(&self, sql: &str) {
        self.timeline
            .store()
            .with_conn(|conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .unwrap();
    }
}

fn flip_random_bytes(path: &Path, rng: &mut StdRng, flips: usize) {
    let mut bytes = fs::read(path).unwrap();
    for _ in 0..flips {
        let index = rng.random_range(0..bytes.len());
        bytes[index] ^= rng.random_range(1..=255u8);
    }
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_random_payload_tampering_is_pinpointed() {
    let store = ChaosStore::with_files(20);
    let mut rng = StdRng::seed_from_u64(7);

    let mut tampered = BTreeSet::new();
    while tampered.len() < 5 {
        tampered.insert(rng.random_range(1..=20u64));
    }
    for sequence in &tampered {
        store.exec(&format!(
            "UPDATE events SET payload = '{{\"path\":\"evil_{0}.rs\"}}' WHERE sequence_number = {0}",
            sequence
        ));
    }

    let events = store.timeline.store().events_after(0, i64::MAX).unwrap();
    let expected: BTreeSet<String> = events
        .iter()
        .filter(|e| tampered.contains(&e.sequence_number))
        .map(|e| e.id.clone())
        .collect();

    let summary = store.timeline.logger().verify_all().unwrap();
    assert_eq!(summary.total, 20);
    assert_eq!(summary.invalid, 5);
    assert_eq!(summary.invalid_ids.into_iter().collect::<BTreeSet<_>>(), expected);

    for event in &events {
        assert_eq!(
            store.timeline.logger().verify(&event.id),
            !tampered.contains(&event.sequence_number)
        );
    }

    let report = store.timeline.verify().unwrap();
    assert!(!report.is_valid());
    assert!(report.summary().contains("PROBLEMS FOUND"));
}

#[test]
fn test_bit_flipped_blobs_are_skipped_and_reported() {
    let store = ChaosStore::with_files(12);
    let mut rng = StdRng::seed_from_u64(1234);

    let victims: BTreeSet<usize> = (0..3).map(|_| rng.random_range(0..12)).collect();
    for &i in &victims {
        flip_random_bytes(&store.object_path(&store.hashes[i].1), &mut rng, 4);
    }

    for (i, (_, hash)) in store.hashes.iter().enumerate() {
        let readable = store.timeline.retrieve_blob(hash).is_some();
        assert_eq!(readable, !victims.contains(&i), "blob {} readability", i);
    }

    let report = store.rewind("flipped");
    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.files_skipped, victims.len());
    assert_eq!(report.files_restored, 12 - victims.len());
    for &i in &victims {
        let path = &store.hashes[i].0;
        assert!(!report.output_directory.join("files").join(path).exists());
    }

    let integrity = store.timeline.verify().unwrap();
    assert_eq!(integrity.blobs_checked, 12);
    assert_eq!(integrity.corrupt_blobs.len(), victims.len());
    assert!(integrity.missing_blobs.is_empty());
}

#[test]
fn test_deleted_blobs_degrade_rewind() {
    let store = ChaosStore::with_files(6);
    fs::remove_file(store.object_path(&store.hashes[2].1)).unwrap();

    let report = store.rewind("missing_blob");
    assert!(report.success);
    assert_eq!(report.files_restored, 5);
    assert_eq!(report.files_skipped, 1);

    let integrity = store.timeline.verify().unwrap();
    assert_eq!(integrity.missing_blobs.len(), 1);
    assert_eq!(integrity.missing_blobs[0].paths, vec![store.hashes[2].0.clone()]);
}

#[test]
fn test_truncated_counter_is_repaired() {
    let store = ChaosStore::with_files(5);
    store.timeline.store().set_meta("last_sequence", "0").unwrap();

    let result = store.timeline.log(EventInput::new(EventType::CliStarted, "user"));
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.sequence_number, Some(6));
    assert_eq!(
        store.timeline.store().get_meta("last_sequence").unwrap().as_deref(),
        Some("6")
    );
    assert!(store.timeline.store().sequence_gaps().unwrap().is_empty());
}

#[test]
fn test_competing_handles_keep_sequences_unique() {
    let store = ChaosStore::with_files(1);
    let other = Timeline::open(store.timeline.root()).unwrap();

    let sequences: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = [store.timeline.clone(), other]
            .into_iter()
            .enumerate()
            .map(|(worker, timeline)| {
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(worker as u64);
                    let mut seen = Vec::new();
                    for _ in 0..25 {
                        if rng.random_bool(0.3) {
                            std::thread::yield_now();
                        }
                        let result = timeline.log(EventInput::new(EventType::CliCommandExecuted, format!("handle-{}", worker)));
                        assert!(result.success, "{:?}", result.error);
                        seen.push(result.sequence_number.unwrap());
                    }
                    seen
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    let unique: BTreeSet<u64> = sequences.iter().copied().collect();
    assert_eq!(unique.len(), 50);
    assert_eq!(unique.iter().copied().min(), Some(2));
    assert_eq!(unique.iter().copied().max(), Some(51));
    assert!(store.timeline.store().sequence_gaps().unwrap().is_empty());
}

#[test]
fn test_garbled_snapshot_falls_back_to_full_replay() {
    let store = ChaosStore::with_files(8);
    let snapshot = store.timeline.create_snapshot("manual").unwrap();
    store.exec(&format!(
        "UPDATE snapshots SET snapshot_data = x'deadbeef00112233' WHERE snapshot_id = '{}'",
        snapshot.snapshot_id
    ));

    let report = store.rewind("garbled_snapshot");
    assert!(report.success, "{:?}", report.error);
    assert!(report.snapshot_used.is_none());
    assert_eq!(report.files_restored, 8);

    let integrity = store.timeline.verify().unwrap();
    assert_eq!(integrity.corrupt_snapshots.len(), 1);
}

#[test]
fn test_deleted_rows_show_as_gaps() {
    let store = ChaosStore::with_files(10);
    store.exec("DELETE FROM events WHERE sequence_number IN (3, 4, 8)");

    let report = store.timeline.verify().unwrap();
    assert_eq!(report.sequence_gaps, vec![(3, 4), (8, 8)]);
    assert!(report.summary().contains("missing 3-4, 8"));

    // Replay still works on what is left
    let rewind = store.rewind("gappy");
    assert!(rewind.success);
    assert_eq!(rewind.files_restored, 7);
}

#[test]
fn test_unsafe_paths_in_history_never_escape_output() {
    let store = ChaosStore::with_files(2);
    let hash = store.timeline.store_blob(b"escape").unwrap().unwrap();
    for path in ["../outside.txt", "/etc/passwd-copy", "ok/../../up.txt"] {
        store.timeline.log(
            EventInput::new(EventType::FileCreated, "intruder")
                .aggregate(path, "file")
                .payload(FileChangePayload::new(path, &hash)),
        );
    }

    let report = store.rewind("contained");
    assert!(report.success);
    assert_eq!(report.files_restored, 2);
    assert_eq!(report.files_skipped, 3);
    assert!(!store.temp_dir.path().join("outside.txt").exists());
    assert!(!store.temp_dir.path().join("up.txt").exists());
}
