//! Whole-store integrity checking
//!
//! Verification looks at every layer of a timeline store:
//!
//! 1. **Events**: each payload re-hashed against its stored checksum
//! 2. **Sequences**: holes in the `1..=max` sequence range
//! 3. **Blobs**: every blob referenced by a file event exists and re-hashes
//!    to its key
//! 4. **Snapshots**: every payload still decodes
//!
//! Problems are collected into an [`IntegrityReport`]; an error is only
//! returned when the store cannot be read at all.
//!
//! ```rust,no_run
//! # fn example(timeline: &chronolog::Timeline) -> chronolog::Result<()> {
//! let report = timeline.verify()?;
//! if !report.is_valid() {
//!     eprintln!("{}", report.summary());
//! }
//! # Ok(())
//! # }
//! ```

use crate::blob_store::BlobStore;
use crate::error::Result;
use crate::event::{EventCategory, EventPayload};
use crate::log_store::LogStore;
use crate::logger::{ChecksumSummary, EventLogger};
use crate::snapshot::SnapshotManager;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A blob referenced by file events that cannot be trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobIssue {
    pub hash: String,
    /// Paths whose events reference the blob
    pub paths: Vec<String>,
    pub error: String,
}

/// A snapshot whose payload no longer decodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotIssue {
    pub snapshot_id: String,
    pub error: String,
}

/// Result of [`IntegrityVerifier::verify_store`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub checksums: ChecksumSummary,
    /// `(first_missing, last_missing)` ranges
    pub sequence_gaps: Vec<(u64, u64)>,
    pub blobs_checked: usize,
    pub missing_blobs: Vec<BlobIssue>,
    pub corrupt_blobs: Vec<BlobIssue>,
    pub snapshots_checked: usize,
    pub corrupt_snapshots: Vec<SnapshotIssue>,
    pub verification_time_ms: u64,
}

impl IntegrityReport {
    /// True when no problem of any kind was found
    pub fn is_valid(&self) -> bool {
        self.checksums.is_clean()
            && self.sequence_gaps.is_empty()
            && self.missing_blobs.is_empty()
            && self.corrupt_blobs.is_empty()
            && self.corrupt_snapshots.is_empty()
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Events: {} / {} checksums valid",
            self.checksums.valid, self.checksums.total
        )];
        for id in &self.checksums.invalid_ids {
            lines.push(format!("  tampered event {}", id));
        }

        if self.sequence_gaps.is_empty() {
            lines.push("Sequences: contiguous".to_string());
        } else {
            let gaps: Vec<String> = self
                .sequence_gaps
                .iter()
                .map(|(from, to)| if from == to { from.to_string() } else { format!("{}-{}", from, to) })
                .collect();
            lines.push(format!("Sequences: missing {}", gaps.join(", ")));
        }

        lines.push(format!(
            "Blobs: {} checked, {} missing, {} corrupt",
            self.blobs_checked,
            self.missing_blobs.len(),
            self.corrupt_blobs.len()
        ));
        for issue in self.missing_blobs.iter().chain(&self.corrupt_blobs) {
            lines.push(format!("  {} ({}): {}", &issue.hash[..issue.hash.len().min(12)], issue.paths.join(", "), issue.error));
        }

        lines.push(format!(
            "Snapshots: {} checked, {} corrupt",
            self.snapshots_checked,
            self.corrupt_snapshots.len()
        ));
        for issue in &self.corrupt_snapshots {
            lines.push(format!("  {}: {}", issue.snapshot_id, issue.error));
        }

        lines.push(format!(
            "Status: {} ({}ms)",
            if self.is_valid() { "OK" } else { "PROBLEMS FOUND" },
            self.verification_time_ms
        ));
        lines.join("\n")
    }
}

/// Verifier over one store's log, blobs and snapshots
#[derive(Debug)]
pub struct IntegrityVerifier<'a> {
    store: &'a LogStore,
    logger: &'a EventLogger,
    blobs: &'a BlobStore,
    snapshots: &'a SnapshotManager,
}

impl<'a> IntegrityVerifier<'a> {
    pub fn new(
        store: &'a LogStore,
        logger: &'a EventLogger,
        blobs: &'a BlobStore,
        snapshots: &'a SnapshotManager,
    ) -> Self {
        Self {
            store,
            logger,
            blobs,
            snapshots,
        }
    }

    /// Check events, sequences, referenced blobs and snapshots
    ///
    /// # Errors
    ///
    /// Only when the store itself cannot be read; integrity problems are
    /// reported in the returned [`IntegrityReport`].
    pub fn verify_store(&self) -> Result<IntegrityReport> {
        let start = Instant::now();
        let mut report = IntegrityReport {
            checksums: self.logger.verify_all()?,
            sequence_gaps: self.store.sequence_gaps()?,
            ..Default::default()
        };

        let referenced = self.referenced_blobs()?;
        report.blobs_checked = referenced.len();
        debug!("Verifying {} referenced blobs", referenced.len());
        for (hash, paths) in referenced {
            match self.blobs.verify_blob(&hash) {
                Ok(true) => {}
                Ok(false) => report.corrupt_blobs.push(BlobIssue {
                    hash,
                    paths,
                    error: "content does not match its hash".to_string(),
                }),
                Err(e) if e.is_not_found() => report.missing_blobs.push(BlobIssue {
                    hash,
                    paths,
                    error: e.to_string(),
                }),
                Err(e) => report.corrupt_blobs.push(BlobIssue {
                    hash,
                    paths,
                    error: e.to_string(),
                }),
            }
        }

        let snapshots = self.snapshots.list_snapshots()?;
        report.snapshots_checked = snapshots.len();
        for snapshot in snapshots {
            if let Err(e) = self.snapshots.read_data(&snapshot.snapshot_id) {
                report.corrupt_snapshots.push(SnapshotIssue {
                    snapshot_id: snapshot.snapshot_id,
                    error: e.to_string(),
                });
            }
        }

        report.verification_time_ms = start.elapsed().as_millis() as u64;
        if report.is_valid() {
            info!(
                "Store verified in {}ms: {} events, {} blobs, {} snapshots",
                report.verification_time_ms, report.checksums.total, report.blobs_checked, report.snapshots_checked
            );
        } else {
            warn!(
                "Store verification found problems: {} tampered events, {} gaps, {} bad blobs, {} bad snapshots",
                report.checksums.invalid,
                report.sequence_gaps.len(),
                report.missing_blobs.len() + report.corrupt_blobs.len(),
                report.corrupt_snapshots.len()
            );
        }
        Ok(report)
    }

    /// Blob key to the paths whose file events reference it
    fn referenced_blobs(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut referenced: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for event in self.store.events_after(0, i64::MAX)? {
            if event.category() != Some(EventCategory::File) {
                continue;
            }
            let EventPayload::FileChange(payload) = &event.payload else {
                continue;
            };
            if let Some(hash) = payload.effective_hash() {
                let paths = referenced.entry(hash.to_string()).or_default();
                if !paths.contains(&payload.path) {
                    paths.push(payload.path.clone());
                }
            }
        }
        Ok(referenced)
    }
}
