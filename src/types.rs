//! Shared configuration and progress types
//!
//! [`TimelineConfig`] is persisted as `config.json` at the store root when a
//! store is initialized, and read back on open. Component-specific result
//! types live next to the component that produces them.

use crate::compression::CompressionStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default maximum size of content stored as a blob (10 MiB)
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 10 * 1024 * 1024;

/// Snapshot policy
///
/// A snapshot is taken when either trigger fires, unless one was taken less
/// than `time_interval_secs` ago by the other trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Take a snapshot after this many events (0 disables the count trigger)
    pub events_interval: u64,
    /// Take a snapshot this often; also the debounce window
    pub time_interval_secs: u64,
    /// Snapshots kept by `cleanup` (0 keeps everything)
    pub max_snapshots: usize,
    /// Whether automatic triggers run at all
    pub auto_enabled: bool,
}

impl SnapshotConfig {
    /// Time trigger as a `Duration`
    pub fn time_interval(&self) -> Duration {
        Duration::from_secs(self.time_interval_secs)
    }

    pub(crate) fn time_interval_micros(&self) -> i64 {
        (self.time_interval_secs as i64).saturating_mul(1_000_000)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            events_interval: 100,
            time_interval_secs: 5 * 60,
            max_snapshots: 50,
            auto_enabled: true,
        }
    }
}

/// Store-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Largest file content stored as a blob; bigger files are tracked by metadata only (0 = unlimited)
    pub max_blob_size: u64,
    /// Compression for blobs and snapshot payloads
    pub compression_strategy: CompressionStrategy,
    /// Snapshot policy
    pub snapshot: SnapshotConfig,
    /// Whether the logger accepts events at startup
    pub logging_enabled: bool,
    /// Worker threads used when restoring files during a rewind
    pub parallel_workers: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            compression_strategy: CompressionStrategy::default(),
            snapshot: SnapshotConfig::default(),
            logging_enabled: true,
            parallel_workers: num_cpus::get(),
        }
    }
}

/// Contents of `config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// On-disk layout version
    pub format_version: u32,
    /// Crate version that created the store
    pub chronolog_version: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Configuration in effect
    pub config: TimelineConfig,
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Human readable step description
    pub message: String,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_defaults() {
        let config = SnapshotConfig::default();
        assert_eq!(config.events_interval, 100);
        assert_eq!(config.time_interval(), Duration::from_secs(300));
        assert_eq!(config.max_snapshots, 50);
        assert!(config.auto_enabled);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = TimelineConfig {
            compression_strategy: CompressionStrategy::Adaptive { min_size: 2048 },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: TimelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_progress_percentage() {
        let info = ProgressInfo {
            operation: "rewind".into(),
            message: "replaying".into(),
            processed: 25,
            total: Some(100),
        };
        assert_eq!(info.percentage(), Some(25.0));
    }
}
