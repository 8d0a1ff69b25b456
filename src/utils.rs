//! Utility functions shared across the timeline
//!
//! ## Categories
//!
//! - **Hashing**: SHA-256 hex digests for payload checksums and blob keys
//! - **Files**: atomic writes, safe joins for materialized paths
//! - **Time**: parsing caller-supplied timestamps (ISO-8601 or epoch
//!   milliseconds) into the microsecond epoch used internally, and back
//! - **Display**: human-readable byte sizes
//!
//! All functions are thread-safe and free of shared state.

use crate::error::{Result, TimelineError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Length of a SHA-256 digest in hex
pub const HASH_HEX_LEN: usize = 64;

/// Hash arbitrary data with SHA-256
///
/// Returns the digest as 64 lowercase hex characters.
///
/// # Example
///
/// ```rust
/// use chronolog::utils::hash_data;
///
/// let hash = hash_data(b"hello");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_data(b"hello"));
/// ```
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash a file's content using buffered reads
///
/// # Errors
///
/// - [`TimelineError::Io`] if the file cannot be opened or read
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    trace!("Hashed file {:?}", path);
    Ok(hex::encode(hasher.finalize()))
}

/// Check that a string is a well-formed SHA-256 hex key
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Format bytes as human-readable string
///
/// ```rust
/// use chronolog::utils::format_bytes;
///
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// Write a file so that readers never observe a partial write
///
/// Content goes to a temporary file in the destination directory, is
/// flushed to disk, then renamed over `path`.
///
/// # Errors
///
/// - [`TimelineError::Io`] if the temp file cannot be created, written or persisted
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| TimelineError::Io(e.error))?;
    Ok(())
}

/// Validate a recorded path for materialization under an output root
///
/// Only plain relative paths are accepted: no root, drive prefix or `..`
/// component. Returns the normalized relative path, or `None` if the path
/// would escape the output directory.
///
/// ```rust
/// use chronolog::utils::safe_relative_path;
///
/// assert!(safe_relative_path("src/main.rs").is_some());
/// assert!(safe_relative_path("../etc/passwd").is_none());
/// assert!(safe_relative_path("/etc/passwd").is_none());
/// ```
pub fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Parse a caller-supplied timestamp into microseconds since the epoch
///
/// Accepted forms:
/// - epoch milliseconds (`1700000000000`)
/// - RFC 3339 / ISO-8601 with offset (`2024-01-02T03:04:05Z`, `...+02:00`)
/// - naive ISO-8601 date-time, read as UTC (`2024-01-02T03:04:05`, `2024-01-02 03:04:05`)
/// - bare date, read as UTC midnight (`2024-01-02`)
///
/// # Errors
///
/// - [`TimelineError::Validation`] if none of the forms match
///
/// ```rust
/// use chronolog::utils::parse_timestamp;
///
/// assert_eq!(parse_timestamp("1000").unwrap(), 1_000_000);
/// assert_eq!(parse_timestamp("1970-01-01T00:00:01Z").unwrap(), 1_000_000);
/// ```
pub fn parse_timestamp(input: &str) -> Result<i64> {
    let input = input.trim();

    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = input
            .parse()
            .map_err(|_| TimelineError::validation(format!("timestamp out of range: {}", input)))?;
        return millis
            .checked_mul(1000)
            .ok_or_else(|| TimelineError::validation(format!("timestamp out of range: {}", input)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc).timestamp_micros());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_micros());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_micros());
        }
    }

    Err(TimelineError::validation(format!(
        "unrecognized timestamp '{}': expected ISO-8601 or epoch milliseconds",
        input
    )))
}

/// Render a microsecond timestamp as RFC 3339 (millisecond precision)
pub fn format_timestamp(micros: i64) -> String {
    match DateTime::<Utc>::from_timestamp_micros(micros) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => micros.to_string(),
    }
}
