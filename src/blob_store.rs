//! Content-addressable blob store
//!
//! File contents referenced by file-change events live here, keyed by the
//! SHA-256 of the uncompressed bytes:
//!
//! ```text
//! store_root/
//! └── objects/
//!     └── <first 2 hex chars>/
//!         └── <remaining 62 hex chars>   # LZ4-framed content
//! ```
//!
//! Blobs are immutable. Storing content that is already present is a no-op
//! that returns the same key, so identical content is kept once no matter
//! how many events refer to it. Objects are written through a temp file and
//! a rename, so a reader never sees a half-written blob under a valid key.
//!
//! Absence is a normal outcome: [`BlobStore::retrieve`] returns `None` for
//! unknown keys, malformed keys and unreadable objects alike, and rewind
//! counts such files as skipped.

use crate::collections::GxBuildHasher;
use crate::compression::CompressionEngine;
use crate::error::{Result, TimelineError};
use crate::utils::{atomic_write, hash_data, is_valid_hash};
use dashmap::DashMap;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Cached facts about a stored blob
#[derive(Debug, Clone, Copy)]
struct BlobInfo {
    stored_size: u64,
}

/// Aggregate blob store statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BlobStats {
    /// Number of distinct blobs on disk
    pub blob_count: usize,
    /// Bytes used on disk (framed, possibly compressed)
    pub stored_bytes: u64,
}

/// Deduplicating content store
///
/// Cheap to clone; clones share the key cache.
///
/// ```rust,no_run
/// use chronolog::blob_store::BlobStore;
/// use chronolog::compression::CompressionEngine;
///
/// # fn main() -> chronolog::Result<()> {
/// let store = BlobStore::open("./.chronolog", CompressionEngine::default())?;
/// let hash = store.store(b"hello")?;
/// assert_eq!(store.store(b"hello")?, hash);
/// assert_eq!(store.retrieve(&hash).as_deref(), Some(&b"hello"[..]));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    compression: CompressionEngine,
    known: Arc<DashMap<String, BlobInfo, GxBuildHasher>>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("root", &self.root)
            .field("cached", &self.known.len())
            .finish()
    }
}

impl BlobStore {
    /// Open (creating if needed) the blob store under `root`
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Io`] if the objects directory cannot be created
    pub fn open(root: impl Into<PathBuf>, compression: CompressionEngine) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        debug!("Opened blob store at {:?}", root);

        Ok(Self {
            root,
            compression,
            known: Arc::new(DashMap::with_capacity_and_hasher(256, GxBuildHasher::default())),
        })
    }

    /// Store content, returning its key
    ///
    /// Idempotent: identical content always yields the same key and is
    /// written only once.
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Io`] if the object cannot be written
    pub fn store(&self, content: &[u8]) -> Result<String> {
        let hash = hash_data(content);

        if self.contains(&hash) {
            trace!("Blob {} already present", &hash[..8]);
            return Ok(hash);
        }

        let framed = self.compression.compress(content)?;
        let path = self.object_path(&hash);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        atomic_write(&path, &framed)?;

        self.known.insert(
            hash.clone(),
            BlobInfo {
                stored_size: framed.len() as u64,
            },
        );

        trace!("Stored blob {} ({} -> {} bytes)", &hash[..8], content.len(), framed.len());
        Ok(hash)
    }

    /// Store content unless it exceeds `max_size` bytes (0 = unlimited)
    ///
    /// Returns `Ok(None)` for over-limit content; such files are tracked by
    /// metadata only.
    pub fn store_with_limit(&self, content: &[u8], max_size: u64) -> Result<Option<String>> {
        if max_size > 0 && content.len() as u64 > max_size {
            debug!("Content of {} bytes exceeds blob limit {}", content.len(), max_size);
            return Ok(None);
        }
        self.store(content).map(Some)
    }

    /// Fetch content by key
    ///
    /// Returns `None` when the key is malformed, unknown, or the object
    /// cannot be read back.
    pub fn retrieve(&self, hash: &str) -> Option<Vec<u8>> {
        match self.load(hash) {
            Ok(content) => Some(content),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!("Blob {} unreadable: {}", hash, e);
                None
            }
        }
    }

    /// Fetch content by key, reporting why it is unavailable
    ///
    /// # Errors
    ///
    /// - [`TimelineError::BlobNotFound`] for malformed or unknown keys
    /// - [`TimelineError::Decompression`] if the object is not a valid frame
    /// - [`TimelineError::Integrity`] if the content no longer matches its key
    /// - [`TimelineError::Io`] on read failure
    pub fn load(&self, hash: &str) -> Result<Vec<u8>> {
        if !is_valid_hash(hash) {
            return Err(TimelineError::BlobNotFound(hash.to_string()));
        }

        let path = self.object_path(hash);
        let framed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TimelineError::BlobNotFound(hash.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let content = self.compression.decompress(&framed)?;
        if hash_data(&content) != hash {
            return Err(TimelineError::integrity(format!("blob {} content does not match its key", hash)));
        }
        trace!("Loaded blob {} ({} bytes)", &hash[..8], content.len());
        Ok(content)
    }

    /// Whether a blob with this key is present
    pub fn contains(&self, hash: &str) -> bool {
        if !is_valid_hash(hash) {
            return false;
        }
        self.known.contains_key(hash) || self.object_path(hash).is_file()
    }

    /// Re-hash a blob's content and compare with its key
    ///
    /// # Errors
    ///
    /// Propagates [`load`](Self::load) failures other than corruption;
    /// an undecodable or altered object verifies as `false`.
    pub fn verify_blob(&self, hash: &str) -> Result<bool> {
        match self.load(hash) {
            Ok(_) => Ok(true),
            Err(TimelineError::Decompression(_) | TimelineError::Integrity(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Keys of every blob on disk
    pub fn list_blobs(&self) -> Result<Vec<String>> {
        let objects = self.root.join("objects");
        let mut hashes = Vec::new();

        for entry in WalkDir::new(&objects).min_depth(2).max_depth(2) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let shard = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let hash = format!("{}{}", shard, entry.file_name().to_string_lossy());
            if is_valid_hash(&hash) {
                hashes.push(hash);
            }
        }

        hashes.sort();
        Ok(hashes)
    }

    /// Count and size of stored blobs
    pub fn stats(&self) -> Result<BlobStats> {
        let mut stats = BlobStats::default();
        for hash in self.list_blobs()? {
            stats.blob_count += 1;
            stats.stored_bytes += match self.known.get(&hash) {
                Some(info) => info.stored_size,
                None => fs::metadata(self.object_path(&hash))?.len(),
            };
        }
        Ok(stats)
    }

    /// Store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location for a key; callers must validate the key first
    pub(crate) fn object_path(&self, hash: &str) -> PathBuf {
        let (prefix, suffix) = hash.split_at(2);
        self.root.join("objects").join(prefix).join(suffix)
    }
}
