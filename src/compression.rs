//! LZ4 framing for blobs and snapshot payloads
//!
//! Every stored byte sequence carries a 4-byte header:
//! - `LZ4T`: LZ4 block (size-prepended) follows
//! - `\0\0\0\0`: raw bytes follow
//!
//! Content is stored raw when the strategy says so, when it is too small to
//! benefit, or when compression would not shrink it. Readers never need to
//! know which strategy wrote a frame.
//!
//! ```rust
//! use chronolog::compression::{CompressionEngine, CompressionStrategy};
//!
//! let engine = CompressionEngine::new(CompressionStrategy::Fast);
//! let data = b"fn main() {}\n".repeat(64);
//! let framed = engine.compress(&data).unwrap();
//! assert!(framed.len() < data.len());
//! assert_eq!(engine.decompress(&framed).unwrap(), data);
//! ```

use crate::error::{Result, TimelineError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// When to compress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Store everything raw
    None,
    /// Compress anything that shrinks (default)
    Fast,
    /// Only attempt content at least `min_size` bytes long
    Adaptive {
        /// Minimum size worth compressing
        min_size: usize,
    },
}

impl Default for CompressionStrategy {
    fn default() -> Self {
        CompressionStrategy::Fast
    }
}

/// Frames content according to a [`CompressionStrategy`]
#[derive(Debug, Clone, Default)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
}

const LZ4_MAGIC: &[u8] = b"LZ4T";
const RAW_MAGIC: &[u8] = &[0, 0, 0, 0];
const HEADER_LEN: usize = 4;
// Below this LZ4 cannot win against its own size prefix
const MIN_COMPRESSIBLE: usize = 64;

impl CompressionEngine {
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Strategy in use
    pub fn strategy(&self) -> &CompressionStrategy {
        &self.strategy
    }

    /// Frame `content`, compressing it when the strategy allows and it helps
    ///
    /// # Errors
    ///
    /// Infallible with the current LZ4 backend.
    pub fn compress(&self, content: &[u8]) -> Result<Vec<u8>> {
        let attempt = match &self.strategy {
            CompressionStrategy::None => false,
            CompressionStrategy::Fast => content.len() >= MIN_COMPRESSIBLE,
            CompressionStrategy::Adaptive { min_size } => {
                content.len() >= (*min_size).max(MIN_COMPRESSIBLE)
            }
        };

        if attempt {
            let compressed = compress_prepend_size(content);
            if compressed.len() < content.len() {
                debug!(
                    "Compressed {} -> {} bytes ({:.1}% of original)",
                    content.len(),
                    compressed.len(),
                    compressed.len() as f64 / content.len() as f64 * 100.0
                );

                let mut framed = Vec::with_capacity(HEADER_LEN + compressed.len());
                framed.extend_from_slice(LZ4_MAGIC);
                framed.extend_from_slice(&compressed);
                return Ok(framed);
            }
            trace!("Compression not beneficial for {} bytes, storing raw", content.len());
        }

        let mut framed = Vec::with_capacity(HEADER_LEN + content.len());
        framed.extend_from_slice(RAW_MAGIC);
        framed.extend_from_slice(content);
        Ok(framed)
    }

    /// Undo [`compress`](Self::compress)
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Decompression`] if the frame is truncated, has an
    ///   unknown header, or the LZ4 block is corrupt
    pub fn decompress(&self, framed: &[u8]) -> Result<Vec<u8>> {
        if framed.len() < HEADER_LEN {
            return Err(TimelineError::decompression("frame shorter than header"));
        }

        let (header, body) = framed.split_at(HEADER_LEN);
        if header == LZ4_MAGIC {
            let content = decompress_size_prepended(body)
                .map_err(|e| TimelineError::decompression(format!("LZ4 decompression failed: {}", e)))?;
            trace!("Decompressed {} bytes to {} bytes", framed.len(), content.len());
            Ok(content)
        } else if header == RAW_MAGIC {
            Ok(body.to_vec())
        } else {
            Err(TimelineError::decompression(format!(
                "unknown frame header {:02x?}",
                header
            )))
        }
    }
}
