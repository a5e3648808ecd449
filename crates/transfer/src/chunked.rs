use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::TransferError;

// ---------------------------------------------------------------------------
// Chunk planning
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` for an empty range.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits `file_size` bytes into consecutive ranges of `chunk_size` bytes.
///
/// Yields `ceil(file_size / chunk_size)` ranges; only the last one may be
/// shorter than `chunk_size`.
///
/// # Panics
///
/// Panics if `chunk_size` is zero. Callers validate backend-provided sizes
/// before planning.
pub fn plan_chunks(file_size: u64, chunk_size: u64) -> Vec<ByteRange> {
    assert!(chunk_size > 0, "chunk size must be positive");

    let count = file_size.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            ByteRange {
                start,
                end: (start + chunk_size).min(file_size),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hex::encode(hasher.finalize());
    tracing::debug!(path = %path.display(), sha256 = %digest, "file checksum computed");
    Ok(digest)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads arbitrary byte ranges of a local file.
///
/// Every read opens its own handle, so a single reader can be shared by
/// several part-upload workers.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` and records its current size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file_size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file_size,
        })
    }

    /// Reads exactly the bytes covered by `range`.
    pub fn read_range(&self, range: ByteRange) -> Result<Vec<u8>, TransferError> {
        if range.end > self.file_size || range.start > range.end {
            return Err(TransferError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                file_size: self.file_size,
            });
        }

        let mut buf = vec![0u8; range.len() as usize];
        if buf.is_empty() {
            return Ok(buf);
        }

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.start))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Total file size in bytes at open time.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the source file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
