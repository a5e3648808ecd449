//! Chunk planning, byte-range reads and upload session state.
//!
//! This crate holds everything about a multipart upload that does not touch
//! the network: splitting a file into the byte ranges the backend dictates,
//! reading those ranges, tracking which parts carry an integrity tag, and
//! mapping the session phase onto a single 0–100 progress scale.

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{ByteRange, ChunkReader, calculate_file_checksum, checksum_bytes, plan_chunks};
pub use progress::{ProgressCallback, ProgressReporter, uploading_percent};
pub use types::{PartRecord, UploadPhase, UploadSession};
pub use validation::validate_target_path;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid target path: {0}")]
    InvalidPath(String),

    #[error("invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition { from: UploadPhase, to: UploadPhase },

    #[error("unknown part number: {0}")]
    UnknownPart(u32),

    #[error("part {0} already carries an integrity tag")]
    AlreadyTagged(u32),

    #[error("upload plan already attached")]
    PlanAlreadySet,

    #[error("byte range {start}..{end} exceeds file size {file_size}")]
    RangeOutOfBounds { start: u64, end: u64, file_size: u64 },
}
