//! Upload error types.

use std::time::Duration;

use partload_protocol::ApiError;
use partload_transfer::TransferError;

/// Failure of a single call against the storage service or a part URL.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service error: {0}")]
    Api(ApiError),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that end an upload session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// No usable upload plan; nothing was transferred.
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("part {part_number} failed: {reason}")]
    ChunkTransfer { part_number: u32, reason: String },

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("cancelled")]
    Cancelled,

    #[error("an upload is already running on this uploader")]
    Busy,

    #[error("worker error: {0}")]
    Worker(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Returns `true` when the session ended because abort was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}
