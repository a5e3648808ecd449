//! Data types for the upload flow.

use partload_protocol::OutputMetadata;
use partload_transfer::UploadPhase;

/// Event emitted while an upload runs.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The session entered `phase`; `percent` is the progress reported then.
    PhaseChanged { phase: UploadPhase, percent: u8 },
    /// A part received its integrity tag.
    PartUploaded {
        part_number: u32,
        done: usize,
        total: usize,
    },
    /// The file is stored and bound to the output slot.
    Completed { output: OutputMetadata },
    /// The session was torn down and the multipart upload discarded.
    Aborted { reason: String },
    /// No plan could be obtained.
    Failed { error: String },
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub output: OutputMetadata,
    pub parts: usize,
    pub bytes: u64,
    /// State polls needed for a background completion (`0` when the
    /// service finalized synchronously).
    pub polls: u32,
}
