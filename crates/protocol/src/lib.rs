//! Wire types spoken between the uploader and the storage service.
//!
//! The storage service hands out pre-signed part URLs for a multipart
//! upload, finalizes the upload on request (synchronously or through a
//! pollable completion future) and discards it on abort. Every JSON
//! response is wrapped in an [`Envelope`].

pub mod envelope;
pub mod messages;
pub mod types;

pub use envelope::{ApiError, Envelope, EnvelopeError, ErrorItem};
pub use messages::{
    CompletionAccepted, CompletionBody, CompletionLinks, CompletionReply, CompletionStatus,
    FutureState, PollStateResponse, UploadLinks, UploadPlan, UploadedPart,
};
pub use types::{LinkType, LocationId, OutputMetadata, UploadTarget};
