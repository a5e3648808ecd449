//! Collaborator traits of the upload engine.
//!
//! `StorageTransport` is implemented on top of an HTTP client (see the
//! `partload-storage-client` crate); `OutputBinding` is implemented by
//! whatever owns the output slot. Using traits keeps the engine decoupled
//! from transport and testable with mocks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use partload_protocol::{
    CompletionBody, CompletionReply, LinkType, OutputMetadata, PollStateResponse, UploadPlan,
    UploadTarget,
};
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, UploadError};

/// Boxed future returned by [`StorageTransport`] calls.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// What the link provider needs to issue an upload plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub target: UploadTarget,
    pub file_size: u64,
    /// Hex SHA-256 of the whole file.
    pub sha256_checksum: Option<String>,
    pub link_type: LinkType,
}

/// Raw answer to a part upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub status: u16,
    /// `ETag` header as received, quotes included.
    pub e_tag: Option<String>,
}

impl ChunkReceipt {
    /// Returns `true` for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The integrity tag with wrapping quotes stripped.
    ///
    /// `None` unless the status is a success and the tag is non-empty.
    pub fn integrity_tag(&self) -> Option<String> {
        if !self.is_success() {
            return None;
        }
        self.e_tag
            .as_deref()
            .map(|t| t.trim().trim_matches('"'))
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }
}

/// Network side of a multipart upload.
pub trait StorageTransport: Send + Sync {
    /// Asks the storage service for part URLs and completion/abort links.
    fn request_upload_plan<'a>(&'a self, request: &'a PlanRequest)
    -> TransportFuture<'a, UploadPlan>;

    /// Sends one byte range to a single-use part URL.
    fn put_chunk<'a>(&'a self, url: &'a str, body: Vec<u8>) -> TransportFuture<'a, ChunkReceipt>;

    /// Asks the service to assemble the uploaded parts.
    fn post_completion<'a>(
        &'a self,
        completion_link: &'a str,
        body: &'a CompletionBody,
    ) -> TransportFuture<'a, CompletionReply>;

    /// Reads the state of a background completion.
    fn post_poll_state<'a>(&'a self, state_link: &'a str)
    -> TransportFuture<'a, PollStateResponse>;

    /// Asks the service to discard the multipart upload.
    fn post_abort<'a>(&'a self, abort_link: &'a str) -> TransportFuture<'a, ()>;
}

/// Receiver of the upload outcome.
pub trait OutputBinding: Send + Sync {
    /// A file was stored and may now be referenced.
    fn on_output_ready(&self, output: &OutputMetadata);

    /// No valid output exists anymore.
    fn on_output_reset(&self);
}

/// Why a guarded call did not produce a value.
#[derive(Debug)]
pub(crate) enum Interrupted {
    Cancelled,
    Failed(TransportError),
}

impl Interrupted {
    pub(crate) fn into_upload_error(
        self,
        failed: impl FnOnce(TransportError) -> UploadError,
    ) -> UploadError {
        match self {
            Interrupted::Cancelled => UploadError::Cancelled,
            Interrupted::Failed(e) => failed(e),
        }
    }
}

/// Runs a transport call under `limit`, giving up as soon as `cancel` fires.
pub(crate) async fn guarded<T>(
    cancel: &CancellationToken,
    limit: Duration,
    call: TransportFuture<'_, T>,
) -> Result<T, Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Interrupted::Failed(e)),
            Err(_) => Err(Interrupted::Failed(TransportError::Timeout(limit))),
        },
    }
}
