//! Completion request and background-completion polling.

use partload_protocol::{CompletionBody, CompletionReply, CompletionStatus};
use partload_transfer::{UploadPhase, UploadSession};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::UploadError;
use crate::transport::guarded;
use crate::uploader::Uploader;

/// How the service answered the completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Finalize {
    /// Assembled on the spot.
    Now,
    /// Assembly runs in the background; poll this link.
    Poll(String),
}

/// Maps a completion reply onto the next step, or a completion error.
pub(crate) fn interpret_reply(reply: CompletionReply) -> Result<Finalize, UploadError> {
    if let Some(error) = reply.error {
        return Err(UploadError::Completion(error.summary()));
    }
    match reply.status {
        CompletionStatus::Ok => Ok(Finalize::Now),
        CompletionStatus::Accepted => reply
            .state_link
            .filter(|link| !link.is_empty())
            .map(Finalize::Poll)
            .ok_or_else(|| {
                UploadError::Completion("accepted completion without a state link".into())
            }),
        CompletionStatus::Unrecognized(status) => Err(UploadError::Completion(format!(
            "unrecognized completion status: {status}"
        ))),
    }
}

/// Outcome of a finished completion.
pub(crate) struct Finalized {
    pub entity_tag: Option<String>,
    pub polls: u32,
}

impl Uploader {
    /// Sends the part list once and waits until the service has assembled
    /// the object.
    pub(crate) async fn complete(
        &self,
        session: &UploadSession,
        abort: &CancellationToken,
    ) -> Result<Finalized, UploadError> {
        let plan = session
            .plan()
            .ok_or_else(|| UploadError::Completion("no upload plan attached".into()))?;
        let parts = session
            .uploaded_parts()
            .ok_or_else(|| UploadError::Completion("parts missing integrity tags".into()))?;
        let body = CompletionBody::new(parts);
        debug!(parts = body.parts.len(), "requesting completion");

        let timeout = self.settings().request_timeout;
        let reply = guarded(
            abort,
            timeout,
            self.transport()
                .post_completion(plan.completion_link(), &body),
        )
        .await
        .map_err(|i| i.into_upload_error(|e| UploadError::Completion(e.to_string())))?;

        match interpret_reply(reply)? {
            Finalize::Now => Ok(Finalized {
                entity_tag: None,
                polls: 0,
            }),
            Finalize::Poll(state_link) => {
                self.enter(session, UploadPhase::PollingCompletion)?;
                self.poll_completion(&state_link, abort).await
            }
        }
    }

    /// Polls `state_link` until the service reports the object in place.
    ///
    /// A pending state is never an error; only a failed request, an error
    /// payload or the optional attempt limit end the loop early.
    async fn poll_completion(
        &self,
        state_link: &str,
        abort: &CancellationToken,
    ) -> Result<Finalized, UploadError> {
        let settings = self.settings();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let state = guarded(
                abort,
                settings.request_timeout,
                self.transport().post_poll_state(state_link),
            )
            .await
            .map_err(|i| i.into_upload_error(|e| UploadError::Completion(e.to_string())))?;

            if let Some(error) = &state.error {
                return Err(UploadError::Completion(error.summary()));
            }
            if state.is_done() {
                info!(polls = attempt, "background completion finished");
                return Ok(Finalized {
                    entity_tag: state.e_tag,
                    polls: attempt,
                });
            }
            if let Some(max) = settings.max_poll_attempts
                && attempt >= max
            {
                return Err(UploadError::Completion(format!(
                    "completion still pending after {attempt} polls"
                )));
            }

            let delay = settings.poll_delay(attempt);
            debug!(attempt, ?delay, "completion pending");
            tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
