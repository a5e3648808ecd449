//! Session driver: plan, transfer, complete, and tear down on failure.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use partload_protocol::{LinkType, OutputMetadata, UploadPlan, UploadTarget};
use partload_transfer::{
    ChunkReader, ProgressCallback, ProgressReporter, UploadPhase, UploadSession,
    calculate_file_checksum, validate_target_path,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::config::UploadSettings;
use crate::error::UploadError;
use crate::parts::{PartPool, part_ranges};
use crate::transport::{OutputBinding, PlanRequest, StorageTransport, guarded};
use crate::types::{UploadEvent, UploadReport};

/// Drives one upload session at a time for a single output slot.
pub struct Uploader {
    transport: Arc<dyn StorageTransport>,
    output: Arc<dyn OutputBinding>,
    settings: UploadSettings,
    progress: Arc<ProgressReporter>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    abort: Mutex<CancellationToken>,
    busy: AtomicBool,
    discards: TaskTracker,
}

impl Uploader {
    pub fn new(
        transport: Arc<dyn StorageTransport>,
        output: Arc<dyn OutputBinding>,
        settings: UploadSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            transport,
            output,
            settings,
            progress: Arc::new(ProgressReporter::new()),
            events_tx,
            events_rx: Some(events_rx),
            abort: Mutex::new(CancellationToken::new()),
            busy: AtomicBool::new(false),
            discards: TaskTracker::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped rather than awaited when the channel is full.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Registers a progress callback (0–100).
    pub fn on_progress(&self, callback: ProgressCallback) {
        self.progress.on_progress(callback);
    }

    /// Last reported progress.
    pub fn progress(&self) -> u8 {
        self.progress.current()
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub(crate) fn transport(&self) -> &dyn StorageTransport {
        self.transport.as_ref()
    }

    /// Token cancelled by [`request_abort`](Self::request_abort).
    ///
    /// A fresh token replaces it once an abort has been handled, so clones
    /// taken before that keep reporting the old request.
    pub fn cancel_token(&self) -> CancellationToken {
        self.abort.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Asks the running upload to stop. No new part or poll starts after this.
    pub fn request_abort(&self) {
        info!("abort requested");
        self.cancel_token().cancel();
    }

    /// Returns `true` while an abort request is pending.
    pub fn is_abort_requested(&self) -> bool {
        self.cancel_token().is_cancelled()
    }

    /// Waits for outstanding discard requests.
    pub async fn wait_idle(&self) {
        self.discards.close();
        self.discards.wait().await;
        self.discards.reopen();
    }

    /// Uploads `file` to `target`.
    ///
    /// On success the output slot receives the stored object's metadata.
    /// On any failure the output slot is reset, and if the service already
    /// opened a multipart upload it is discarded in the background.
    #[tracing::instrument(skip(self, target), fields(target = %target.path))]
    pub async fn upload(
        &self,
        file: &Path,
        target: UploadTarget,
    ) -> Result<UploadReport, UploadError> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(UploadError::Busy);
        }
        let _busy = BusyGuard(&self.busy);
        let abort = self.cancel_token();

        let reader = match open_source(file).await {
            Ok(reader) => reader,
            Err(e) => return Err(self.fail(&UploadSession::new(0), e)),
        };
        let session = Arc::new(UploadSession::new(reader.file_size()));

        if let Err(e) = validate_target_path(&target.path) {
            return Err(self.fail(&session, UploadError::Planning(e.to_string())));
        }
        self.enter(&session, UploadPhase::FetchingLink)?;

        let plan = match self.fetch_plan(&reader, &target, &abort).await {
            Ok(plan) => plan,
            Err(UploadError::Cancelled) => {
                return Err(self.abort_session(&session, UploadError::Cancelled));
            }
            Err(e) => return Err(self.fail(&session, e)),
        };
        let ranges = match part_ranges(&plan, reader.file_size()) {
            Ok(ranges) => ranges,
            Err(e) => {
                self.discard(plan.abort_link());
                return Err(self.fail(&session, e));
            }
        };
        info!(
            file_size = reader.file_size(),
            chunk_size = plan.chunk_size,
            parts = ranges.len(),
            "upload plan received"
        );

        session.start_upload(plan, ranges)?;
        self.announce(UploadPhase::Uploading);

        match self.transfer(&session, reader, &target, &abort).await {
            Ok(report) => Ok(report),
            Err(e) => Err(self.abort_session(&session, e)),
        }
    }

    async fn fetch_plan(
        &self,
        reader: &ChunkReader,
        target: &UploadTarget,
        abort: &CancellationToken,
    ) -> Result<UploadPlan, UploadError> {
        let sha256_checksum = if self.settings.compute_checksum {
            let path = reader.path().to_path_buf();
            let digest = tokio::task::spawn_blocking(move || calculate_file_checksum(&path))
                .await
                .map_err(|e| UploadError::Worker(format!("task join error: {e}")))??;
            Some(digest)
        } else {
            None
        };

        let request = PlanRequest {
            target: target.clone(),
            file_size: reader.file_size(),
            sha256_checksum,
            link_type: LinkType::Presigned,
        };
        guarded(
            abort,
            self.settings.request_timeout,
            self.transport.request_upload_plan(&request),
        )
        .await
        .map_err(|i| i.into_upload_error(|e| UploadError::Planning(e.to_string())))
    }

    async fn transfer(
        &self,
        session: &Arc<UploadSession>,
        reader: ChunkReader,
        target: &UploadTarget,
        abort: &CancellationToken,
    ) -> Result<UploadReport, UploadError> {
        let parts = session.part_count();
        let pool = PartPool {
            transport: Arc::clone(&self.transport),
            session: Arc::clone(session),
            reader,
            progress: Arc::clone(&self.progress),
            events: self.events_tx.clone(),
            request_timeout: self.settings.request_timeout,
        };
        pool.run(self.settings.workers_for(parts), abort).await?;

        if !session.try_begin_completion() {
            return Err(UploadError::Completion(format!(
                "completion not started ({} of {parts} parts tagged)",
                session.tagged_count()
            )));
        }
        self.announce(UploadPhase::Completing);

        let finalized = self.complete(session, abort).await?;
        session.transition(UploadPhase::Completed)?;
        self.announce(UploadPhase::Completed);

        let output = OutputMetadata::from_target(target, finalized.entity_tag);
        self.output.on_output_ready(&output);
        self.emit(UploadEvent::Completed {
            output: output.clone(),
        });
        info!(parts, polls = finalized.polls, "upload completed");

        Ok(UploadReport {
            output,
            parts,
            bytes: session.file_size(),
            polls: finalized.polls,
        })
    }

    /// Moves `session` to `phase` and reports it.
    pub(crate) fn enter(
        &self,
        session: &UploadSession,
        phase: UploadPhase,
    ) -> Result<(), UploadError> {
        session.transition(phase)?;
        self.announce(phase);
        Ok(())
    }

    fn announce(&self, phase: UploadPhase) {
        let percent = match phase {
            UploadPhase::Aborting | UploadPhase::Aborted | UploadPhase::Failed => {
                self.progress.current()
            }
            _ => self.progress.report_phase(phase),
        };
        debug!(?phase, percent, "phase changed");
        self.emit(UploadEvent::PhaseChanged { phase, percent });
    }

    fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!(error = %e, "upload event dropped");
        }
    }

    /// Ends a session that never got a usable plan.
    fn fail(&self, session: &UploadSession, error: UploadError) -> UploadError {
        if session.transition(UploadPhase::Failed).is_ok() {
            self.progress.reset();
            self.output.on_output_reset();
            self.announce(UploadPhase::Failed);
            self.emit(UploadEvent::Failed {
                error: error.to_string(),
            });
            error!(error = %error, "upload failed");
        }
        error
    }

    /// Tears the session down. Only the first call for a session has any
    /// effect; later calls hand `reason` back untouched.
    pub(crate) fn abort_session(
        &self,
        session: &UploadSession,
        reason: UploadError,
    ) -> UploadError {
        if !session.begin_abort() {
            return reason;
        }
        self.progress.reset();
        self.announce(UploadPhase::Aborting);
        if reason.is_cancelled() {
            info!("upload cancelled");
        } else {
            error!(error = %reason, "upload aborted");
        }

        if let Some(plan) = session.plan() {
            self.discard(plan.abort_link());
        }
        self.clear_abort_request();
        self.output.on_output_reset();

        if let Err(e) = session.transition(UploadPhase::Aborted) {
            warn!(error = %e, "unexpected phase after abort");
        }
        self.announce(UploadPhase::Aborted);
        self.emit(UploadEvent::Aborted {
            reason: reason.to_string(),
        });
        reason
    }

    /// Fires the discard request without waiting for it.
    fn discard(&self, abort_link: &str) {
        let transport = Arc::clone(&self.transport);
        let link = abort_link.to_string();
        let limit = self.settings.request_timeout;
        self.discards.spawn(async move {
            match tokio::time::timeout(limit, transport.post_abort(&link)).await {
                Ok(Ok(())) => debug!(%link, "multipart upload discarded"),
                Ok(Err(e)) => warn!(%link, error = %e, "discard request failed"),
                Err(_) => warn!(%link, ?limit, "discard request timed out"),
            }
        });
    }

    fn clear_abort_request(&self) {
        let mut token = self.abort.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn open_source(path: &Path) -> Result<ChunkReader, UploadError> {
    let path = path.to_path_buf();
    let reader = tokio::task::spawn_blocking(move || ChunkReader::open(&path))
        .await
        .map_err(|e| UploadError::Worker(format!("task join error: {e}")))??;
    Ok(reader)
}
