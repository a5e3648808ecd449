//! Chunk transfer: a bounded pool of workers, each claiming the next part.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use partload_protocol::UploadPlan;
use partload_transfer::{
    ByteRange, ChunkReader, PartRecord, ProgressReporter, UploadSession, plan_chunks,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::UploadError;
use crate::transport::{StorageTransport, guarded};
use crate::types::UploadEvent;

/// Derives the byte ranges of `plan` for a file of `file_size` bytes.
///
/// A zero-byte file still gets one empty part, sent through the first URL.
pub(crate) fn part_ranges(
    plan: &UploadPlan,
    file_size: u64,
) -> Result<Vec<ByteRange>, UploadError> {
    if plan.chunk_size == 0 {
        return Err(UploadError::Planning("service issued a zero chunk size".into()));
    }

    let mut ranges = plan_chunks(file_size, plan.chunk_size);
    if ranges.is_empty() {
        ranges.push(ByteRange { start: 0, end: 0 });
    }

    if plan.urls.len() < ranges.len() {
        return Err(UploadError::Planning(format!(
            "plan carries {} part URLs, {} needed",
            plan.urls.len(),
            ranges.len()
        )));
    }
    if plan.urls.len() > ranges.len() {
        debug!(
            urls = plan.urls.len(),
            parts = ranges.len(),
            "ignoring surplus part URLs"
        );
    }
    Ok(ranges)
}

/// Everything a part worker needs.
pub(crate) struct PartPool {
    pub transport: Arc<dyn StorageTransport>,
    pub session: Arc<UploadSession>,
    pub reader: ChunkReader,
    pub progress: Arc<ProgressReporter>,
    pub events: mpsc::Sender<UploadEvent>,
    pub request_timeout: Duration,
}

impl PartPool {
    /// Uploads every planned part with `workers` concurrent workers.
    ///
    /// Stops claiming parts as soon as `abort` fires or any part fails, and
    /// returns the first error seen.
    pub(crate) async fn run(
        self,
        workers: usize,
        abort: &CancellationToken,
    ) -> Result<(), UploadError> {
        let pool = Arc::new(self);
        let next = Arc::new(AtomicUsize::new(0));
        let stop = abort.child_token();

        let mut set = JoinSet::new();
        for worker in 0..workers.max(1) {
            set.spawn(Arc::clone(&pool).work(worker, Arc::clone(&next), stop.clone()));
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let result = joined
                .unwrap_or_else(|e| Err(UploadError::Worker(format!("task join error: {e}"))));
            if let Err(e) = result {
                stop.cancel();
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn work(
        self: Arc<Self>,
        worker: usize,
        next: Arc<AtomicUsize>,
        stop: CancellationToken,
    ) -> Result<(), UploadError> {
        let total = self.session.part_count();
        loop {
            if stop.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(part) = self.session.part(index) else {
                return Ok(());
            };
            let url = self
                .session
                .plan()
                .and_then(|plan| plan.urls.get(index))
                .cloned()
                .ok_or_else(|| UploadError::ChunkTransfer {
                    part_number: part.part_number,
                    reason: "no part URL".into(),
                })?;

            let tag = self.send_part(&part, &url, &stop).await?;
            let done = self.session.record_tag(part.part_number, tag)?;
            let percent = self.progress.report_parts(done, total);
            debug!(
                worker,
                part = part.part_number,
                bytes = part.range.len(),
                done,
                total,
                percent,
                "part uploaded"
            );

            let event = UploadEvent::PartUploaded {
                part_number: part.part_number,
                done,
                total,
            };
            if self.events.try_send(event).is_err() {
                trace!(part = part.part_number, "event dropped");
            }
        }
    }

    async fn send_part(
        &self,
        part: &PartRecord,
        url: &str,
        stop: &CancellationToken,
    ) -> Result<String, UploadError> {
        let part_number = part.part_number;
        let range = part.range;
        let reader = self.reader.clone();
        let body = tokio::task::spawn_blocking(move || reader.read_range(range))
            .await
            .map_err(|e| UploadError::Worker(format!("task join error: {e}")))??;

        let receipt = guarded(stop, self.request_timeout, self.transport.put_chunk(url, body))
            .await
            .map_err(|i| {
                i.into_upload_error(|e| UploadError::ChunkTransfer {
                    part_number,
                    reason: e.to_string(),
                })
            })?;

        receipt
            .integrity_tag()
            .ok_or_else(|| UploadError::ChunkTransfer {
                part_number,
                reason: if receipt.is_success() {
                    "response carried no ETag".into()
                } else {
                    format!("unexpected status {}", receipt.status)
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partload_protocol::UploadLinks;

    fn plan(chunk_size: u64, urls: usize) -> UploadPlan {
        UploadPlan {
            chunk_size,
            urls: (1..=urls).map(|i| format!("https://s3.example/part/{i}")).collect(),
            links: UploadLinks {
                abort_upload: "a".into(),
                complete_upload: "c".into(),
            },
        }
    }

    #[test]
    fn ranges_follow_plan() {
        let ranges = part_ranges(&plan(10_000_000, 3), 25_000_000).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2], ByteRange { start: 20_000_000, end: 25_000_000 });
    }

    #[test]
    fn empty_file_gets_one_empty_part() {
        let ranges = part_ranges(&plan(10, 1), 0).unwrap();
        assert_eq!(ranges, vec![ByteRange { start: 0, end: 0 }]);
    }

    #[test]
    fn surplus_urls_are_ignored() {
        assert_eq!(part_ranges(&plan(10, 5), 15).unwrap().len(), 2);
    }

    #[test]
    fn too_few_urls_is_a_planning_error() {
        let result = part_ranges(&plan(10, 2), 25);
        assert!(matches!(result, Err(UploadError::Planning(msg)) if msg.contains("3 needed")));
    }

    #[test]
    fn zero_chunk_size_is_a_planning_error() {
        assert!(matches!(
            part_ranges(&plan(0, 3), 25),
            Err(UploadError::Planning(_))
        ));
    }
}
