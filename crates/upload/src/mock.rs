//! Scripted collaborators shared by the engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use partload_protocol::{
    ApiError, CompletionBody, CompletionReply, OutputMetadata, PollStateResponse, UploadLinks,
    UploadPlan,
};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{
    ChunkReceipt, OutputBinding, PlanRequest, StorageTransport, TransportFuture,
};

/// One recorded collaborator call.
#[derive(Debug, Clone)]
pub(crate) enum Call {
    Plan(PlanRequest),
    Put { url: String, len: usize },
    Complete(CompletionBody),
    Poll(String),
    Abort(String),
    Ready(OutputMetadata),
    Reset,
}

/// Ordered journal shared by the transport and output mocks.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorded(Arc<Mutex<Vec<Call>>>);

impl Recorded {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn plan_requests(&self) -> Vec<PlanRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Plan(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn puts(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Put { url, len } => Some((url, len)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn completions(&self) -> Vec<CompletionBody> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Complete(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn ready(&self) -> Vec<OutputMetadata> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ready(o) => Some(o),
                _ => None,
            })
            .collect()
    }
}

/// Plan with `urls` part URLs ending in their 1-based part number.
pub(crate) fn sample_plan(chunk_size: u64, urls: usize) -> UploadPlan {
    UploadPlan {
        chunk_size,
        urls: (1..=urls)
            .map(|i| format!("https://s3.example/part/{i}"))
            .collect(),
        links: UploadLinks {
            abort_upload: "https://storage.example/files/f:abort".into(),
            complete_upload: "https://storage.example/files/f:complete".into(),
        },
    }
}

fn part_number(url: &str) -> u32 {
    url.rsplit('/')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Storage transport answering from a script.
pub(crate) struct MockTransport {
    journal: Recorded,
    plan: Option<UploadPlan>,
    tags: Mutex<HashMap<u32, String>>,
    receipts: Mutex<HashMap<u32, ChunkReceipt>>,
    stalled: Mutex<HashSet<u32>>,
    cancel_after: Mutex<Option<(u32, CancellationToken)>>,
    put_delay: Mutex<Option<Duration>>,
    completion: Mutex<CompletionReply>,
    polls: Mutex<VecDeque<PollStateResponse>>,
    abort_fails: Mutex<bool>,
}

impl MockTransport {
    /// `plan = None` makes the plan request fail with a service error.
    pub(crate) fn new(plan: Option<UploadPlan>, journal: Recorded) -> Self {
        Self {
            journal,
            plan,
            tags: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            stalled: Mutex::new(HashSet::new()),
            cancel_after: Mutex::new(None),
            put_delay: Mutex::new(None),
            completion: Mutex::new(CompletionReply::ok()),
            polls: Mutex::new(VecDeque::new()),
            abort_fails: Mutex::new(false),
        }
    }

    /// Tags handed out for parts 1, 2, ... (quoted on the wire).
    pub(crate) fn set_tags(&self, tags: &[&str]) {
        let mut map = self.tags.lock().unwrap();
        for (n, tag) in (1u32..).zip(tags) {
            map.insert(n, (*tag).to_string());
        }
    }

    pub(crate) fn set_receipt(&self, part: u32, receipt: ChunkReceipt) {
        self.receipts.lock().unwrap().insert(part, receipt);
    }

    /// The upload of `part` never answers.
    pub(crate) fn stall_part(&self, part: u32) {
        self.stalled.lock().unwrap().insert(part);
    }

    /// Cancels `token` while answering the upload of `part`.
    pub(crate) fn cancel_after_put(&self, part: u32, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((part, token));
    }

    pub(crate) fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn set_completion(&self, reply: CompletionReply) {
        *self.completion.lock().unwrap() = reply;
    }

    pub(crate) fn push_polls(&self, states: Vec<PollStateResponse>) {
        self.polls.lock().unwrap().extend(states);
    }

    pub(crate) fn fail_abort(&self) {
        *self.abort_fails.lock().unwrap() = true;
    }
}

impl StorageTransport for MockTransport {
    fn request_upload_plan<'a>(
        &'a self,
        request: &'a PlanRequest,
    ) -> TransportFuture<'a, UploadPlan> {
        self.journal.push(Call::Plan(request.clone()));
        Box::pin(async move {
            self.plan.clone().ok_or_else(|| {
                TransportError::Api(ApiError {
                    message: "permission denied".into(),
                    errors: Vec::new(),
                    status: Some(403),
                })
            })
        })
    }

    fn put_chunk<'a>(&'a self, url: &'a str, body: Vec<u8>) -> TransportFuture<'a, ChunkReceipt> {
        self.journal.push(Call::Put {
            url: url.to_string(),
            len: body.len(),
        });
        let part = part_number(url);
        Box::pin(async move {
            let delay = *self.put_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.stalled.lock().unwrap().contains(&part) {
                std::future::pending::<()>().await;
            }

            let receipt = self.receipts.lock().unwrap().get(&part).cloned();
            let receipt = receipt.unwrap_or_else(|| {
                let tag = self
                    .tags
                    .lock()
                    .unwrap()
                    .get(&part)
                    .cloned()
                    .unwrap_or_else(|| format!("etag-{part}"));
                ChunkReceipt {
                    status: 200,
                    e_tag: Some(format!("\"{tag}\"")),
                }
            });

            if let Some((n, token)) = self.cancel_after.lock().unwrap().as_ref()
                && *n == part
            {
                token.cancel();
            }
            Ok(receipt)
        })
    }

    fn post_completion<'a>(
        &'a self,
        _completion_link: &'a str,
        body: &'a CompletionBody,
    ) -> TransportFuture<'a, CompletionReply> {
        self.journal.push(Call::Complete(body.clone()));
        Box::pin(async move { Ok(self.completion.lock().unwrap().clone()) })
    }

    fn post_poll_state<'a>(&'a self, state_link: &'a str) -> TransportFuture<'a, PollStateResponse> {
        self.journal.push(Call::Poll(state_link.to_string()));
        Box::pin(async move {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Decode("no scripted poll state".into()))
        })
    }

    fn post_abort<'a>(&'a self, abort_link: &'a str) -> TransportFuture<'a, ()> {
        self.journal.push(Call::Abort(abort_link.to_string()));
        Box::pin(async move {
            if *self.abort_fails.lock().unwrap() {
                Err(TransportError::Status {
                    status: 500,
                    body: "discard failed".into(),
                })
            } else {
                Ok(())
            }
        })
    }
}

/// Output slot recording into the shared journal.
pub(crate) struct MockOutput {
    journal: Recorded,
}

impl MockOutput {
    pub(crate) fn new(journal: Recorded) -> Self {
        Self { journal }
    }
}

impl OutputBinding for MockOutput {
    fn on_output_ready(&self, output: &OutputMetadata) {
        self.journal.push(Call::Ready(output.clone()));
    }

    fn on_output_reset(&self) {
        self.journal.push(Call::Reset);
    }
}
