use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use partload_protocol::{UploadPlan, UploadedPart};

use crate::TransferError;
use crate::chunked::ByteRange;

/// Step of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    Idle,
    FetchingLink,
    Uploading,
    Completing,
    PollingCompletion,
    Completed,
    Aborting,
    Aborted,
    Failed,
}

impl UploadPhase {
    /// Returns `true` for phases no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadPhase::Completed | UploadPhase::Aborted | UploadPhase::Failed
        )
    }

    /// Progress reported on entering the phase.
    ///
    /// `Uploading` starts at 1 and then follows [`uploading_percent`].
    ///
    /// [`uploading_percent`]: crate::uploading_percent
    pub fn percent_floor(self) -> u8 {
        match self {
            UploadPhase::Idle
            | UploadPhase::Aborting
            | UploadPhase::Aborted
            | UploadPhase::Failed => 0,
            UploadPhase::FetchingLink | UploadPhase::Uploading => 1,
            UploadPhase::Completing | UploadPhase::PollingCompletion => 99,
            UploadPhase::Completed => 100,
        }
    }

    /// Whether the session state machine allows `self -> to`.
    pub fn can_transition_to(self, to: UploadPhase) -> bool {
        use UploadPhase::*;
        matches!(
            (self, to),
            (Idle, FetchingLink)
                | (Idle, Failed)
                | (FetchingLink, Uploading)
                | (FetchingLink, Aborting)
                | (FetchingLink, Failed)
                | (Uploading, Completing)
                | (Uploading, Aborting)
                | (Completing, Completed)
                | (Completing, PollingCompletion)
                | (Completing, Aborting)
                | (PollingCompletion, Completed)
                | (PollingCompletion, Aborting)
                | (Aborting, Aborted)
        )
    }
}

/// One planned part and the integrity tag it earned, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// 1-based part number.
    pub part_number: u32,
    pub range: ByteRange,
    pub integrity_tag: Option<String>,
}

/// State of a single file transfer (thread-safe).
///
/// Only the driving logic mutates the session. The plan is attached once,
/// when the upload phase starts, and never changes afterwards.
#[derive(Debug)]
pub struct UploadSession {
    plan: OnceLock<UploadPlan>,
    inner: RwLock<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    phase: UploadPhase,
    file_size: u64,
    parts: Vec<PartRecord>,
    tagged: usize,
    completion_requested: bool,
}

impl UploadSession {
    /// Creates an idle session for a file of `file_size` bytes.
    pub fn new(file_size: u64) -> Self {
        Self {
            plan: OnceLock::new(),
            inner: RwLock::new(SessionInner {
                phase: UploadPhase::Idle,
                file_size,
                parts: Vec::new(),
                tagged: 0,
                completion_requested: false,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves the session to `to` if the state machine allows it.
    pub fn transition(&self, to: UploadPhase) -> Result<(), TransferError> {
        let mut s = self.write();
        if !s.phase.can_transition_to(to) {
            return Err(TransferError::InvalidTransition { from: s.phase, to });
        }
        s.phase = to;
        Ok(())
    }

    /// Attaches the plan, creates one record per range and enters `Uploading`.
    pub fn start_upload(
        &self,
        plan: UploadPlan,
        ranges: Vec<ByteRange>,
    ) -> Result<(), TransferError> {
        let mut s = self.write();
        if !s.phase.can_transition_to(UploadPhase::Uploading) {
            return Err(TransferError::InvalidTransition {
                from: s.phase,
                to: UploadPhase::Uploading,
            });
        }
        self.plan
            .set(plan)
            .map_err(|_| TransferError::PlanAlreadySet)?;

        s.parts = ranges
            .into_iter()
            .zip(1u32..)
            .map(|(range, part_number)| PartRecord {
                part_number,
                range,
                integrity_tag: None,
            })
            .collect();
        s.tagged = 0;
        s.phase = UploadPhase::Uploading;
        Ok(())
    }

    /// Records the tag of `part_number`. Returns how many parts are tagged now.
    ///
    /// A tag is set exactly once; a second tag for the same part is an error.
    pub fn record_tag(&self, part_number: u32, tag: String) -> Result<usize, TransferError> {
        let mut s = self.write();
        let index = part_number
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|&i| i < s.parts.len())
            .ok_or(TransferError::UnknownPart(part_number))?;

        let record = &mut s.parts[index];
        if record.integrity_tag.is_some() {
            return Err(TransferError::AlreadyTagged(part_number));
        }
        record.integrity_tag = Some(tag);
        s.tagged += 1;
        Ok(s.tagged)
    }

    /// Enters `Completing` exactly once, and only when every part is tagged.
    ///
    /// Returns `true` for the single caller allowed to send the completion
    /// request.
    pub fn try_begin_completion(&self) -> bool {
        let mut s = self.write();
        if s.completion_requested
            || s.phase != UploadPhase::Uploading
            || s.tagged != s.parts.len()
        {
            return false;
        }
        s.completion_requested = true;
        s.phase = UploadPhase::Completing;
        true
    }

    /// Enters `Aborting` unless the session is already terminal or aborting.
    ///
    /// Returns `true` for the single caller that owns the teardown.
    pub fn begin_abort(&self) -> bool {
        let mut s = self.write();
        if !s.phase.can_transition_to(UploadPhase::Aborting) {
            return false;
        }
        s.phase = UploadPhase::Aborting;
        true
    }

    /// The attached plan, once the upload phase has started.
    pub fn plan(&self) -> Option<&UploadPlan> {
        self.plan.get()
    }

    /// Current phase.
    pub fn phase(&self) -> UploadPhase {
        self.read().phase
    }

    /// Returns `true` once the session reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.read().phase.is_terminal()
    }

    /// Size of the source file.
    pub fn file_size(&self) -> u64 {
        self.read().file_size
    }

    /// Number of planned parts.
    pub fn part_count(&self) -> usize {
        self.read().parts.len()
    }

    /// Number of parts carrying a tag.
    pub fn tagged_count(&self) -> usize {
        self.read().tagged
    }

    /// Snapshot of the record at `index` (0-based).
    pub fn part(&self, index: usize) -> Option<PartRecord> {
        self.read().parts.get(index).cloned()
    }

    /// Snapshot of every part record.
    pub fn parts(&self) -> Vec<PartRecord> {
        self.read().parts.clone()
    }

    /// The `(number, tag)` list for the completion request, or `None` while
    /// any part is still missing its tag.
    pub fn uploaded_parts(&self) -> Option<Vec<UploadedPart>> {
        let s = self.read();
        s.parts
            .iter()
            .map(|p| {
                p.integrity_tag.as_ref().map(|tag| UploadedPart {
                    number: p.part_number,
                    e_tag: tag.clone(),
                })
            })
            .collect()
    }
}
