use serde::{Deserialize, Deserializer, Serialize};

use crate::envelope::ApiError;

// ---------------------------------------------------------------------------
// Upload plan
// ---------------------------------------------------------------------------

/// Single-use endpoints that finalize or discard a multipart upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadLinks {
    pub abort_upload: String,
    pub complete_upload: String,
}

/// How to transfer one file, as handed out by the storage service.
///
/// `urls` are one-time-use part URLs: index 0 covers the first byte range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPlan {
    #[serde(deserialize_with = "byte_size")]
    pub chunk_size: u64,
    pub urls: Vec<String>,
    pub links: UploadLinks,
}

impl UploadPlan {
    /// Convenience for the discard endpoint.
    pub fn abort_link(&self) -> &str {
        &self.links.abort_upload
    }

    /// Convenience for the finalize endpoint.
    pub fn completion_link(&self) -> &str {
        &self.links.complete_upload
    }
}

/// Accepts a byte size either as a JSON number or as a decimal string.
fn byte_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid byte size: {s:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// One uploaded part and the integrity tag the backend issued for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    pub number: u32,
    pub e_tag: String,
}

/// Body of the completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionBody {
    pub parts: Vec<UploadedPart>,
}

impl CompletionBody {
    /// Builds the body with parts sorted by part number.
    pub fn new(mut parts: Vec<UploadedPart>) -> Self {
        parts.sort_by_key(|p| p.number);
        Self { parts }
    }
}

/// Links returned when completion is accepted but still running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionLinks {
    pub state: String,
}

/// Payload of an accepted completion (`202`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionAccepted {
    pub links: CompletionLinks,
}

/// Backend verdict on a completion request, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Finalized on the spot.
    Ok,
    /// Finalization runs in the background; poll the state link.
    Accepted,
    /// Anything the protocol does not define.
    Unrecognized(String),
}

/// What the completion endpoint answered.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReply {
    pub status: CompletionStatus,
    pub state_link: Option<String>,
    pub error: Option<ApiError>,
}

impl CompletionReply {
    /// A synchronous success.
    pub fn ok() -> Self {
        Self {
            status: CompletionStatus::Ok,
            state_link: None,
            error: None,
        }
    }

    /// An accepted completion that must be polled at `state_link`.
    pub fn accepted(state_link: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Accepted,
            state_link: Some(state_link.into()),
            error: None,
        }
    }

    /// A rejected completion.
    pub fn rejected(error: ApiError) -> Self {
        Self {
            status: CompletionStatus::Unrecognized("error".into()),
            state_link: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Completion polling
// ---------------------------------------------------------------------------

/// State of a background completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FutureState {
    /// Finished; the object is in place.
    Ok,
    /// Still running.
    Nok,
    /// Any other state, including `pending`; polled again like `nok`.
    #[serde(other)]
    Pending,
}

/// Answer of the state link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollStateResponse {
    pub state: FutureState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl PollStateResponse {
    /// A pending state.
    pub fn pending() -> Self {
        Self {
            state: FutureState::Nok,
            e_tag: None,
            error: None,
        }
    }

    /// A finished state carrying the object's entity tag.
    pub fn done(e_tag: Option<String>) -> Self {
        Self {
            state: FutureState::Ok,
            e_tag,
            error: None,
        }
    }

    /// Returns `true` once the backend reports the upload finalized.
    pub fn is_done(&self) -> bool {
        self.state == FutureState::Ok
    }
}
