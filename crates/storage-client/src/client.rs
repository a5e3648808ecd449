//! Storage service API client.
//!
//! Async HTTP client using `reqwest`. Service endpoints optionally carry a
//! Bearer token; pre-signed part URLs never do.

use partload_protocol::{
    CompletionAccepted, CompletionBody, CompletionReply, CompletionStatus, Envelope,
    EnvelopeError, PollStateResponse, UploadPlan,
};
use partload_upload::{ChunkReceipt, PlanRequest, StorageTransport, TransportError, TransportFuture};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, ETAG, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Errors from the storage client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("service error: {0}")]
    Service(partload_protocol::ApiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response carried no data")]
    MissingData,

    #[error("invalid API token")]
    InvalidToken,
}

impl From<EnvelopeError> for Error {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Api(api) => Error::Service(api),
            EnvelopeError::Empty => Error::MissingData,
        }
    }
}

impl From<Error> for TransportError {
    fn from(e: Error) -> Self {
        match e {
            Error::Http(e) => TransportError::Http(e.to_string()),
            Error::Api { status, body } => TransportError::Status { status, body },
            Error::Service(api) => TransportError::Api(api),
            Error::Json(e) => TransportError::Decode(e.to_string()),
            Error::MissingData => TransportError::Decode("response carried no data".into()),
            Error::InvalidToken => TransportError::Http("invalid API token".into()),
        }
    }
}

/// Storage service API client.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
    /// `Authorization` value for service endpoints only; part URLs are
    /// pre-signed and must not carry it.
    auth: Option<HeaderValue>,
}

impl Client {
    /// Creates a client for the service at `base_url` (e.g. `http://storage:8080/v0`).
    pub fn new(base_url: &str, api_token: Option<&str>) -> Result<Self, Error> {
        let auth = match api_token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| Error::InvalidToken)?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: None,
            auth,
        })
    }

    /// Sends `user_id` with every plan request.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attaches the service credentials to `request`.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(value) => request.header(AUTHORIZATION, value.clone()),
            None => request,
        }
    }

    /// Endpoint of a file inside a location; the file id is percent-encoded
    /// as a single path segment.
    fn file_url(&self, location_id: u32, file_id: &str) -> String {
        let encoded = utf8_percent_encode(file_id, NON_ALPHANUMERIC);
        format!("{}/locations/{location_id}/files/{encoded}", self.base_url)
    }

    /// Asks for pre-signed part URLs covering `request.file_size` bytes.
    pub async fn fetch_upload_plan(&self, request: &PlanRequest) -> Result<UploadPlan, Error> {
        let url = self.file_url(request.target.location_id, &request.target.path);
        let mut params = vec![
            ("file_size", request.file_size.to_string()),
            ("link_type", request.link_type.as_str().to_string()),
        ];
        if let Some(user_id) = &self.user_id {
            params.push(("user_id", user_id.clone()));
        }
        if let Some(checksum) = &request.sha256_checksum {
            params.push(("sha256_checksum", checksum.clone()));
        }

        debug!(%url, file_size = request.file_size, "requesting upload links");
        let resp = self
            .authorized(self.http.put(&url))
            .query(&params)
            .send()
            .await?;
        let body = check_status(resp).await?;
        decode_data(&body)
    }

    /// Sends one byte range. Any answer is returned as a receipt; only a
    /// network failure is an error.
    pub async fn upload_part(&self, url: &str, body: Vec<u8>) -> Result<ChunkReceipt, Error> {
        let resp = self.http.put(url).body(body).send().await?;
        let status = resp.status().as_u16();
        let e_tag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok(ChunkReceipt { status, e_tag })
    }

    /// Submits the part list.
    ///
    /// `200` finalizes on the spot, `202` hands out a state link to poll.
    pub async fn complete_upload(
        &self,
        completion_link: &str,
        parts: &CompletionBody,
    ) -> Result<CompletionReply, Error> {
        let resp = self
            .authorized(self.http.post(completion_link))
            .json(parts)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        match status {
            StatusCode::OK => {
                let envelope: Envelope<serde_json::Value> = parse_or_empty(&body)?;
                Ok(match envelope.error {
                    Some(error) => CompletionReply::rejected(error),
                    None => CompletionReply::ok(),
                })
            }
            StatusCode::ACCEPTED => {
                let envelope: Envelope<CompletionAccepted> = serde_json::from_slice(&body)?;
                match envelope.into_result() {
                    Ok(accepted) => Ok(CompletionReply::accepted(accepted.links.state)),
                    Err(EnvelopeError::Api(error)) => Ok(CompletionReply::rejected(error)),
                    Err(EnvelopeError::Empty) => Err(Error::MissingData),
                }
            }
            other => match serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
                Ok(Envelope {
                    error: Some(error), ..
                }) => Ok(CompletionReply::rejected(error)),
                _ => Ok(CompletionReply {
                    status: CompletionStatus::Unrecognized(other.as_u16().to_string()),
                    state_link: None,
                    error: None,
                }),
            },
        }
    }

    /// Reads the state of a background completion.
    pub async fn completion_state(&self, state_link: &str) -> Result<PollStateResponse, Error> {
        let resp = self.authorized(self.http.post(state_link)).send().await?;
        let body = check_status(resp).await?;
        decode_data(&body)
    }

    /// Discards the multipart upload.
    pub async fn abort_upload(&self, abort_link: &str) -> Result<(), Error> {
        let resp = self.authorized(self.http.post(abort_link)).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

impl StorageTransport for Client {
    fn request_upload_plan<'a>(
        &'a self,
        request: &'a PlanRequest,
    ) -> TransportFuture<'a, UploadPlan> {
        Box::pin(async move { Ok(self.fetch_upload_plan(request).await?) })
    }

    fn put_chunk<'a>(&'a self, url: &'a str, body: Vec<u8>) -> TransportFuture<'a, ChunkReceipt> {
        Box::pin(async move { Ok(self.upload_part(url, body).await?) })
    }

    fn post_completion<'a>(
        &'a self,
        completion_link: &'a str,
        body: &'a CompletionBody,
    ) -> TransportFuture<'a, CompletionReply> {
        Box::pin(async move { Ok(self.complete_upload(completion_link, body).await?) })
    }

    fn post_poll_state<'a>(&'a self, state_link: &'a str) -> TransportFuture<'a, PollStateResponse> {
        Box::pin(async move { Ok(self.completion_state(state_link).await?) })
    }

    fn post_abort<'a>(&'a self, abort_link: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move { Ok(self.abort_upload(abort_link).await?) })
    }
}

/// Returns the body of a 2xx response; otherwise the envelope error if the
/// body carries one, or the raw status and body.
async fn check_status(resp: reqwest::Response) -> Result<Vec<u8>, Error> {
    let status = resp.status();
    let body = resp.bytes().await?.to_vec();
    if status.is_success() {
        return Ok(body);
    }

    if let Ok(Envelope {
        error: Some(error), ..
    }) = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
    {
        return Err(Error::Service(error));
    }
    Err(Error::Api {
        status: status.as_u16(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn decode_data<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    Ok(envelope.into_result()?)
}

fn parse_or_empty<T: DeserializeOwned>(body: &[u8]) -> Result<Envelope<T>, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Envelope {
            data: None,
            error: None,
        });
    }
    Ok(serde_json::from_slice(body)?)
}
