use serde::{Deserialize, Serialize};

/// One entry of the error list returned by the storage service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorItem {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Error details in a storage service response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ApiError {
    /// Collapses the top-level message and the error list into one line.
    pub fn summary(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.message.is_empty() {
            parts.push(&self.message);
        }
        parts.extend(self.errors.iter().map(|e| e.message.as_str()));
        if parts.is_empty() {
            "unspecified error".into()
        } else {
            parts.join("; ")
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Why an envelope could not be turned into its payload.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("service error: {0}")]
    Api(ApiError),

    #[error("response carried neither data nor error")]
    Empty,
}

/// Envelope wrapping every JSON response of the storage service.
///
/// Exactly one of `data` and `error` is expected to be set; `error` wins when
/// both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> Envelope<T> {
    /// Wraps a successful payload.
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Wraps an error.
    pub fn error(error: ApiError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// Returns the payload, or the service error if one is present.
    pub fn into_result(self) -> Result<T, EnvelopeError> {
        if let Some(error) = self.error {
            return Err(EnvelopeError::Api(error));
        }
        self.data.ok_or(EnvelopeError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn data_envelope_into_result() {
        let env: Envelope<Payload> = serde_json::from_str(r#"{"data": {"value": 7}}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), Payload { value: 7 });
    }

    #[test]
    fn error_wins_over_data() {
        let json = r#"{"data": {"value": 7}, "error": {"message": "denied"}}"#;
        let env: Envelope<Payload> = serde_json::from_str(json).unwrap();
        match env.into_result() {
            Err(EnvelopeError::Api(e)) => assert_eq!(e.message, "denied"),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn null_data_without_error_is_empty() {
        let env: Envelope<Payload> = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert!(matches!(env.into_result(), Err(EnvelopeError::Empty)));
    }

    #[test]
    fn error_summary_joins_messages() {
        let err = ApiError {
            message: "upload rejected".into(),
            errors: vec![ErrorItem {
                message: "quota exceeded".into(),
                code: None,
            }],
            status: Some(403),
        };
        assert_eq!(err.summary(), "upload rejected; quota exceeded");
        assert_eq!(err.to_string(), "upload rejected; quota exceeded");
    }

    #[test]
    fn error_summary_without_messages() {
        let err = ApiError {
            message: String::new(),
            errors: vec![],
            status: None,
        };
        assert_eq!(err.summary(), "unspecified error");
    }

    #[test]
    fn serialized_data_envelope_omits_error() {
        let json = serde_json::to_string(&Envelope::data(Payload { value: 1 })).unwrap();
        assert!(!json.contains("error"));
    }
}
