use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs of the upload engine.
///
/// Durations are written as (fractional) seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Part-upload workers; `1` uploads parts one after another.
    pub concurrency: usize,
    /// Limit applied to every request.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Wait between two completion polls.
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    /// Give up after this many pending polls. `None` polls until the
    /// backend answers or the upload is aborted.
    pub max_poll_attempts: Option<u32>,
    /// Multiplier applied to the poll wait after each pending poll.
    pub poll_backoff_factor: f64,
    /// Cap on the backed-off poll wait.
    #[serde(with = "secs")]
    pub max_poll_interval: Duration,
    /// Send the SHA-256 of the whole file with the plan request.
    pub compute_checksum: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: None,
            poll_backoff_factor: 1.0,
            max_poll_interval: Duration::from_secs(30),
            compute_checksum: true,
        }
    }
}

impl UploadSettings {
    /// Number of workers actually started for `parts` parts.
    pub fn workers_for(&self, parts: usize) -> usize {
        self.concurrency.clamp(1, parts.max(1))
    }

    /// Wait after the `attempt`-th (1-based) pending poll.
    pub fn poll_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.poll_backoff_factor.max(1.0);
        let secs = self.poll_interval.as_secs_f64() * factor.powi(exp);
        let cap = self.max_poll_interval.max(self.poll_interval);
        Duration::from_secs_f64(secs.min(cap.as_secs_f64()))
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
