//! Turning raw queue messages into jobs.

use super::{Job, JobRegistry};
use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

/// Characters of payload kept in log previews.
const PREVIEW_CHARS: usize = 256;

/// A message as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    priority: i64,
    body: Vec<u8>,
}

impl RawMessage {
    /// Wrap a queue entry.
    #[must_use]
    pub const fn new(priority: i64, body: Vec<u8>) -> Self {
        Self { priority, body }
    }

    /// Priority assigned by the producer. Higher is more urgent.
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    /// Encoded payload.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Payload truncated for logging.
    #[must_use]
    pub fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        if text.chars().count() <= PREVIEW_CHARS {
            return text.into_owned();
        }
        let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
        preview.push('…');
        preview
    }
}

/// Payload structure shared by all job types.
#[derive(Debug, Deserialize)]
struct Envelope {
    /// Job type. Any JSON number; only integers can name a job.
    t: Option<Number>,
    /// Creation time, seconds since the epoch.
    c: Option<f64>,
    /// Job-specific fields.
    d: Option<Map<String, Value>>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn timestamp(seconds: f64) -> Result<DateTime<Utc>, DecodeError> {
    if !seconds.is_finite() {
        return Err(DecodeError::malformed("c: timestamp is not finite"));
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| DecodeError::malformed(format!("c: timestamp {seconds} out of range")))
}

impl JobRegistry {
    /// Decode a queue message into a job.
    ///
    /// Either the whole job is built or an error is returned; there are no
    /// partially populated jobs.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::MalformedPayload`] if the payload is not an object,
    ///   `t` or `d` is missing, or `d` does not fit the variant.
    /// - [`DecodeError::UnknownJobType`] if `t` is not registered.
    pub fn decode(&self, message: &RawMessage) -> Result<Job, DecodeError> {
        let envelope: Envelope =
            serde_json::from_slice(message.body()).map_err(DecodeError::malformed)?;

        let t = envelope
            .t
            .ok_or_else(|| DecodeError::malformed("t: missing job type"))?;

        let descriptor = match (t.as_i64(), t.as_u64()) {
            (Some(job_type), _) => self
                .lookup(job_type)
                .ok_or(DecodeError::UnknownJobType(job_type.into()))?,
            (None, Some(job_type)) => return Err(DecodeError::UnknownJobType(job_type.into())),
            (None, None) => {
                return Err(DecodeError::malformed(format!("t: {t} is not an integer")));
            }
        };

        let created_at = envelope.c.map_or_else(|| Ok(Utc::now()), timestamp)?;

        let data = envelope
            .d
            .ok_or_else(|| DecodeError::malformed("d: missing job data"))?;

        let kind = descriptor.decode(data)?;

        Ok(Job::new(
            message.priority(),
            created_at,
            descriptor.job_type(),
            kind,
        ))
    }
}
