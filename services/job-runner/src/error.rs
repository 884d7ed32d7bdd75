//! Error types for decoding and running jobs.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A queue message could not be turned into a job.
///
/// Both variants are recoverable: the runner logs the message and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The message lacks required structure or fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The message declares a job type with no registered handler.
    ///
    /// Wide enough for any JSON integer, registered or not.
    #[error("unknown job type: {0}")]
    UnknownJobType(i128),
}

impl DecodeError {
    /// Build a [`DecodeError::MalformedPayload`] from any displayable reason.
    pub fn malformed(reason: impl fmt::Display) -> Self {
        Self::MalformedPayload(reason.to_string())
    }
}

/// External service a job depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Key-value store holding single-use tokens.
    KeyValueStore,
    /// SMTP relay.
    MailRelay,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyValueStore => write!(f, "key-value store"),
            Self::MailRelay => write!(f, "mail relay"),
        }
    }
}

/// A decoded job failed to complete.
#[derive(Debug, Error)]
pub enum JobError {
    /// An external dependency was unreachable or rejected the request.
    #[error("{dependency} failure: {message}")]
    DependencyFailure {
        /// Which dependency failed.
        dependency: Dependency,
        /// Error reported by the dependency client.
        message: String,
    },
    /// An email template failed to render.
    #[error("failed to render email template: {0}")]
    Template(String),
    /// The job did not complete within the configured deadline.
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
}

/// Registry initialization failed. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A job definition did not declare a job type.
    #[error("{name}: does not declare a job type")]
    UnassignedJobType {
        /// Name of the offending definition.
        name: &'static str,
    },
    /// Two job definitions declared the same job type.
    #[error("duplicated job type {job_type} in {name} (already registered by {existing})")]
    DuplicateJobType {
        /// The contested job type identifier.
        job_type: i64,
        /// Definition that tried to register.
        name: &'static str,
        /// Definition registered first.
        existing: &'static str,
    },
}

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis returned an error or the connection dropped.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// Store is unavailable for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Mail relay errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// A sender or recipient address could not be parsed.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Parser error.
        reason: String,
    },
    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),
    /// Connecting, authenticating, or sending failed.
    #[error("smtp error: {0}")]
    Transport(String),
}

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis returned an error or the connection dropped.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// A dead-letter record could not be serialized.
    #[error("failed to serialize dead-letter record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Broker is unavailable for another reason.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        Self::DependencyFailure {
            dependency: Dependency::KeyValueStore,
            message: err.to_string(),
        }
    }
}

impl From<MailError> for JobError {
    fn from(err: MailError) -> Self {
        Self::DependencyFailure {
            dependency: Dependency::MailRelay,
            message: err.to_string(),
        }
    }
}

impl From<minijinja::Error> for JobError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}
