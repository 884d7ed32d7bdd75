//! Jobs: typed units of work decoded from queue messages.
//!
//! Every job variant is a struct implementing [`JobDefinition`] and a case of
//! the [`JobKind`] sum type. Variants are registered once at startup in a
//! [`JobRegistry`], which maps the wire job type to the variant's decoder:
//!
//! ```rust
//! use job_runner::jobs::{JobRegistry, RawMessage};
//!
//! let registry = JobRegistry::standard().expect("built-in job types are unique");
//! let message = RawMessage::new(10, br#"{"t": 666, "d": {"text": "hello"}}"#.to_vec());
//! let job = registry.decode(&message).expect("valid print job");
//! assert_eq!(job.priority(), 10);
//! ```

mod decode;
mod email;
mod execute;
mod print;
mod registry;

pub use decode::RawMessage;
pub use email::{EmailType, SendLocalizedEmailJob, UserId, TOKEN_TTL};
pub use execute::execute;
pub use print::PrintJob;
pub use registry::{JobDescriptor, JobRegistry, JobRegistryBuilder};

use crate::context::JobContext;
use crate::error::{DecodeError, JobError};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// Priority for background chores.
pub const PRIORITY_LOW: i64 = 1;
/// Default priority.
pub const PRIORITY_MEDIUM: i64 = 10;
/// Priority for user-facing work such as confirmation emails.
pub const PRIORITY_HIGH: i64 = 20;

/// Wire identifier of a job variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// Sentinel for definitions that never declared a type. Never dispatched.
    Unassigned,
    /// [`SendLocalizedEmailJob`].
    SendLocalizedEmail,
    /// [`PrintJob`].
    Print,
}

impl JobType {
    /// Numeric identifier carried in the `t` field of queue messages.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Unassigned => -1,
            Self::SendLocalizedEmail => 0,
            Self::Print => 666,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unassigned => "UNASSIGNED",
            Self::SendLocalizedEmail => "SEND_LOCALIZED_EMAIL",
            Self::Print => "PRINT",
        };
        f.write_str(name)
    }
}

/// A job variant that can be registered and decoded.
pub trait JobDefinition: Sized + Into<JobKind> {
    /// Wire type this variant is decoded from.
    const JOB_TYPE: JobType;

    /// Human-readable name used in logs and registry errors.
    const NAME: &'static str;

    /// Build the variant from the message's `d` mapping.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if a required field is missing
    /// or a field has the wrong type or value.
    fn from_data(data: Map<String, Value>) -> Result<Self, DecodeError>;
}

/// Payload of a decoded job, one case per variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Send a localized email carrying a single-use token.
    SendLocalizedEmail(SendLocalizedEmailJob),
    /// Print text to standard output.
    Print(PrintJob),
}

impl JobKind {
    /// Variant name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SendLocalizedEmail(_) => SendLocalizedEmailJob::NAME,
            Self::Print(_) => PrintJob::NAME,
        }
    }
}

impl From<SendLocalizedEmailJob> for JobKind {
    fn from(job: SendLocalizedEmailJob) -> Self {
        Self::SendLocalizedEmail(job)
    }
}

impl From<PrintJob> for JobKind {
    fn from(job: PrintJob) -> Self {
        Self::Print(job)
    }
}

/// A decoded job. Built from exactly one queue message and discarded after
/// one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    priority: i64,
    created_at: DateTime<Utc>,
    job_type: JobType,
    kind: JobKind,
}

impl Job {
    /// Create a job.
    #[must_use]
    pub const fn new(
        priority: i64,
        created_at: DateTime<Utc>,
        job_type: JobType,
        kind: JobKind,
    ) -> Self {
        Self {
            priority,
            created_at,
            job_type,
            kind,
        }
    }

    /// Priority copied from the queue message.
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    /// Creation time from the message, or receipt time if it had none.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Type the job was decoded as.
    #[must_use]
    pub const fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Variant payload.
    #[must_use]
    pub const fn kind(&self) -> &JobKind {
        &self.kind
    }

    /// Run the job against the shared services in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::DependencyFailure`] if the key-value store or the
    /// mail relay fails, and [`JobError::Template`] if an email cannot be
    /// rendered.
    pub async fn run(&self, ctx: &JobContext) -> Result<(), JobError> {
        match &self.kind {
            JobKind::SendLocalizedEmail(job) => job.run(ctx).await,
            JobKind::Print(job) => {
                job.run();
                Ok(())
            }
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} type={} priority={} created_at={}>",
            self.kind.name(),
            self.job_type,
            self.priority,
            self.created_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_type_ids() {
        assert_eq!(JobType::Unassigned.id(), -1);
        assert_eq!(JobType::SendLocalizedEmail.id(), 0);
        assert_eq!(JobType::Print.id(), 666);
    }

    #[test]
    fn test_job_display() {
        let created_at = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        let job = Job::new(
            PRIORITY_HIGH,
            created_at,
            JobType::Print,
            PrintJob::new("hi").into(),
        );
        assert_eq!(
            job.to_string(),
            "<PrintJob type=PRINT priority=20 created_at=2020-05-01T12:00:00+00:00>"
        );
    }
}
