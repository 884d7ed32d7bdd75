//! Uniform job invocation.
//!
//! Every variant's `run` is awaited the same way, whether it suspends on I/O
//! (emails) or completes immediately (printing). The optional deadline turns
//! a hung dependency into [`JobError::Timeout`] instead of a stalled runner.

use super::Job;
use crate::context::JobContext;
use crate::error::JobError;
use std::time::Duration;

/// Run `job` to completion, or until `timeout` elapses.
///
/// # Errors
///
/// Returns the job's own error, or [`JobError::Timeout`] if the deadline passed.
pub async fn execute(
    job: &Job,
    ctx: &JobContext,
    timeout: Option<Duration>,
) -> Result<(), JobError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, job.run(ctx))
            .await
            .map_err(|_| JobError::Timeout(limit))?,
        None => job.run(ctx).await,
    }
}
