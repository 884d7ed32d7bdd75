//! Poll-execute loop.
//!
//! The runner alternates between two states:
//!
//! - **Polling**: wait on the queue for up to `poll_timeout` for up to
//!   `batch_size` messages.
//! - **Executing**: decode and run each message of the batch one at a time,
//!   in the order the queue returned them.
//!
//! A message that cannot be decoded is skipped; a job that fails is logged and,
//! if the queue supports it, dead-lettered. Neither stops the loop. Only the
//! shutdown signal does. It is checked between polls and never interrupts one,
//! so messages already taken off the queue are always executed; stopping can
//! therefore take up to `poll_timeout`.

use crate::config::RunnerConfig;
use crate::context::JobContext;
use crate::error::{DecodeError, JobError};
use crate::jobs::{self, JobRegistry, RawMessage};
use crate::services::JobQueue;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Maximum messages fetched per poll.
    pub batch_size: usize,
    /// How long a poll waits for messages.
    pub poll_timeout: Duration,
    /// Per-job deadline.
    pub job_timeout: Option<Duration>,
    /// Pause after a failed poll.
    pub poll_error_backoff: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_timeout: Duration::from_secs(10),
            job_timeout: Some(Duration::from_secs(60)),
            poll_error_backoff: Duration::from_secs(1),
        }
    }
}

impl From<&RunnerConfig> for RunnerSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            batch_size: config.queue.batch_size,
            poll_timeout: config.queue.poll_timeout(),
            job_timeout: config.runner.job_timeout(),
            poll_error_backoff: config.runner.poll_error_backoff(),
        }
    }
}

/// What happened to one message.
#[derive(Debug)]
pub enum MessageOutcome {
    /// The job ran to completion.
    Completed,
    /// The message was not a valid job and was skipped.
    Skipped(DecodeError),
    /// The job ran and failed.
    Failed(JobError),
}

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Jobs that completed.
    pub completed: usize,
    /// Messages skipped as malformed or of unknown type.
    pub skipped: usize,
    /// Jobs that failed.
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Completed => self.completed += 1,
            MessageOutcome::Skipped(_) => self.skipped += 1,
            MessageOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Messages processed in the batch.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

/// Consumes a [`JobQueue`] and executes the jobs it delivers.
pub struct JobRunner<Q> {
    queue: Q,
    registry: JobRegistry,
    context: JobContext,
    settings: RunnerSettings,
}

impl<Q: JobQueue> JobRunner<Q> {
    /// Create a runner.
    #[must_use]
    pub const fn new(
        queue: Q,
        registry: JobRegistry,
        context: JobContext,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            queue,
            registry,
            context,
            settings,
        }
    }

    /// Poll and execute until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.settings.batch_size,
            poll_timeout = ?self.settings.poll_timeout,
            job_timeout = ?self.settings.job_timeout,
            "Job runner started"
        );

        while !*shutdown.borrow() {
            // Not raced against shutdown: a poll dropped after the pop loses messages.
            let polled = self
                .queue
                .poll(self.settings.batch_size, self.settings.poll_timeout)
                .await;

            match polled {
                Ok(batch) if batch.is_empty() => debug!("No messages"),
                Ok(batch) => {
                    let report = self.process_batch(batch).await;
                    debug!(
                        completed = report.completed,
                        skipped = report.skipped,
                        failed = report.failed,
                        "Batch processed"
                    );
                }
                Err(e) => {
                    error!(error = %e, backoff = ?self.settings.poll_error_backoff, "Failed to poll queue");
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        () = tokio::time::sleep(self.settings.poll_error_backoff) => {}
                    }
                }
            }
        }

        info!("Job runner stopped");
    }

    /// Execute a batch in order.
    ///
    /// Messages have already left the queue, so the batch is always finished,
    /// even when shutdown is requested meanwhile.
    pub async fn process_batch(&self, batch: Vec<RawMessage>) -> BatchReport {
        let mut report = BatchReport::default();
        for message in batch {
            let outcome = self.process_message(&message).await;
            report.record(&outcome);
        }
        report
    }

    /// Decode and execute one message, logging any failure.
    pub async fn process_message(&self, message: &RawMessage) -> MessageOutcome {
        let job = match self.registry.decode(message) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    error = %e,
                    priority = message.priority(),
                    payload = %message.preview(),
                    "Skipping message"
                );
                return MessageOutcome::Skipped(e);
            }
        };

        debug!(job = %job, "Running job");
        let started = Instant::now();

        match jobs::execute(&job, &self.context, self.settings.job_timeout).await {
            Ok(()) => {
                info!(
                    job_type = %job.job_type(),
                    priority = job.priority(),
                    elapsed = ?started.elapsed(),
                    "Job completed"
                );
                MessageOutcome::Completed
            }
            Err(e) => {
                error!(
                    error = %e,
                    job_type = %job.job_type(),
                    priority = job.priority(),
                    payload = %message.preview(),
                    "Job failed"
                );
                if let Err(dl) = self.queue.dead_letter(message, &e.to_string()).await {
                    error!(error = %dl, "Failed to dead-letter message");
                }
                MessageOutcome::Failed(e)
            }
        }
    }
}
