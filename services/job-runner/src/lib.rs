//! Generic job runner.
//!
//! Consumes prioritized messages from a Redis queue, decodes them into typed
//! jobs, and executes them one at a time against a key-value store and an SMTP
//! relay. A bad message or a failing job never stops the loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod runner;
pub mod services;
pub mod templates;

pub use config::RunnerConfig;
pub use context::JobContext;
pub use error::{DecodeError, JobError, RegistryError};
pub use jobs::{Job, JobKind, JobRegistry, JobType, RawMessage};
pub use runner::{BatchReport, JobRunner, MessageOutcome, RunnerSettings};
