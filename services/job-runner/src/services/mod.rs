//! Adapters for the external services jobs run against.

pub mod mailer;
pub mod queue;
pub mod store;

pub use mailer::{Mailer, OutgoingEmail, SmtpMailer};
pub use queue::{JobQueue, RedisPriorityQueue};
pub use store::{KeyValueStore, RedisStore};
