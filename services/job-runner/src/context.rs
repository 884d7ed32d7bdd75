//! Shared services handed to every job.

use crate::services::{KeyValueStore, Mailer};
use crate::templates::EmailTemplates;
use std::fmt;
use std::sync::Arc;

/// Execution context: connections and settings shared by all jobs.
///
/// Jobs run one at a time, so the handles are shared without extra locking.
#[derive(Clone)]
pub struct JobContext {
    store: Arc<dyn KeyValueStore>,
    mailer: Arc<dyn Mailer>,
    templates: Arc<EmailTemplates>,
    sender: String,
    confirmation_url: String,
}

impl JobContext {
    /// Create a context.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        mailer: Arc<dyn Mailer>,
        templates: Arc<EmailTemplates>,
        sender: impl Into<String>,
        confirmation_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            templates,
            sender: sender.into(),
            confirmation_url: confirmation_url.into(),
        }
    }

    /// Token store.
    #[must_use]
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Mail relay.
    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    /// Email templates.
    #[must_use]
    pub fn templates(&self) -> &EmailTemplates {
        &self.templates
    }

    /// Sender mailbox for outgoing emails.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Base of email confirmation links.
    #[must_use]
    pub fn confirmation_url(&self) -> &str {
        &self.confirmation_url
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("store", &"<KeyValueStore>")
            .field("mailer", &"<Mailer>")
            .field("sender", &self.sender)
            .field("confirmation_url", &self.confirmation_url)
            .finish_non_exhaustive()
    }
}
