//! Localized emails carrying a single-use token.

use super::{JobDefinition, JobType};
use crate::context::JobContext;
use crate::error::{DecodeError, JobError};
use crate::services::OutgoingEmail;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// How long confirmation links and single-use passwords stay valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Kind of email to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum EmailType {
    /// Link confirming ownership of an email address.
    EmailConfirmation,
    /// One-time password for passwordless login.
    SingleUsePassword,
}

impl EmailType {
    /// Bytes of entropy in the generated token.
    #[must_use]
    pub const fn token_bytes(self) -> usize {
        match self {
            Self::EmailConfirmation => 20,
            Self::SingleUsePassword => 15,
        }
    }

    /// Prefix of the key the token is stored under.
    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::EmailConfirmation => "confirmation",
            Self::SingleUsePassword => "single_use_password",
        }
    }

    /// Template set used to render this email.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::EmailConfirmation => "email_confirmation",
            Self::SingleUsePassword => "single_use_password",
        }
    }
}

impl TryFrom<i64> for EmailType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::EmailConfirmation),
            1 => Ok(Self::SingleUsePassword),
            other => Err(format!("unknown email type {other}")),
        }
    }
}

/// Opaque user identifier, stored verbatim next to the token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    /// Numeric identifier.
    Int(i64),
    /// Textual identifier.
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// Generates a single-use token, stores it, and mails it to the user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendLocalizedEmailJob {
    email_type: EmailType,
    to: String,
    user_id: UserId,
    language: String,
}

impl SendLocalizedEmailJob {
    /// Create a job.
    #[must_use]
    pub fn new(
        email_type: EmailType,
        to: impl Into<String>,
        user_id: UserId,
        language: impl Into<String>,
    ) -> Self {
        Self {
            email_type,
            to: to.into(),
            user_id,
            language: language.into(),
        }
    }

    /// Kind of email.
    #[must_use]
    pub const fn email_type(&self) -> EmailType {
        self.email_type
    }

    /// Recipient address.
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    /// User the token belongs to.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Language tag of the recipient.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Store a fresh token and send the email embedding it.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::DependencyFailure`] if the store write or the send
    /// fails. Nothing is retried here.
    pub async fn run(&self, ctx: &JobContext) -> Result<(), JobError> {
        let token = generate_token(self.email_type.token_bytes());
        let key = format!("{}:{token}", self.email_type.key_prefix());

        ctx.store()
            .set_with_expiry(&key, &self.user_id.to_string(), TOKEN_TTL)
            .await?;
        debug!(key_prefix = self.email_type.key_prefix(), "Stored token");

        let secret = match self.email_type {
            EmailType::EmailConfirmation => confirmation_url(ctx.confirmation_url(), &token),
            EmailType::SingleUsePassword => token,
        };
        let rendered = ctx
            .templates()
            .render(self.email_type, &self.language, &secret)?;

        ctx.mailer()
            .send(OutgoingEmail {
                from: ctx.sender().to_string(),
                to: self.to.clone(),
                subject: rendered.subject,
                body: rendered.body,
            })
            .await?;

        Ok(())
    }
}

impl JobDefinition for SendLocalizedEmailJob {
    const JOB_TYPE: JobType = JobType::SendLocalizedEmail;
    const NAME: &'static str = "SendLocalizedEmailJob";

    fn from_data(data: Map<String, Value>) -> Result<Self, DecodeError> {
        let job: Self = serde_json::from_value(Value::Object(data))
            .map_err(|e| DecodeError::malformed(format!("{}: {e}", Self::NAME)))?;

        job.to
            .parse::<lettre::Address>()
            .map_err(|e| DecodeError::malformed(format!("to: {e}")))?;

        Ok(job)
    }
}

/// URL-safe random token with `bytes` bytes of entropy.
fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill(&mut buf[..]);
    URL_SAFE_NO_PAD.encode(&buf)
}

fn confirmation_url(base: &str, token: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mailer::MockMailer;
    use crate::services::store::MockKeyValueStore;
    use crate::templates::EmailTemplates;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const CONFIRM_URL: &str = "https://modbay.net/confirm-email";

    type Writes = Arc<Mutex<Vec<(String, String, Duration)>>>;
    type Sent = Arc<Mutex<Vec<OutgoingEmail>>>;

    fn recording_store() -> (MockKeyValueStore, Writes) {
        let writes: Writes = Arc::default();
        let captured = Arc::clone(&writes);
        let mut store = MockKeyValueStore::new();
        store
            .expect_set_with_expiry()
            .times(1)
            .returning(move |key, value, ttl| {
                captured
                    .lock()
                    .unwrap()
                    .push((key.to_string(), value.to_string(), ttl));
                Ok(())
            });
        (store, writes)
    }

    fn recording_mailer() -> (MockMailer, Sent) {
        let sent: Sent = Arc::default();
        let captured = Arc::clone(&sent);
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(1).returning(move |email| {
            captured.lock().unwrap().push(email);
            Ok(())
        });
        (mailer, sent)
    }

    fn context(store: MockKeyValueStore, mailer: MockMailer) -> JobContext {
        JobContext::new(
            Arc::new(store),
            Arc::new(mailer),
            Arc::new(EmailTemplates::new().unwrap()),
            "ModBay <noreply@modbay.net>",
            CONFIRM_URL,
        )
    }

    #[tokio::test]
    async fn test_email_confirmation() {
        let (store, writes) = recording_store();
        let (mailer, sent) = recording_mailer();
        let ctx = context(store, mailer);

        let job = SendLocalizedEmailJob::new(
            EmailType::EmailConfirmation,
            "user@example.com",
            UserId::Int(42),
            "en",
        );
        job.run(&ctx).await.unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (key, value, ttl) = &writes[0];
        let token = key.strip_prefix("confirmation:").unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(token).unwrap().len(), 20);
        assert_eq!(value, "42");
        assert_eq!(*ttl, Duration::from_secs(432_000));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user@example.com");
        assert_eq!(sent[0].from, "ModBay <noreply@modbay.net>");
        assert!(sent[0]
            .body
            .contains(&format!("{CONFIRM_URL}?token={token}")));
    }

    #[tokio::test]
    async fn test_single_use_password() {
        let (store, writes) = recording_store();
        let (mailer, sent) = recording_mailer();
        let ctx = context(store, mailer);

        let job = SendLocalizedEmailJob::new(
            EmailType::SingleUsePassword,
            "user@example.com",
            UserId::Text("u-17".into()),
            "ru-RU",
        );
        job.run(&ctx).await.unwrap();

        let writes = writes.lock().unwrap();
        let (key, value, ttl) = &writes[0];
        let token = key.strip_prefix("single_use_password:").unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(token).unwrap().len(), 15);
        assert_eq!(value, "u-17");
        assert_eq!(*ttl, TOKEN_TTL);

        let sent = sent.lock().unwrap();
        assert!(sent[0].body.contains(token));
        assert!(!sent[0].body.contains(CONFIRM_URL));
        assert!(!sent[0].body.contains("token="));
    }

    #[tokio::test]
    async fn test_store_failure_skips_send() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set_with_expiry()
            .times(1)
            .returning(|_, _, _| Err(crate::error::StoreError::Unavailable("down".into())));
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();
        let ctx = context(store, mailer);

        let job = SendLocalizedEmailJob::new(
            EmailType::EmailConfirmation,
            "user@example.com",
            UserId::Int(1),
            "en",
        );
        let err = job.run(&ctx).await.unwrap_err();
        assert!(matches!(err, JobError::DependencyFailure { .. }));
    }

    #[tokio::test]
    async fn test_send_failure_is_dependency_failure() {
        let (store, _) = recording_store();
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .times(1)
            .returning(|_| Err(crate::error::MailError::Transport("535 bad credentials".into())));
        let ctx = context(store, mailer);

        let job = SendLocalizedEmailJob::new(
            EmailType::SingleUsePassword,
            "user@example.com",
            UserId::Int(1),
            "en",
        );
        let err = job.run(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::DependencyFailure {
                dependency: crate::error::Dependency::MailRelay,
                ..
            }
        ));
    }

    #[test]
    fn test_from_data_rejects_bad_recipient() {
        let data = json!({
            "email_type": 0,
            "to": "nobody",
            "user_id": 1,
            "language": "en"
        });
        let Value::Object(data) = data else {
            unreachable!()
        };
        assert!(SendLocalizedEmailJob::from_data(data).is_err());
    }

    #[test]
    fn test_generate_token_lengths() {
        assert_eq!(generate_token(20).len(), 27);
        assert_eq!(generate_token(15).len(), 20);
        assert_ne!(generate_token(20), generate_token(20));
    }

    #[test]
    fn test_confirmation_url_separator() {
        assert_eq!(confirmation_url("https://a.b/c", "t"), "https://a.b/c?token=t");
        assert_eq!(
            confirmation_url("https://a.b/c?lang=en", "t"),
            "https://a.b/c?lang=en&token=t"
        );
    }
}
