//! SMTP mail relay client.

use crate::config::MailConfig;
use crate::error::MailError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

/// A plain-text email ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Sender mailbox, e.g. `ModBay <noreply@modbay.net>`.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Delivers emails through a mail relay.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email.
    ///
    /// # Errors
    ///
    /// Returns error if the message is invalid or the relay rejects it.
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// [`Mailer`] talking to an authenticated, TLS-protected SMTP relay.
///
/// The transport is built once and shared by every job. Each call to
/// [`Mailer::send`] opens (or reuses) a session, authenticates, sends, and
/// releases it even when sending fails.
pub struct SmtpMailer {
    /// SMTP transport.
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build a mailer from mail configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay host cannot be resolved into a TLS transport.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let relay = if config.implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
        };
        let builder = relay.map_err(|e| MailError::Transport(e.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.login.clone(),
                config.password.clone(),
            ))
            .build();

        info!(
            server = %config.server,
            port = config.port,
            implicit_tls = config.implicit_tls,
            "Created SMTP transport"
        );

        Ok(Self { transport })
    }

    fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
        address.parse().map_err(|e: lettre::address::AddressError| {
            MailError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn build_message(email: OutgoingEmail) -> Result<Message, MailError> {
        Message::builder()
            .from(Self::parse_mailbox(&email.from)?)
            .to(Self::parse_mailbox(&email.to)?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let to = email.to.clone();
        let message = Self::build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(error = %e, to = %to, "Failed to send email");
            MailError::Transport(e.to_string())
        })?;

        if !response.is_positive() {
            return Err(MailError::Transport(
                "relay did not accept the message".to_string(),
            ));
        }

        debug!(to = %to, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(from: &str, to: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Subject".to_string(),
            body: "Body".to_string(),
        }
    }

    fn mail_config(implicit_tls: bool) -> MailConfig {
        MailConfig {
            server: "smtp.example.com".to_string(),
            port: if implicit_tls { 465 } else { 587 },
            from: "noreply@example.com".to_string(),
            login: "robot".to_string(),
            password: "secret".to_string(),
            implicit_tls,
        }
    }

    #[tokio::test]
    async fn test_new_builds_starttls_and_implicit_tls() {
        assert!(SmtpMailer::new(&mail_config(false)).is_ok());
        assert!(SmtpMailer::new(&mail_config(true)).is_ok());
    }

    #[test]
    fn test_build_message_valid() {
        let message =
            SmtpMailer::build_message(email("ModBay <noreply@modbay.net>", "user@example.com"));
        assert!(message.is_ok());
    }

    #[test]
    fn test_build_message_invalid_recipient() {
        let err = SmtpMailer::build_message(email("noreply@modbay.net", "not-an-address"))
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { ref address, .. } if address == "not-an-address"));
    }
}
