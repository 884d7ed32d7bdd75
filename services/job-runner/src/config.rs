//! Configuration for the job runner.

use crate::cli::Verbosity;
use anyhow::{bail, Context};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use lettre::message::Mailbox;
use sentry::types::Dsn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Mail relay configuration.
    pub mail: MailConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Execution configuration.
    #[serde(default)]
    pub runner: ExecutionConfig,
    /// Links embedded in emails.
    #[serde(default)]
    pub links: LinksConfig,
    /// Error reporting.
    #[serde(default)]
    pub sentry: SentryConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `critical`, `error`, `warning`, `info`, or `debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Mail relay configuration.
#[derive(Clone, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host.
    pub server: String,
    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Sender mailbox.
    pub from: String,
    /// SMTP login.
    pub login: String,
    /// SMTP password.
    pub password: String,
    /// Use implicit TLS instead of STARTTLS.
    #[serde(default)]
    pub implicit_tls: bool,
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Sorted set holding pending jobs.
    #[serde(default = "default_queue_key")]
    pub key: String,
    /// Maximum messages fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long a poll waits for messages.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// List receiving messages whose job failed.
    #[serde(default)]
    pub dead_letter_key: Option<String>,
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-job deadline; 0 disables it.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    /// Pause after a failed poll.
    #[serde(default = "default_poll_error_backoff")]
    pub poll_error_backoff_ms: u64,
}

/// Links embedded in emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Base of email confirmation links; the token is appended as `?token=`.
    #[serde(default = "default_confirmation_url")]
    pub email_confirmation_url: String,
}

/// Sentry error reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Report errors to Sentry.
    #[serde(default)]
    pub enabled: bool,
    /// Project DSN; required when enabled.
    #[serde(default)]
    pub dsn: Option<String>,
}

impl SentryConfig {
    /// Parsed DSN, or `None` when reporting is disabled.
    ///
    /// # Errors
    ///
    /// Returns error if reporting is enabled and the DSN is missing or invalid.
    pub fn dsn(&self) -> anyhow::Result<Option<Dsn>> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(dsn) = self.dsn.as_deref() else {
            bail!("sentry.dsn is required when sentry.enabled is true");
        };
        let dsn = dsn.parse::<Dsn>().context("sentry.dsn: invalid DSN")?;
        Ok(Some(dsn))
    }
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("from", &self.from)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("implicit_tls", &self.implicit_tls)
            .finish()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key: default_queue_key(),
            batch_size: default_batch_size(),
            poll_timeout_seconds: default_poll_timeout(),
            dead_letter_key: None,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            job_timeout_seconds: default_job_timeout(),
            poll_error_backoff_ms: default_poll_error_backoff(),
        }
    }
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            email_confirmation_url: default_confirmation_url(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_queue_key() -> String {
    "queue:jobs".to_string()
}

const fn default_batch_size() -> usize {
    5
}

const fn default_poll_timeout() -> u64 {
    10
}

const fn default_job_timeout() -> u64 {
    60
}

const fn default_poll_error_backoff() -> u64 {
    1000
}

fn default_confirmation_url() -> String {
    "http://localhost:8080/confirm-email".to_string()
}

impl QueueConfig {
    /// Poll window as a [`Duration`].
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }
}

impl ExecutionConfig {
    /// Per-job deadline, if enabled.
    #[must_use]
    pub const fn job_timeout(&self) -> Option<Duration> {
        if self.job_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.job_timeout_seconds))
        }
    }

    /// Pause after a failed poll as a [`Duration`].
    #[must_use]
    pub const fn poll_error_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_error_backoff_ms)
    }
}

impl RunnerConfig {
    /// Load configuration from files and environment.
    ///
    /// Sources, later ones win: `config/default.toml`, `config/local.toml`,
    /// `extra` if given, then `JOB_RUNNER_*` environment variables with `__`
    /// separating sections.
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded, parsed, or validated.
    pub fn load(extra: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"));

        if let Some(path) = extra {
            if !path.exists() {
                bail!("config file {} is missing", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed("JOB_RUNNER_").split("__")))
    }

    /// Extract and validate configuration from a prepared [`Figment`].
    ///
    /// # Errors
    ///
    /// Returns error if required keys are missing or values are invalid.
    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        if Verbosity::from_name(&self.logging.level).is_none() {
            bail!("logging.level: unknown level '{}'", self.logging.level);
        }

        for (key, value) in [
            ("mail.server", &self.mail.server),
            ("mail.login", &self.mail.login),
            ("mail.password", &self.mail.password),
            ("redis.url", &self.redis.url),
            ("queue.key", &self.queue.key),
        ] {
            if value.trim().is_empty() {
                bail!("{key} must not be empty");
            }
        }

        self.mail
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("mail.from: invalid mailbox '{}'", self.mail.from))?;

        if self.queue.batch_size == 0 {
            bail!("queue.batch_size must be at least 1");
        }

        self.sentry.dsn()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [mail]
        server = "smtp.example.com"
        from = "ModBay <noreply@example.com>"
        login = "robot"
        password = "hunter2"
    "#;

    fn figment(toml: &str) -> Figment {
        Figment::new().merge(Toml::string(toml))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = RunnerConfig::from_figment(figment(MINIMAL)).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.mail.port, 587);
        assert!(!config.mail.implicit_tls);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379/0");
        assert_eq!(config.queue.key, "queue:jobs");
        assert_eq!(config.queue.batch_size, 5);
        assert_eq!(config.queue.poll_timeout(), Duration::from_secs(10));
        assert!(config.queue.dead_letter_key.is_none());
        assert_eq!(config.runner.job_timeout(), Some(Duration::from_secs(60)));
        assert!(!config.sentry.enabled);
        assert!(config.sentry.dsn().unwrap().is_none());
    }

    #[test]
    fn test_sentry_enabled_without_dsn_fails() {
        let toml = format!("{MINIMAL}\n[sentry]\nenabled = true");
        let err = RunnerConfig::from_figment(figment(&toml)).unwrap_err();
        assert!(err.to_string().contains("sentry.dsn"));
    }

    #[test]
    fn test_sentry_invalid_dsn_fails() {
        let toml = format!("{MINIMAL}\n[sentry]\nenabled = true\ndsn = \"not a dsn\"");
        assert!(RunnerConfig::from_figment(figment(&toml)).is_err());
    }

    #[test]
    fn test_sentry_dsn_parsed_when_enabled() {
        let toml = format!(
            "{MINIMAL}\n[sentry]\nenabled = true\ndsn = \"https://public@sentry.example.com/42\""
        );
        let config = RunnerConfig::from_figment(figment(&toml)).unwrap();
        let dsn = config.sentry.dsn().unwrap().unwrap();
        assert_eq!(dsn.host(), "sentry.example.com");
    }

    #[test]
    fn test_sentry_dsn_ignored_when_disabled() {
        let toml = format!("{MINIMAL}\n[sentry]\ndsn = \"not a dsn\"");
        let config = RunnerConfig::from_figment(figment(&toml)).unwrap();
        assert!(config.sentry.dsn().unwrap().is_none());
    }

    #[test]
    fn test_missing_mail_section_fails() {
        assert!(RunnerConfig::from_figment(figment("[logging]\nlevel = \"debug\"")).is_err());
    }

    #[test]
    fn test_invalid_from_fails() {
        let toml = MINIMAL.replace("ModBay <noreply@example.com>", "not an address");
        let err = RunnerConfig::from_figment(figment(&toml)).unwrap_err();
        assert!(err.to_string().contains("mail.from"));
    }

    #[test]
    fn test_empty_password_fails() {
        let toml = MINIMAL.replace("hunter2", "");
        let err = RunnerConfig::from_figment(figment(&toml)).unwrap_err();
        assert!(err.to_string().contains("mail.password"));
    }

    #[test]
    fn test_unknown_log_level_fails() {
        let toml = format!("{MINIMAL}\n[logging]\nlevel = \"verbose\"");
        assert!(RunnerConfig::from_figment(figment(&toml)).is_err());
    }

    #[test]
    fn test_zero_batch_size_fails() {
        let toml = format!("{MINIMAL}\n[queue]\nbatch_size = 0");
        assert!(RunnerConfig::from_figment(figment(&toml)).is_err());
    }

    #[test]
    fn test_zero_job_timeout_disables_deadline() {
        let config = ExecutionConfig {
            job_timeout_seconds: 0,
            ..ExecutionConfig::default()
        };
        assert_eq!(config.job_timeout(), None);
    }

    #[test]
    fn test_password_is_redacted() {
        let config = RunnerConfig::from_figment(figment(MINIMAL)).unwrap();
        let debug = format!("{:?}", config.mail);
        assert!(!debug.contains("hunter2"));
    }
}
