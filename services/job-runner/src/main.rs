//! Job runner entry point.

use clap::Parser;
use job_runner::cli::{Cli, Verbosity};
use job_runner::config::SentryConfig;
use job_runner::services::{RedisPriorityQueue, RedisStore, SmtpMailer};
use job_runner::templates::EmailTemplates;
use job_runner::{JobContext, JobRegistry, JobRunner, RunnerConfig, RunnerSettings};
use redis::Client;
use sentry::ClientInitGuard;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: Level) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
}

/// Start Sentry reporting if enabled. The guard flushes pending events on drop.
fn init_sentry(config: &SentryConfig) -> anyhow::Result<Option<ClientInitGuard>> {
    let Some(dsn) = config.dsn()? else {
        info!("Skipping sentry initialization");
        return Ok(None);
    };

    info!(host = dsn.host(), "Initializing sentry");
    Ok(Some(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        send_default_pii: true,
        ..Default::default()
    })))
}

/// Resolve once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match RunnerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(cli.verbosity.map_or(Level::INFO, Verbosity::level));
            error!("Invalid configuration: {e:#}");
            return Err(e);
        }
    };

    // Initialize tracing
    let level = cli
        .verbosity
        .or_else(|| Verbosity::from_name(&config.logging.level))
        .map_or(Level::INFO, Verbosity::level);
    init_tracing(level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = %std::env::var("GIT_COMMIT").unwrap_or_else(|_| "UNSET".to_string()),
        "Starting job runner"
    );

    let _sentry = init_sentry(&config.sentry)?;

    let registry = JobRegistry::standard()?;
    let templates = EmailTemplates::new()?;

    // Connect to Redis
    let client = Client::open(config.redis.url.as_str())?;
    let conn = client.get_connection_manager().await?;
    info!("Connected to Redis");

    let mailer = SmtpMailer::new(&config.mail)?;

    let mut queue = RedisPriorityQueue::new(conn.clone(), config.queue.key.clone());
    if let Some(ref key) = config.queue.dead_letter_key {
        queue = queue.with_dead_letter(key.clone());
    }

    let context = JobContext::new(
        Arc::new(RedisStore::new(conn)),
        Arc::new(mailer),
        Arc::new(templates),
        config.mail.from.clone(),
        config.links.email_confirmation_url.clone(),
    );

    let runner = JobRunner::new(queue, registry, context, RunnerSettings::from(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, finishing current batch");
        shutdown_tx.send_replace(true);
    });

    info!(queue = %config.queue.key, "Consuming queue");
    runner.run(shutdown_rx).await;

    Ok(())
}
