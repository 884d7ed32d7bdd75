//! Command-line flags.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

/// Generic job runner.
#[derive(Debug, Parser)]
#[command(name = "job-runner", version, about)]
pub struct Cli {
    /// Verbosity level, overrides `logging.level`. WARNING: debug level may expose credentials.
    #[arg(short, long, value_enum)]
    pub verbosity: Option<Verbosity>,

    /// Extra configuration file merged over `config/default.toml` and `config/local.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    /// Only unrecoverable errors.
    Critical,
    /// Errors.
    Error,
    /// Warnings and errors.
    Warning,
    /// Normal operation.
    Info,
    /// Everything.
    Debug,
}

impl Verbosity {
    /// Parse a `logging.level` value.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_str(name, true).ok()
    }

    /// Corresponding tracing level. `critical` maps to `ERROR`.
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::Critical | Self::Error => Level::ERROR,
            Self::Warning => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["job-runner", "-v", "debug", "--config", "prod.toml"]).unwrap();
        assert_eq!(cli.verbosity, Some(Verbosity::Debug));
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["job-runner"]).unwrap();
        assert!(cli.verbosity.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["job-runner", "-v", "trace"]).is_err());
    }

    #[test]
    fn test_level_names() {
        assert_eq!(Verbosity::from_name("WARNING"), Some(Verbosity::Warning));
        assert_eq!(Verbosity::from_name("critical").map(Verbosity::level), Some(Level::ERROR));
        assert_eq!(Verbosity::from_name("verbose"), None);
    }
}
