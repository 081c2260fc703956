//! Logging for parley-bot: one `tracing` subscriber writing to stderr.
//!
//! The level comes from three places, highest first:
//!
//! 1. `-v` flags on the command line
//! 2. `RUST_LOG`
//! 3. `[bot] log_level` in config, already overridden by `PARLEY_LOG_LEVEL`
//!
//! [`LogLevel`] records which one won so startup can report it, and
//! [`init`] installs the subscriber once.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Where the effective level directive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    Cli,
    RustLog,
    Config,
}

/// The effective filter directive plus the configured level to fall back on.
#[derive(Debug, Clone)]
pub struct LogLevel {
    directive: String,
    source: LevelSource,
    configured: String,
}

impl LogLevel {
    /// Pick the winning directive. An empty `RUST_LOG` counts as unset.
    pub fn resolve(cli: Option<&str>, rust_log: Option<&str>, configured: &str) -> Self {
        let (directive, source) = match (cli, rust_log.filter(|v| !v.trim().is_empty())) {
            (Some(level), _) => (level, LevelSource::Cli),
            (None, Some(env)) => (env, LevelSource::RustLog),
            (None, None) => (configured, LevelSource::Config),
        };
        Self {
            directive: directive.to_string(),
            source,
            configured: configured.to_string(),
        }
    }

    /// [`resolve`](Self::resolve) against the process's `RUST_LOG`.
    pub fn from_env(cli: Option<&str>, configured: &str) -> Self {
        let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        Self::resolve(cli, rust_log.as_deref(), configured)
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn source(&self) -> LevelSource {
        self.source
    }

    /// Build the filter. A malformed `RUST_LOG` falls back to the configured
    /// level; the other sources were validated before we got here.
    fn filter(&self) -> Result<EnvFilter, AppError> {
        EnvFilter::try_new(&self.directive).or_else(|err| match self.source {
            LevelSource::RustLog => EnvFilter::try_new(&self.configured).map_err(|e| {
                AppError::Logger(format!(
                    "RUST_LOG '{}' rejected ({err}) and configured level '{}' too: {e}",
                    self.directive, self.configured
                ))
            }),
            _ => Err(AppError::Logger(format!("invalid log level '{}': {err}", self.directive))),
        })
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(level: &LogLevel) -> Result<(), AppError> {
    // stdout belongs to the console channel.
    tracing_subscriber::fmt()
        .with_env_filter(level.filter()?)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Parse a plain level name. Config uses this to reject a bad
/// `log_level` before any subscriber exists.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
