//! Structured logging setup using `tracing`.
//!
//! Production output is flattened JSON suitable for log aggregation; the
//! pretty format is meant for local runs. `RUST_LOG` overrides the configured
//! filter when set.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable, multi-field lines.
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(LoggingError::UnknownFormat(value.to_owned())),
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// Directive as configured.
        filter: String,
        /// Parser error.
        message: String,
    },
    /// The format name is not recognised.
    #[error("unknown log format '{0}' (expected json or pretty)")]
    UnknownFormat(String),
    /// A global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`LoggingError::InvalidFilter`] when neither `RUST_LOG` nor
/// `filter` parse, and [`LoggingError::Install`] when a subscriber is
/// already set.
pub fn init_logging(filter: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|err| LoggingError::InvalidFilter {
            filter: filter.to_owned(),
            message: err.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter_layer);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_fmt::layer().with_target(true))
            .try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))?;

    tracing::info!(filter = %filter, format = %format, "logging initialised");
    Ok(())
}

/// Installs a test-writer subscriber; repeated calls are harmless.
pub fn init_test_logging() {
    let _already_installed = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
