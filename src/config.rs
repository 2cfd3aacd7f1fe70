//! Configuration loading via `ortho-config`.
//!
//! [`ProvisionerConfig`] is deliberately flat: every value is a scalar that
//! can be set from `provisioner.toml`, a `PROVISIONER_*` environment variable
//! or a default. Typed views (socket address, durations, consumer settings)
//! are derived after [`ProvisionerConfig::validate`] has accepted the raw
//! values.

use std::ffi::OsString;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::api::AllowedOrigins;
use crate::consumer::{ConsumerSettings, RestartBackoff};
use crate::logging::LogFormat;
use crate::parameters::QUEUE_URL_PARAMETER;

/// Default API listener address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Largest batch accepted by the queue.
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest long-poll wait accepted by the queue, in seconds.
pub const MAX_WAIT_TIME_SECS: u64 = 20;

/// Longest visibility timeout, in seconds (twelve hours, as on SQS).
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Broker used for the provisioning queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueBackend {
    /// Amazon SQS.
    Sqs,
    /// In-process queue; only useful with an embedded consumer.
    Memory,
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqs => "sqs",
            Self::Memory => "memory",
        })
    }
}

impl FromStr for QueueBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqs" => Ok(Self::Sqs),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidField(format!(
                "unknown queue backend '{value}' (expected sqs or memory)"
            ))),
        }
    }
}

/// Provisioning service configuration layered from defaults, configuration
/// files and environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PROVISIONER",
    discovery(
        app_name = "provisioner",
        env_var = "PROVISIONER_CONFIG_PATH",
        config_file_name = "provisioner.toml",
        dotfile_name = ".provisioner.toml",
        project_file_name = "provisioner.toml"
    )
)]
pub struct ProvisionerConfig {
    /// Socket address the API listens on.
    #[ortho_config(default = DEFAULT_BIND_ADDRESS.to_owned())]
    pub bind_address: String,
    /// Comma-separated browser origins allowed by CORS; `*` allows any.
    #[ortho_config(default = "*".to_owned())]
    pub allowed_origins: String,
    /// Queue broker: `sqs` or `memory`.
    #[ortho_config(default = "sqs".to_owned())]
    pub queue_backend: String,
    /// SQS queue URL. Resolved from the parameter store when unset.
    pub queue_url: Option<String>,
    /// Parameter key consulted when `queue_url` is unset.
    #[ortho_config(default = QUEUE_URL_PARAMETER.to_owned())]
    pub queue_url_parameter: String,
    /// Dead-letter queue URL. Without it, dead letters are logged and
    /// discarded.
    pub dead_letter_queue_url: Option<String>,
    /// AWS region override; the SDK default chain applies when unset.
    pub aws_region: Option<String>,
    /// Messages requested per poll (1–10).
    #[ortho_config(default = 5)]
    pub batch_size: u32,
    /// Long-poll wait in seconds (0–20).
    #[ortho_config(default = 10)]
    pub wait_time_secs: u64,
    /// Visibility timeout of the in-memory queue, in seconds (1–43200).
    #[ortho_config(default = 30)]
    pub visibility_timeout_secs: u64,
    /// Deliveries allowed before a message is dead-lettered.
    #[ortho_config(default = 5)]
    pub max_receive_count: u32,
    /// Upper bound on one processor invocation, in seconds.
    #[ortho_config(default = 30)]
    pub processing_timeout_secs: u64,
    /// Messages of one batch processed concurrently.
    #[ortho_config(default = 1)]
    pub batch_concurrency: u32,
    /// First consumer restart delay after a panic, in milliseconds.
    #[ortho_config(default = 500)]
    pub restart_backoff_initial_ms: u64,
    /// Cap on the consumer restart delay, in milliseconds.
    #[ortho_config(default = 30_000)]
    pub restart_backoff_max_ms: u64,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[ortho_config(default = "info".to_owned())]
    pub log_filter: String,
    /// Log output format: `json` or `pretty`.
    #[ortho_config(default = "json".to_owned())]
    pub log_format: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn invalid(&self, detail: impl fmt::Display) -> ConfigError {
        ConfigError::InvalidField(format!(
            "invalid {}: {detail}; set {} or {} in provisioner.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const BIND_ADDRESS: FieldMetadata =
    FieldMetadata::new("API bind address", "PROVISIONER_BIND_ADDRESS", "bind_address");
const ALLOWED_ORIGINS: FieldMetadata = FieldMetadata::new(
    "allowed origins",
    "PROVISIONER_ALLOWED_ORIGINS",
    "allowed_origins",
);
const QUEUE_BACKEND: FieldMetadata =
    FieldMetadata::new("queue backend", "PROVISIONER_QUEUE_BACKEND", "queue_backend");
const QUEUE_URL_PARAMETER_FIELD: FieldMetadata = FieldMetadata::new(
    "queue URL parameter key",
    "PROVISIONER_QUEUE_URL_PARAMETER",
    "queue_url_parameter",
);
const BATCH_SIZE: FieldMetadata =
    FieldMetadata::new("batch size", "PROVISIONER_BATCH_SIZE", "batch_size");
const WAIT_TIME: FieldMetadata =
    FieldMetadata::new("long-poll wait", "PROVISIONER_WAIT_TIME_SECS", "wait_time_secs");
const VISIBILITY_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "visibility timeout",
    "PROVISIONER_VISIBILITY_TIMEOUT_SECS",
    "visibility_timeout_secs",
);
const MAX_RECEIVE_COUNT: FieldMetadata = FieldMetadata::new(
    "maximum receive count",
    "PROVISIONER_MAX_RECEIVE_COUNT",
    "max_receive_count",
);
const PROCESSING_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "processing timeout",
    "PROVISIONER_PROCESSING_TIMEOUT_SECS",
    "processing_timeout_secs",
);
const BATCH_CONCURRENCY: FieldMetadata = FieldMetadata::new(
    "batch concurrency",
    "PROVISIONER_BATCH_CONCURRENCY",
    "batch_concurrency",
);
const BACKOFF_INITIAL: FieldMetadata = FieldMetadata::new(
    "initial restart backoff",
    "PROVISIONER_RESTART_BACKOFF_INITIAL_MS",
    "restart_backoff_initial_ms",
);
const BACKOFF_MAX: FieldMetadata = FieldMetadata::new(
    "maximum restart backoff",
    "PROVISIONER_RESTART_BACKOFF_MAX_MS",
    "restart_backoff_max_ms",
);
const LOG_FILTER: FieldMetadata =
    FieldMetadata::new("log filter", "PROVISIONER_LOG_FILTER", "log_filter");
const LOG_FORMAT: FieldMetadata =
    FieldMetadata::new("log format", "PROVISIONER_LOG_FORMAT", "log_format");

impl ProvisionerConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("provisioner")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads and validates configuration in one step.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load_without_cli_args()?;
        config.validate()?;
        Ok(config)
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that set the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.allowed_origins()?;
        self.backend()?;
        self.log_format()?;
        if self.queue_url_parameter.trim().is_empty() {
            return Err(QUEUE_URL_PARAMETER_FIELD.invalid("must not be empty"));
        }
        if self.log_filter.trim().is_empty() {
            return Err(LOG_FILTER.invalid("must not be empty"));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(BATCH_SIZE.invalid(format_args!(
                "{} is outside 1..={MAX_BATCH_SIZE}",
                self.batch_size
            )));
        }
        if self.wait_time_secs > MAX_WAIT_TIME_SECS {
            return Err(WAIT_TIME.invalid(format_args!(
                "{} exceeds {MAX_WAIT_TIME_SECS} seconds",
                self.wait_time_secs
            )));
        }
        require_positive(self.visibility_timeout_secs, &VISIBILITY_TIMEOUT)?;
        if self.visibility_timeout_secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(VISIBILITY_TIMEOUT.invalid(format_args!(
                "{} exceeds {MAX_VISIBILITY_TIMEOUT_SECS} seconds",
                self.visibility_timeout_secs
            )));
        }
        require_positive(u64::from(self.max_receive_count), &MAX_RECEIVE_COUNT)?;
        require_positive(self.processing_timeout_secs, &PROCESSING_TIMEOUT)?;
        require_positive(u64::from(self.batch_concurrency), &BATCH_CONCURRENCY)?;
        require_positive(self.restart_backoff_initial_ms, &BACKOFF_INITIAL)?;
        if self.restart_backoff_max_ms < self.restart_backoff_initial_ms {
            return Err(BACKOFF_MAX.invalid(format_args!(
                "{} is below the initial backoff of {} ms",
                self.restart_backoff_max_ms, self.restart_backoff_initial_ms
            )));
        }
        Ok(())
    }

    /// Parsed listener address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .trim()
            .parse::<SocketAddr>()
            .map_err(|err| BIND_ADDRESS.invalid(format_args!("'{}': {err}", self.bind_address)))
    }

    /// Parsed CORS origin list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the list is blank or an
    /// entry is not an origin.
    pub fn allowed_origins(&self) -> Result<AllowedOrigins, ConfigError> {
        if self.allowed_origins.trim().is_empty() {
            return Err(ALLOWED_ORIGINS.invalid("must not be empty; use * to allow any origin"));
        }
        self.allowed_origins
            .parse::<AllowedOrigins>()
            .map_err(|err| ALLOWED_ORIGINS.invalid(err))
    }

    /// Parsed queue backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for an unknown backend name.
    pub fn backend(&self) -> Result<QueueBackend, ConfigError> {
        self.queue_backend
            .parse::<QueueBackend>()
            .map_err(|_| QUEUE_BACKEND.invalid(format_args!(
                "'{}' is not sqs or memory",
                self.queue_backend
            )))
    }

    /// Parsed log format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for an unknown format name.
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format
            .parse::<LogFormat>()
            .map_err(|err| LOG_FORMAT.invalid(err))
    }

    /// Configured queue URL, ignoring blank values.
    #[must_use]
    pub fn queue_url(&self) -> Option<&str> {
        non_blank(self.queue_url.as_deref())
    }

    /// Configured dead-letter queue URL, ignoring blank values.
    #[must_use]
    pub fn dead_letter_queue_url(&self) -> Option<&str> {
        non_blank(self.dead_letter_queue_url.as_deref())
    }

    /// Configured AWS region, ignoring blank values.
    #[must_use]
    pub fn aws_region(&self) -> Option<&str> {
        non_blank(self.aws_region.as_deref())
    }

    /// Visibility timeout for the in-memory queue.
    #[must_use]
    pub const fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Typed consumer loop settings.
    #[must_use]
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings::DEFAULT
            .with_batch_size(self.batch_size)
            .with_wait_time(Duration::from_secs(self.wait_time_secs))
            .with_max_receive_count(self.max_receive_count)
            .with_processing_timeout(Duration::from_secs(self.processing_timeout_secs))
            .with_batch_concurrency(usize::try_from(self.batch_concurrency).unwrap_or(1))
    }

    /// Supervisor restart backoff.
    #[must_use]
    pub const fn restart_backoff(&self) -> RestartBackoff {
        RestartBackoff::new(
            Duration::from_millis(self.restart_backoff_initial_ms),
            Duration::from_millis(self.restart_backoff_max_ms),
        )
    }
}

fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(metadata.invalid("must be at least 1"));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
