//! Binary entry point for the provisioning API.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use provisioner::bootstrap::{self, BootstrapError};
use provisioner::{
    ConfigError, ConsumerSettings, LoggingError, ProvisionerConfig, QueueBackend, RestartBackoff,
    init_logging,
};

mod cli;

use cli::{Cli, ServeCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Serve(command) => serve(&command).await,
    }
}

async fn serve(args: &ServeCommand) -> Result<(), CliError> {
    let config = ProvisionerConfig::load_validated()?;
    init_logging(&config.log_filter, config.log_format()?)?;

    let queues = bootstrap::connect_queues(&config).await?;
    let embedded = embedded_consumer(args.embedded_consumer, &config)?;
    let allowed_origins = config.allowed_origins()?;
    let listener = bootstrap::bind(&config).await?;

    let shutdown = CancellationToken::new();
    let signals = bootstrap::cancel_on_signal(shutdown.clone());
    let served = bootstrap::serve(listener, queues, allowed_origins, embedded, shutdown).await;
    signals.abort();
    served.map_err(CliError::from)
}

fn embedded_consumer(
    enabled: bool,
    config: &ProvisionerConfig,
) -> Result<Option<(ConsumerSettings, RestartBackoff)>, CliError> {
    if enabled {
        return Ok(Some((config.consumer_settings(), config.restart_backoff())));
    }
    if config.backend()? == QueueBackend::Memory {
        warn!("the in-memory queue has no consumer; pass --embedded-consumer to drain it");
    }
    Ok(None)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
