//! Queue consumer daemon for the provisioning pipeline.
//!
//! Drains the configured queue under supervision until SIGINT or SIGTERM.

use clap::Parser;
use std::io::Write as _;
use tokio_util::sync::CancellationToken;

use provisioner::bootstrap;
use provisioner::{ProvisionerConfig, QueueBackend, init_logging};

#[derive(Debug, Parser)]
#[command(
    name = "provisioner-consumer",
    about = "Process queued provisioning requests until interrupted"
)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<(), String> {
    let _cli = Cli::parse();
    let config = ProvisionerConfig::load_validated().map_err(|err| err.to_string())?;
    let format = config.log_format().map_err(|err| err.to_string())?;
    init_logging(&config.log_filter, format).map_err(|err| err.to_string())?;

    if config.backend().map_err(|err| err.to_string())? == QueueBackend::Memory {
        tracing::warn!("the in-memory queue is private to this process and will stay empty");
    }
    let queues = bootstrap::connect_queues(&config)
        .await
        .map_err(|err| err.to_string())?;

    let shutdown = CancellationToken::new();
    let signals = bootstrap::cancel_on_signal(shutdown.clone());
    let report = bootstrap::run_consumer(
        queues,
        config.consumer_settings(),
        config.restart_backoff(),
        shutdown,
    )
    .await;
    signals.abort();

    writeln!(
        std::io::stdout(),
        "consumer stopped: restarts={}",
        report.restarts
    )
    .map_err(|err| err.to_string())?;
    Ok(())
}
