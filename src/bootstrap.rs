//! Process wiring shared by the API server and the consumer daemon.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{AllowedOrigins, ApiState, router};
use crate::config::{ConfigError, ProvisionerConfig, QueueBackend};
use crate::consumer::{
    Consumer, ConsumerSettings, DeadLetterPolicy, RestartBackoff, Supervisor, SupervisorReport,
};
use crate::parameters::{ParameterError, SsmParameterStore, resolve_queue_url};
use crate::processor::LoggingProcessor;
use crate::queue::{MemoryQueue, Queue, SqsQueue};

/// Errors that abort process startup or serving.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The queue URL could not be resolved.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// The API listener could not be bound.
    #[error("failed to bind {address}: {message}")]
    Bind {
        /// Requested socket address.
        address: String,
        /// OS error message.
        message: String,
    },
    /// The HTTP server stopped with an error.
    #[error("HTTP server failed: {0}")]
    Serve(String),
    /// The embedded consumer task could not be joined.
    #[error("consumer task failed: {0}")]
    Consumer(String),
}

/// Queue handles shared by the producer and the consumer.
#[derive(Clone)]
pub struct Queues {
    /// Source queue for provisioning requests.
    pub queue: Arc<dyn Queue>,
    /// Destination for messages exceeding the redelivery bound.
    pub dead_letter: DeadLetterPolicy,
}

impl fmt::Debug for Queues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queues")
            .field("dead_letter", &self.dead_letter)
            .finish_non_exhaustive()
    }
}

impl Queues {
    /// Wraps an in-memory queue; dead letters are discarded.
    #[must_use]
    pub fn in_memory(queue: MemoryQueue) -> Self {
        Self {
            queue: Arc::new(queue),
            dead_letter: DeadLetterPolicy::Discard,
        }
    }
}

/// Loads shared AWS configuration, honouring an explicit region.
pub async fn aws_sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(name) = region {
        loader = loader.region(aws_config::Region::new(name.to_owned()));
    }
    loader.load().await
}

/// Builds the queue handles selected by `config`.
///
/// # Errors
///
/// Returns [`BootstrapError::Config`] for an unknown backend and
/// [`BootstrapError::Parameter`] when no queue URL can be resolved.
pub async fn connect_queues(config: &ProvisionerConfig) -> Result<Queues, BootstrapError> {
    match config.backend()? {
        QueueBackend::Memory => {
            warn!("using the in-memory queue; messages are lost on exit");
            Ok(Queues::in_memory(MemoryQueue::new(config.visibility_timeout())))
        }
        QueueBackend::Sqs => {
            let sdk_config = aws_sdk_config(config.aws_region()).await;
            let store = SsmParameterStore::from_sdk_config(&sdk_config);
            let queue_url =
                resolve_queue_url(config.queue_url(), &config.queue_url_parameter, &store).await?;
            info!(queue_url = %queue_url, "using SQS queue");

            let dead_letter = match config.dead_letter_queue_url() {
                Some(url) => {
                    info!(dead_letter_queue_url = %url, "dead letters are forwarded");
                    DeadLetterPolicy::Forward(Arc::new(SqsQueue::from_sdk_config(&sdk_config, url)))
                }
                None => DeadLetterPolicy::Discard,
            };
            Ok(Queues {
                queue: Arc::new(SqsQueue::from_sdk_config(&sdk_config, queue_url)),
                dead_letter,
            })
        }
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Cancels `shutdown` once a termination signal arrives.
#[must_use]
pub fn cancel_on_signal(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    })
}

/// Runs the logging consumer under supervision until `shutdown` fires.
pub async fn run_consumer(
    queues: Queues,
    settings: ConsumerSettings,
    backoff: RestartBackoff,
    shutdown: CancellationToken,
) -> SupervisorReport {
    let consumer = Arc::new(
        Consumer::new(queues.queue, LoggingProcessor, settings).with_dead_letter(queues.dead_letter),
    );
    let report = Supervisor::new(backoff)
        .run_consumer(consumer, shutdown)
        .await;
    info!(restarts = report.restarts, "consumer supervision ended");
    report
}

/// Serves the API on `listener` until `shutdown` fires, optionally running the
/// consumer in the same process. Browser access is limited to
/// `allowed_origins`.
///
/// # Errors
///
/// Returns [`BootstrapError::Serve`] when the server fails and
/// [`BootstrapError::Consumer`] when the embedded consumer task cannot be
/// joined.
pub async fn serve(
    listener: TcpListener,
    queues: Queues,
    allowed_origins: AllowedOrigins,
    embedded_consumer: Option<(ConsumerSettings, RestartBackoff)>,
    shutdown: CancellationToken,
) -> Result<(), BootstrapError> {
    let app = router(
        ApiState::for_queue(Arc::clone(&queues.queue)).with_allowed_origins(allowed_origins),
    );
    let consumer_task = embedded_consumer.map(|(settings, backoff)| {
        tokio::spawn(run_consumer(queues, settings, backoff, shutdown.clone()))
    });

    if let Ok(address) = listener.local_addr() {
        info!(%address, "provisioning API listening");
    }
    let stop = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await;
    shutdown.cancel();

    if let Some(task) = consumer_task {
        task.await
            .map_err(|err| BootstrapError::Consumer(err.to_string()))?;
    }
    served.map_err(|err| BootstrapError::Serve(err.to_string()))
}

/// Binds the configured address.
///
/// # Errors
///
/// Returns [`BootstrapError::Config`] for an unparsable address and
/// [`BootstrapError::Bind`] when the socket cannot be bound.
pub async fn bind(config: &ProvisionerConfig) -> Result<TcpListener, BootstrapError> {
    let address = config.bind_addr()?;
    TcpListener::bind(address)
        .await
        .map_err(|err| BootstrapError::Bind {
            address: address.to_string(),
            message: err.to_string(),
        })
}
