//! Restart-on-panic supervision for the consumer loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Consumer;
use crate::processor::Processor;
use crate::queue::Queue;

/// Exponential backoff between restarts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RestartBackoff {
    initial: Duration,
    max: Duration,
}

impl RestartBackoff {
    /// Default policy: 500 ms doubling up to 30 s.
    pub const DEFAULT: Self = Self::new(Duration::from_millis(500), Duration::from_secs(30));

    /// Creates a policy starting at `initial` and capped at `max`.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before restart number `attempt`, counting from zero.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Summary returned once supervision ends.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SupervisorReport {
    /// Number of times the task was restarted after a panic.
    pub restarts: u32,
}

/// Keeps a task alive across panics until shutdown is requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct Supervisor {
    backoff: RestartBackoff,
}

impl Supervisor {
    /// Creates a supervisor using `backoff` between restarts.
    #[must_use]
    pub const fn new(backoff: RestartBackoff) -> Self {
        Self { backoff }
    }

    /// Spawns the task produced by `make_task` and respawns it whenever it
    /// panics. Returns when the task finishes normally, when it is aborted, or
    /// when `shutdown` is cancelled.
    pub async fn run<F, Fut>(&self, shutdown: CancellationToken, mut make_task: F) -> SupervisorReport
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut report = SupervisorReport::default();
        loop {
            let handle = tokio::spawn(make_task(shutdown.clone()));
            match handle.await {
                Ok(()) => return report,
                Err(err) if err.is_panic() => {
                    error!(restarts = report.restarts, "supervised task panicked");
                }
                Err(err) => {
                    warn!(error = %err, "supervised task was cancelled");
                    return report;
                }
            }

            if shutdown.is_cancelled() {
                return report;
            }

            let delay = self.backoff.delay(report.restarts);
            report.restarts = report.restarts.saturating_add(1);
            info!(delay_ms = delay.as_millis(), "restarting supervised task");
            tokio::select! {
                () = shutdown.cancelled() => return report,
                () = sleep(delay) => {}
            }
        }
    }

    /// Supervises `consumer.run` until `shutdown` is cancelled.
    pub async fn run_consumer<Q, P>(
        &self,
        consumer: Arc<Consumer<Q, P>>,
        shutdown: CancellationToken,
    ) -> SupervisorReport
    where
        Q: Queue + 'static,
        P: Processor + 'static,
    {
        self.run(shutdown, move |token| {
            let consumer = Arc::clone(&consumer);
            async move { consumer.run(token).await }
        })
        .await
    }
}
