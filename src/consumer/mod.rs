//! Consumer side of the pipeline: poll, process, acknowledge.
//!
//! [`Consumer::run`] long-polls the queue, validates each message body,
//! hands valid requests to the [`Processor`] and deletes a message only after
//! processing succeeded. Everything else is left on the queue so the broker
//! redelivers it once the visibility timeout expires. Messages delivered more
//! often than [`ConsumerSettings::max_receive_count`] are dead-lettered
//! instead of being processed again.
//!
//! Cancellation stops new polls at once. A message already being processed
//! finishes its process and delete step; the rest of the batch is left for
//! redelivery.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::processor::Processor;
use crate::queue::{MessageId, Queue, QueueError, ReceivedMessage};
use crate::validation::RequestValidator;

pub mod supervisor;

pub use supervisor::{RestartBackoff, Supervisor, SupervisorReport};

/// Tunables for the poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConsumerSettings {
    /// Maximum number of messages requested per poll.
    pub batch_size: u32,
    /// Long-poll wait per receive call.
    pub wait_time: Duration,
    /// Deliveries allowed before a message is dead-lettered.
    pub max_receive_count: u32,
    /// Upper bound on a single processor invocation.
    pub processing_timeout: Duration,
    /// Messages of one batch processed at the same time.
    pub batch_concurrency: usize,
    /// Pause after a failed receive before polling again.
    pub receive_error_pause: Duration,
}

impl ConsumerSettings {
    /// Defaults matching the production deployment.
    pub const DEFAULT: Self = Self {
        batch_size: 5,
        wait_time: Duration::from_secs(10),
        max_receive_count: 5,
        processing_timeout: Duration::from_secs(30),
        batch_concurrency: 1,
        receive_error_pause: Duration::from_secs(1),
    };

    /// Sets the per-poll batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the long-poll wait.
    #[must_use]
    pub const fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Sets the redelivery bound.
    #[must_use]
    pub const fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = max_receive_count;
        self
    }

    /// Sets the processing timeout.
    #[must_use]
    pub const fn with_processing_timeout(mut self, processing_timeout: Duration) -> Self {
        self.processing_timeout = processing_timeout;
        self
    }

    /// Sets how many messages of a batch run concurrently.
    #[must_use]
    pub const fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency;
        self
    }

    /// Sets the pause applied after a receive error.
    #[must_use]
    pub const fn with_receive_error_pause(mut self, pause: Duration) -> Self {
        self.receive_error_pause = pause;
        self
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What happens to messages that exceeded the redelivery bound.
#[derive(Clone, Default)]
pub enum DeadLetterPolicy {
    /// Enqueue the body unchanged on another queue, then delete the source.
    Forward(Arc<dyn Queue>),
    /// Log the body and delete it.
    #[default]
    Discard,
}

impl fmt::Debug for DeadLetterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward(_) => f.write_str("Forward(..)"),
            Self::Discard => f.write_str("Discard"),
        }
    }
}

/// Final disposition of one received message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageOutcome {
    /// Processed and deleted.
    Processed,
    /// Body failed decoding or validation; left for redelivery.
    Rejected,
    /// Processor returned an error; left for redelivery.
    Failed,
    /// Processor exceeded the timeout; left for redelivery.
    TimedOut,
    /// Processing or dead-lettering succeeded but the delete call failed.
    DeleteFailed,
    /// Redelivery bound exceeded; forwarded or discarded and deleted.
    DeadLettered,
    /// Redelivery bound exceeded but forwarding failed; left on the queue.
    DeadLetterFailed,
}

impl MessageOutcome {
    /// Whether the message was removed from the source queue.
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::Processed | Self::DeadLettered)
    }
}

/// Outcomes of one poll.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchSummary {
    /// Messages handed out by the queue.
    pub received: usize,
    /// Outcome per handled message, in completion order.
    pub outcomes: Vec<(MessageId, MessageOutcome)>,
}

impl BatchSummary {
    /// Messages left untouched because cancellation arrived mid-batch.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.received.saturating_sub(self.outcomes.len())
    }

    /// Number of messages with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: MessageOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, recorded)| *recorded == outcome)
            .count()
    }

    /// Outcome recorded for `message_id`, if it was handled.
    #[must_use]
    pub fn outcome_of(&self, message_id: &MessageId) -> Option<MessageOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == message_id)
            .map(|(_, outcome)| *outcome)
    }

    /// Returns `true` when the poll came back empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.received == 0
    }
}

/// Long-running queue consumer.
#[derive(Debug)]
pub struct Consumer<Q, P> {
    queue: Q,
    processor: P,
    validator: RequestValidator,
    settings: ConsumerSettings,
    dead_letter: DeadLetterPolicy,
}

impl<Q: Queue, P: Processor> Consumer<Q, P> {
    /// Creates a consumer with the default validator and
    /// [`DeadLetterPolicy::Discard`].
    #[must_use]
    pub fn new(queue: Q, processor: P, settings: ConsumerSettings) -> Self {
        Self {
            queue,
            processor,
            validator: RequestValidator::new(),
            settings,
            dead_letter: DeadLetterPolicy::Discard,
        }
    }

    /// Replaces the validator applied to message bodies.
    #[must_use]
    pub fn with_validator(mut self, validator: RequestValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the dead-letter policy.
    #[must_use]
    pub fn with_dead_letter(mut self, policy: DeadLetterPolicy) -> Self {
        self.dead_letter = policy;
        self
    }

    /// Settings in force.
    #[must_use]
    pub const fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            batch_size = self.settings.batch_size,
            wait_secs = self.settings.wait_time.as_secs(),
            max_receive_count = self.settings.max_receive_count,
            "consumer started"
        );

        while !shutdown.is_cancelled() {
            match self.poll_once(&shutdown).await {
                Ok(summary) if summary.is_empty() => {}
                Ok(summary) => {
                    info!(
                        received = summary.received,
                        processed = summary.count(MessageOutcome::Processed),
                        dead_lettered = summary.count(MessageOutcome::DeadLettered),
                        skipped = summary.skipped(),
                        "batch handled"
                    );
                }
                Err(err) => {
                    error!(error = %err, "failed to receive messages");
                    tokio::select! {
                        () = shutdown.cancelled() => {}
                        () = sleep(self.settings.receive_error_pause) => {}
                    }
                }
            }
        }

        info!("consumer stopped");
    }

    /// Runs a single poll and handles the returned batch.
    ///
    /// Returns an empty summary when `shutdown` fires before the queue
    /// answers.
    ///
    /// # Errors
    ///
    /// Returns the queue error when the receive call fails. Per-message
    /// failures are reported through [`BatchSummary::outcomes`].
    pub async fn poll_once(&self, shutdown: &CancellationToken) -> Result<BatchSummary, QueueError> {
        let receive = self
            .queue
            .receive(self.settings.batch_size, self.settings.wait_time);
        let batch = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(BatchSummary::default()),
            received = receive => received?,
        };

        let received = batch.len();
        if received == 0 {
            return Ok(BatchSummary::default());
        }
        debug!(received, "received batch");

        let outcomes = stream::iter(batch)
            .take_while(|_| future::ready(!shutdown.is_cancelled()))
            .map(|message| self.handle_message(message))
            .buffer_unordered(self.settings.batch_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(BatchSummary { received, outcomes })
    }

    async fn handle_message(&self, message: ReceivedMessage) -> (MessageId, MessageOutcome) {
        let span = info_span!(
            "message",
            message_id = %message.message_id,
            receive_count = message.receive_count
        );
        let outcome = self.dispose(&message).instrument(span).await;
        (message.message_id, outcome)
    }

    async fn dispose(&self, message: &ReceivedMessage) -> MessageOutcome {
        if message.receive_count > self.settings.max_receive_count {
            return self.dead_letter(message).await;
        }

        let request = match self.validator.validate(&message.body) {
            Ok(request) => request,
            Err(rejection) => {
                warn!(
                    error = %rejection,
                    details = rejection.details().len(),
                    "poison message left for redelivery"
                );
                return MessageOutcome::Rejected;
            }
        };

        match timeout(
            self.settings.processing_timeout,
            self.processor.process(&request),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(resource_id = %request.id, error = %err, "processing failed");
                return MessageOutcome::Failed;
            }
            Err(_) => {
                error!(
                    resource_id = %request.id,
                    timeout_secs = self.settings.processing_timeout.as_secs(),
                    "processing timed out"
                );
                return MessageOutcome::TimedOut;
            }
        }

        match self.queue.delete(&message.handle).await {
            Ok(()) => {
                info!(resource_id = %request.id, "provisioning request processed");
                MessageOutcome::Processed
            }
            Err(err) => {
                error!(resource_id = %request.id, error = %err, "failed to delete processed message");
                MessageOutcome::DeleteFailed
            }
        }
    }

    async fn dead_letter(&self, message: &ReceivedMessage) -> MessageOutcome {
        match &self.dead_letter {
            DeadLetterPolicy::Forward(target) => {
                if let Err(err) = target.enqueue(&message.body).await {
                    error!(error = %err, "failed to forward message to dead-letter queue");
                    return MessageOutcome::DeadLetterFailed;
                }
                warn!(
                    max_receive_count = self.settings.max_receive_count,
                    "message forwarded to dead-letter queue"
                );
            }
            DeadLetterPolicy::Discard => {
                error!(
                    max_receive_count = self.settings.max_receive_count,
                    body = %String::from_utf8_lossy(&message.body),
                    "discarding message that exceeded the redelivery bound"
                );
            }
        }

        match self.queue.delete(&message.handle).await {
            Ok(()) => MessageOutcome::DeadLettered,
            Err(err) => {
                error!(error = %err, "failed to delete dead-lettered message");
                MessageOutcome::DeleteFailed
            }
        }
    }
}
