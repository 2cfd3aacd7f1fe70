//! Amazon SQS adapter for the [`Queue`] contract.

use std::time::Duration;

use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use tracing::{debug, warn};

use super::{DeleteHandle, MessageId, Queue, QueueError, QueueFuture, ReceivedMessage};

/// Largest batch SQS hands out per receive call.
pub const MAX_BATCH: u32 = 10;

/// Longest long-poll wait SQS accepts.
pub const MAX_WAIT: Duration = Duration::from_secs(20);

/// Queue backed by a single SQS queue URL.
#[derive(Clone, Debug)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Builds a client from shared AWS configuration.
    #[must_use]
    pub fn from_sdk_config(config: &aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self::new(Client::new(config), queue_url)
    }

    /// URL of the queue this adapter talks to.
    #[must_use]
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

impl Queue for SqsQueue {
    fn enqueue<'a>(&'a self, body: &'a [u8]) -> QueueFuture<'a, MessageId> {
        Box::pin(async move {
            let text = std::str::from_utf8(body)
                .map_err(|err| QueueError::InvalidBody(format!("body is not UTF-8: {err}")))?;
            let output = self
                .client
                .send_message()
                .queue_url(&self.queue_url)
                .message_body(text)
                .send()
                .await
                .map_err(|err| transport("enqueue", &err))?;
            let id = output
                .message_id()
                .ok_or_else(|| QueueError::InvalidResponse {
                    operation: "enqueue",
                    message: String::from("missing MessageId"),
                })?;
            Ok(MessageId(id.to_owned()))
        })
    }

    fn receive(&self, max_messages: u32, wait: Duration) -> QueueFuture<'_, Vec<ReceivedMessage>> {
        Box::pin(async move {
            let output = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(batch_size(max_messages))
                .wait_time_seconds(wait_seconds(wait))
                .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
                .send()
                .await
                .map_err(|err| transport("receive", &err))?;

            let messages = usable_messages(output.messages());
            debug!(count = messages.len(), queue_url = %self.queue_url, "received messages");
            Ok(messages)
        })
    }

    fn delete<'a>(&'a self, handle: &'a DeleteHandle) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(&handle.0)
                .send()
                .await
                .map_err(|err| transport("delete", &err))?;
            Ok(())
        })
    }
}

fn transport<E>(operation: &'static str, err: &E) -> QueueError
where
    E: std::error::Error,
{
    QueueError::Transport {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn batch_size(max_messages: u32) -> i32 {
    i32::try_from(max_messages.clamp(1, MAX_BATCH)).unwrap_or(1)
}

fn wait_seconds(wait: Duration) -> i32 {
    i32::try_from(wait.min(MAX_WAIT).as_secs()).unwrap_or(0)
}

/// Converts a received batch, skipping entries SQS returned without the
/// identifiers needed to track and delete them.
fn usable_messages(messages: &[Message]) -> Vec<ReceivedMessage> {
    messages
        .iter()
        .filter_map(|message| match to_received(message) {
            Ok(received) => Some(received),
            Err(err) => {
                warn!(error = %err, "skipping malformed SQS message");
                None
            }
        })
        .collect()
}

fn to_received(message: &Message) -> Result<ReceivedMessage, QueueError> {
    let missing = |what: &str| QueueError::InvalidResponse {
        operation: "receive",
        message: format!("message without {what}"),
    };
    let message_id = message.message_id().ok_or_else(|| missing("MessageId"))?;
    let handle = message
        .receipt_handle()
        .ok_or_else(|| missing("ReceiptHandle"))?;
    let receive_count = message
        .attributes()
        .and_then(|attributes| attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse::<u32>().ok())
        .unwrap_or(1);

    Ok(ReceivedMessage {
        message_id: MessageId(message_id.to_owned()),
        body: message.body().unwrap_or_default().as_bytes().to_vec(),
        handle: DeleteHandle(handle.to_owned()),
        receive_count,
    })
}
