//! Queue collaborator contract.
//!
//! The pipeline only needs three operations from a broker: enqueue a body,
//! long-poll for a batch, and delete a received message by its handle.
//! Delivery is at-least-once, unordered and without deduplication; a
//! received but undeleted message becomes visible again once the broker's
//! visibility timeout expires.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod memory;
pub mod sqs;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

/// Broker-assigned identifier of an enqueued message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token used to delete one particular delivery of a message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DeleteHandle(pub String);

impl fmt::Display for DeleteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed out by [`Queue::receive`].
///
/// Delivery metadata lives beside the body; the body itself is exactly what
/// was enqueued.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedMessage {
    /// Broker-assigned identifier, stable across redeliveries.
    pub message_id: MessageId,
    /// Payload bytes as enqueued.
    pub body: Vec<u8>,
    /// Handle for deleting this delivery.
    pub handle: DeleteHandle,
    /// How many times the broker has delivered the message, this delivery
    /// included.
    pub receive_count: u32,
}

/// Errors raised by queue implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum QueueError {
    /// The broker could not be reached or answered with an error.
    #[error("queue {operation} failed: {message}")]
    Transport {
        /// Operation that failed (`enqueue`, `receive`, `delete`).
        operation: &'static str,
        /// Error reported by the broker client.
        message: String,
    },
    /// The broker accepted the call but returned something unusable.
    #[error("queue returned an invalid {operation} response: {message}")]
    InvalidResponse {
        /// Operation that produced the response.
        operation: &'static str,
        /// Description of the problem.
        message: String,
    },
    /// The message body cannot be carried by this broker.
    #[error("message body rejected: {0}")]
    InvalidBody(String),
}

/// Future returned by queue operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// Minimal interface implemented by message brokers.
///
/// Implementations must be safe to share between many concurrent HTTP
/// handlers.
pub trait Queue: Send + Sync {
    /// Enqueues `body` and resolves once the broker has durably accepted it.
    fn enqueue<'a>(&'a self, body: &'a [u8]) -> QueueFuture<'a, MessageId>;

    /// Long-polls for up to `max_messages`, waiting at most `wait` when the
    /// queue is empty. Returns an empty batch when the wait elapses.
    fn receive(&self, max_messages: u32, wait: Duration) -> QueueFuture<'_, Vec<ReceivedMessage>>;

    /// Deletes the delivery identified by `handle`.
    fn delete<'a>(&'a self, handle: &'a DeleteHandle) -> QueueFuture<'a, ()>;
}

impl<Q: Queue + ?Sized> Queue for Arc<Q> {
    fn enqueue<'a>(&'a self, body: &'a [u8]) -> QueueFuture<'a, MessageId> {
        (**self).enqueue(body)
    }

    fn receive(&self, max_messages: u32, wait: Duration) -> QueueFuture<'_, Vec<ReceivedMessage>> {
        (**self).receive(max_messages, wait)
    }

    fn delete<'a>(&'a self, handle: &'a DeleteHandle) -> QueueFuture<'a, ()> {
        (**self).delete(handle)
    }
}

#[cfg(test)]
mod tests;
