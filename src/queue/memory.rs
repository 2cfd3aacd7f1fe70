//! In-process queue with broker-like delivery semantics.
//!
//! Messages become invisible for the visibility timeout once received and
//! reappear if they are not deleted in time. Every receive issues a fresh
//! delete handle and bumps the receive count, so stale handles from an
//! earlier delivery no longer delete the message. Deleting an unknown handle
//! is a no-op.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use super::{DeleteHandle, MessageId, Queue, QueueError, QueueFuture, ReceivedMessage};

/// Visibility timeout applied by [`MemoryQueue::default`].
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Horizon used when a deadline does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Shared, cloneable in-memory queue.
#[derive(Clone, Debug)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    arrivals: Notify,
    visibility_timeout: Duration,
}

#[derive(Debug, Default)]
struct State {
    messages: VecDeque<StoredMessage>,
}

#[derive(Debug)]
struct StoredMessage {
    id: MessageId,
    body: Vec<u8>,
    visible_at: Instant,
    receive_count: u32,
    receipt: Option<DeleteHandle>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

impl MemoryQueue {
    /// Creates an empty queue hiding received messages for
    /// `visibility_timeout`.
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                arrivals: Notify::new(),
                visibility_timeout,
            }),
        }
    }

    /// Returns the configured visibility timeout.
    #[must_use]
    pub fn visibility_timeout(&self) -> Duration {
        self.inner.visibility_timeout
    }

    /// Number of stored messages, visible or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock("len").map_or(0, |state| state.messages.len())
    }

    /// Returns `true` when no message is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages a receive issued now could return.
    #[must_use]
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.lock("visible_len").map_or(0, |state| {
            state
                .messages
                .iter()
                .filter(|message| message.visible_at <= now)
                .count()
        })
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, QueueError> {
        self.inner
            .state
            .lock()
            .map_err(|err| QueueError::Transport {
                operation,
                message: format!("memory queue state poisoned: {err}"),
            })
    }

    fn push(&self, body: &[u8]) -> Result<MessageId, QueueError> {
        let id = MessageId(Uuid::new_v4().to_string());
        self.lock("enqueue")?.messages.push_back(StoredMessage {
            id: id.clone(),
            body: body.to_vec(),
            visible_at: Instant::now(),
            receive_count: 0,
            receipt: None,
        });
        self.inner.arrivals.notify_waiters();
        Ok(id)
    }

    /// Marks up to `max` visible messages as in flight and returns them,
    /// together with the earliest instant an in-flight message reappears.
    fn take_visible(
        &self,
        max: usize,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>), QueueError> {
        let now = Instant::now();
        let hidden_until = deadline_after(now, self.inner.visibility_timeout);
        let mut state = self.lock("receive")?;

        let mut batch = Vec::new();
        let mut next_visible: Option<Instant> = None;
        for message in &mut state.messages {
            if message.visible_at > now {
                next_visible = Some(
                    next_visible.map_or(message.visible_at, |at| at.min(message.visible_at)),
                );
                continue;
            }
            if batch.len() == max {
                continue;
            }

            message.receive_count = message.receive_count.saturating_add(1);
            message.visible_at = hidden_until;
            let handle = DeleteHandle(format!("{}:{}", message.id, Uuid::new_v4()));
            message.receipt = Some(handle.clone());
            batch.push(ReceivedMessage {
                message_id: message.id.clone(),
                body: message.body.clone(),
                handle,
                receive_count: message.receive_count,
            });
        }

        Ok((batch, next_visible))
    }

    fn remove(&self, handle: &DeleteHandle) -> Result<(), QueueError> {
        let mut state = self.lock("delete")?;
        state
            .messages
            .retain(|message| message.receipt.as_ref() != Some(handle));
        Ok(())
    }
}

impl Queue for MemoryQueue {
    fn enqueue<'a>(&'a self, body: &'a [u8]) -> QueueFuture<'a, MessageId> {
        Box::pin(async move { self.push(body) })
    }

    fn receive(&self, max_messages: u32, wait: Duration) -> QueueFuture<'_, Vec<ReceivedMessage>> {
        Box::pin(async move {
            let max = usize::try_from(max_messages.max(1)).unwrap_or(usize::MAX);
            let deadline = deadline_after(Instant::now(), wait);

            loop {
                let arrival = self.inner.arrivals.notified();
                tokio::pin!(arrival);
                arrival.as_mut().enable();

                let (batch, next_visible) = self.take_visible(max)?;
                if !batch.is_empty() {
                    return Ok(batch);
                }
                if Instant::now() >= deadline {
                    return Ok(batch);
                }

                let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
                tokio::select! {
                    () = &mut arrival => {}
                    () = sleep_until(wake_at) => {}
                }
            }
        })
    }

    fn delete<'a>(&'a self, handle: &'a DeleteHandle) -> QueueFuture<'a, ()> {
        Box::pin(async move { self.remove(handle) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::ZERO)]
    #[case(Duration::from_secs(30))]
    #[case(Duration::MAX)]
    fn deadline_never_precedes_now(#[case] delay: Duration) {
        let now = Instant::now();
        let deadline = deadline_after(now, delay);

        assert!(deadline >= now);
        if let Some(exact) = now.checked_add(delay) {
            assert_eq!(deadline, exact);
        }
    }
}
