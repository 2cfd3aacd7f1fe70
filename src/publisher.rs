//! Producer side of the pipeline.
//!
//! A validated [`ProvisioningRequest`] becomes exactly one queue message whose
//! body is the request serialized as JSON. There are no retries here; a
//! failure is reported to the caller, who decides whether to try again.

use thiserror::Error;
use tracing::info;

use crate::model::ProvisioningRequest;
use crate::queue::{Queue, QueueError};

/// Errors raised while handing a request to the queue.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The request could not be encoded.
    #[error("failed to serialize provisioning request: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The queue did not acknowledge the message.
    #[error("failed to enqueue provisioning request: {0}")]
    Enqueue(#[from] QueueError),
}

/// Serializes requests and enqueues them on a [`Queue`].
#[derive(Clone, Debug)]
pub struct Publisher<Q> {
    queue: Q,
}

impl<Q: Queue> Publisher<Q> {
    /// Creates a publisher writing to `queue`.
    #[must_use]
    pub const fn new(queue: Q) -> Self {
        Self { queue }
    }

    /// Borrows the underlying queue.
    #[must_use]
    pub const fn queue(&self) -> &Q {
        &self.queue
    }

    /// Publishes `request`, resolving once the queue accepted it durably.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Serialize`] when encoding fails and
    /// [`PublishError::Enqueue`] when the queue rejects the message.
    pub async fn publish(&self, request: &ProvisioningRequest) -> Result<(), PublishError> {
        let body = serde_json::to_vec(request).map_err(PublishError::Serialize)?;
        let message_id = self.queue.enqueue(&body).await?;
        info!(
            resource_id = %request.id,
            message_id = %message_id,
            resource_type = %request.resource_type,
            "provisioning request queued"
        );
        Ok(())
    }
}
