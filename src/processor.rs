//! Side-effect seam invoked by the consumer for each valid message.
//!
//! What "provisioning" does is deliberately opaque. Implementations must
//! tolerate seeing the same request more than once because the queue
//! delivers at least once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::model::ProvisioningRequest;

/// Error reported by a [`Processor`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("processing request {resource_id} failed: {message}")]
pub struct ProcessingError {
    /// Identifier of the request being processed.
    pub resource_id: String,
    /// Description of the failure.
    pub message: String,
}

impl ProcessingError {
    /// Builds an error for `request`.
    #[must_use]
    pub fn for_request(request: &ProvisioningRequest, message: impl Into<String>) -> Self {
        Self {
            resource_id: request.id.clone(),
            message: message.into(),
        }
    }
}

/// Future returned by [`Processor::process`].
pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProcessingError>> + Send + 'a>>;

/// Performs the provisioning side effect for one request.
pub trait Processor: Send + Sync {
    /// Processes `request`. An error leaves the message on the queue for
    /// redelivery.
    fn process<'a>(&'a self, request: &'a ProvisioningRequest) -> ProcessFuture<'a>;
}

impl<P: Processor + ?Sized> Processor for Arc<P> {
    fn process<'a>(&'a self, request: &'a ProvisioningRequest) -> ProcessFuture<'a> {
        (**self).process(request)
    }
}

/// Processor that only records the request in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingProcessor;

impl Processor for LoggingProcessor {
    fn process<'a>(&'a self, request: &'a ProvisioningRequest) -> ProcessFuture<'a> {
        Box::pin(async move {
            info!(
                resource_id = %request.id,
                resource_type = %request.resource_type,
                cloud_provider = %request.cloud_provider,
                requested_by = %request.requested_by,
                status = %request.status,
                "processing provisioning request"
            );
            Ok(())
        })
    }
}
