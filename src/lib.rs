//! Core library for the asynchronous resource provisioning pipeline.
//!
//! Requests enter through the HTTP API ([`api`]), are validated
//! ([`validation`]) and published to a queue ([`publisher`], [`queue`]). A
//! supervised consumer ([`consumer`]) drains the queue, re-validates each
//! message and hands it to a [`processor::Processor`]. The producer never
//! waits for processing; a `202 Accepted` only promises that the request was
//! durably enqueued.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod logging;
pub mod model;
pub mod parameters;
pub mod processor;
pub mod publisher;
pub mod queue;
pub mod test_support;
pub mod validation;

pub use api::{ApiState, router};
pub use bootstrap::{BootstrapError, Queues};
pub use config::{ConfigError, ProvisionerConfig, QueueBackend};
pub use consumer::{
    BatchSummary, Consumer, ConsumerSettings, DeadLetterPolicy, MessageOutcome, RestartBackoff,
    Supervisor, SupervisorReport,
};
pub use envelope::{AcceptedResponse, ApiResponse, ErrorResponse};
pub use logging::{LogFormat, LoggingError, init_logging};
pub use model::{CloudProvider, ProvisioningRequest, ProvisioningStatus, ResourceType};
pub use parameters::{ParameterError, ParameterStore, SsmParameterStore};
pub use processor::{LoggingProcessor, ProcessingError, Processor};
pub use publisher::{PublishError, Publisher};
pub use queue::{MemoryQueue, Queue, QueueError, SqsQueue};
pub use validation::{FieldError, RequestRejection, RequestValidator};
