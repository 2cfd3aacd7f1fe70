//! BDD step definitions driving the router and consumer in-process.

use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request};
use provisioner::api::{ApiState, router};
use provisioner::consumer::{Consumer, ConsumerSettings};
use provisioner::test_support::{sample_body, sample_request};
use rstest_bdd_macros::{given, then, when};
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use super::test_helpers::{ProvisioningContext, Reply};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn submit(context: &ProvisioningContext, body: Vec<u8>) -> Result<Reply, StepError> {
    let app = router(ApiState::for_queue(context.queue.clone()));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/provision")
        .header("content-type", "application/json")
        .header("x-request-id", "bdd-request")
        .body(Body::from(body))
        .map_err(|err| StepError::Assertion(err.to_string()))?;

    runtime()?.block_on(async move {
        let response = app
            .oneshot(request)
            .await
            .map_err(|err| StepError::Assertion(err.to_string()))?;
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|err| StepError::Assertion(err.to_string()))?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|err| StepError::Assertion(format!("response is not JSON: {err}")))?;
        Ok(Reply { status, body })
    })
}

#[given("a running provisioning API")]
fn running_api(provisioning_context: ProvisioningContext) -> ProvisioningContext {
    provisioning_context
}

#[given("the queue rejects the next enqueue")]
fn queue_rejects_enqueue(provisioning_context: ProvisioningContext) -> ProvisioningContext {
    provisioning_context.queue.fail_enqueues(1);
    provisioning_context
}

#[when("a client submits a VM request with id \"{id}\"")]
fn submit_vm_request(
    provisioning_context: ProvisioningContext,
    id: String,
) -> Result<ProvisioningContext, StepError> {
    let reply = submit(&provisioning_context, sample_body(&id))?;
    Ok(ProvisioningContext {
        reply: Some(reply),
        ..provisioning_context
    })
}

#[when("a client submits a request with resource type \"{resource_type}\"")]
fn submit_with_resource_type(
    provisioning_context: ProvisioningContext,
    resource_type: String,
) -> Result<ProvisioningContext, StepError> {
    let mut payload = serde_json::to_value(sample_request("vm-x"))
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    if let Some(fields) = payload.as_object_mut() {
        fields.insert(String::from("resource_type"), Value::String(resource_type));
    }
    let body =
        serde_json::to_vec(&payload).map_err(|err| StepError::Assertion(err.to_string()))?;

    let reply = submit(&provisioning_context, body)?;
    Ok(ProvisioningContext {
        reply: Some(reply),
        ..provisioning_context
    })
}

#[when("the consumer polls the queue")]
fn consumer_polls(
    provisioning_context: ProvisioningContext,
) -> Result<ProvisioningContext, StepError> {
    let consumer = Consumer::new(
        provisioning_context.queue.clone(),
        provisioning_context.processor.clone(),
        ConsumerSettings::DEFAULT.with_wait_time(Duration::ZERO),
    );
    runtime()?
        .block_on(async move { consumer.poll_once(&CancellationToken::new()).await })
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    Ok(provisioning_context)
}

#[then("the response status is \"{status}\"")]
fn response_status(
    provisioning_context: &ProvisioningContext,
    status: u16,
) -> Result<(), StepError> {
    let reply = provisioning_context.reply().map_err(StepError::Assertion)?;
    if reply.status == status {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected status {status}, got {} with body {}",
            reply.status, reply.body
        )))
    }
}

#[then("the response accepts resource \"{id}\"")]
fn response_accepts(
    provisioning_context: &ProvisioningContext,
    id: String,
) -> Result<(), StepError> {
    let reply = provisioning_context.reply().map_err(StepError::Assertion)?;
    let accepted_id = reply.body.pointer("/data/resourceId").and_then(Value::as_str);
    let status = reply.body.pointer("/data/status").and_then(Value::as_str);
    let request_id = reply.body.pointer("/meta/requestId").and_then(Value::as_str);
    if accepted_id == Some(id.as_str())
        && status == Some("accepted")
        && request_id == Some("bdd-request")
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected acceptance envelope: {}",
            reply.body
        )))
    }
}

#[then("the error code is \"{code}\"")]
fn error_code(provisioning_context: &ProvisioningContext, code: String) -> Result<(), StepError> {
    let reply = provisioning_context.reply().map_err(StepError::Assertion)?;
    match reply.body.get("code").and_then(Value::as_str) {
        Some(actual) if actual == code => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected error code {code}, got {other:?}"
        ))),
    }
}

#[then("the error details name the field \"{field}\"")]
fn error_details_name_field(
    provisioning_context: &ProvisioningContext,
    field: String,
) -> Result<(), StepError> {
    let reply = provisioning_context.reply().map_err(StepError::Assertion)?;
    let named = reply
        .body
        .get("details")
        .and_then(Value::as_array)
        .is_some_and(|details| {
            details
                .iter()
                .any(|detail| detail.get("field").and_then(Value::as_str) == Some(field.as_str()))
        });
    if named {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "details do not mention {field}: {}",
            reply.body
        )))
    }
}

#[then("\"{count}\" message is queued")]
fn messages_queued(
    provisioning_context: &ProvisioningContext,
    count: usize,
) -> Result<(), StepError> {
    let queued = provisioning_context.queue.inner().len();
    if queued == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} queued messages, found {queued}"
        )))
    }
}

#[then("the consumer processed \"{id}\"")]
fn consumer_processed(
    provisioning_context: &ProvisioningContext,
    id: String,
) -> Result<(), StepError> {
    let completed = provisioning_context.processor.completed();
    if completed == vec![id.clone()] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only {id} to be processed, got {completed:?}"
        )))
    }
}

#[then("the consumer processed nothing")]
fn consumer_processed_nothing(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    let attempts = provisioning_context.processor.attempts();
    if attempts.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no processing, got {attempts:?}"
        )))
    }
}
