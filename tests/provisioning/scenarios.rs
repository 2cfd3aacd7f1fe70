//! BDD scenarios for request intake and consumption.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisioningContext, provisioning_context};

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Accept a valid request and hand it to the consumer"
)]
fn scenario_accept_request(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Reject an unsupported resource type"
)]
fn scenario_reject_resource_type(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Report a queue outage as an internal error"
)]
fn scenario_queue_outage(provisioning_context: ProvisioningContext) {
    drop(provisioning_context);
}
