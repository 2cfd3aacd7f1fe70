//! Shared fixtures for provisioning BDD scenarios.

use provisioner::test_support::{FlakyQueue, RecordingProcessor};
use rstest::fixture;
use serde_json::Value;

/// HTTP reply captured by a `When` step.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

#[derive(Clone, Debug, Default)]
pub struct ProvisioningContext {
    pub queue: FlakyQueue,
    pub processor: RecordingProcessor,
    pub reply: Option<Reply>,
}

impl ProvisioningContext {
    pub fn reply(&self) -> Result<&Reply, String> {
        self.reply
            .as_ref()
            .ok_or_else(|| String::from("no request has been sent"))
    }
}

#[fixture]
pub fn provisioning_context() -> ProvisioningContext {
    ProvisioningContext::default()
}
