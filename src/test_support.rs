//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::model::{CloudProvider, ProvisioningRequest, ProvisioningStatus, ResourceType};
use crate::parameters::{ParameterError, ParameterFuture, ParameterStore};
use crate::processor::{ProcessFuture, ProcessingError, Processor};
use crate::queue::{
    DeleteHandle, MemoryQueue, MessageId, Queue, QueueError, QueueFuture, ReceivedMessage,
};

/// Builds a valid request with the given identifier.
#[must_use]
pub fn sample_request(id: &str) -> ProvisioningRequest {
    ProvisioningRequest {
        id: id.to_owned(),
        resource_type: ResourceType::Vm,
        cloud_provider: CloudProvider::Aws,
        specification: String::from("t2.micro"),
        status: ProvisioningStatus::Pending,
        requested_by: String::from("alice"),
    }
}

/// Serialized form of [`sample_request`], as the publisher would enqueue it.
#[must_use]
pub fn sample_body(id: &str) -> Vec<u8> {
    serde_json::to_vec(&sample_request(id)).unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct FaultPlan {
    enqueue_failures: u32,
    receive_failures: u32,
    delete_failures: u32,
    enqueue_attempts: u32,
    delete_attempts: u32,
}

fn take_failure(remaining: &mut u32) -> bool {
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}

/// [`MemoryQueue`] wrapper that fails a scripted number of calls.
///
/// Each `fail_*` call adds failures consumed by the next matching
/// operations; once exhausted, calls fall through to the wrapped queue.
#[derive(Clone, Debug, Default)]
pub struct FlakyQueue {
    inner: MemoryQueue,
    plan: Arc<Mutex<FaultPlan>>,
}

impl FlakyQueue {
    /// Wraps a default [`MemoryQueue`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing queue.
    #[must_use]
    pub fn wrapping(inner: MemoryQueue) -> Self {
        Self {
            inner,
            plan: Arc::default(),
        }
    }

    /// The wrapped queue, for inspection.
    #[must_use]
    pub const fn inner(&self) -> &MemoryQueue {
        &self.inner
    }

    /// Makes the next `count` enqueues fail.
    pub fn fail_enqueues(&self, count: u32) {
        lock(&self.plan).enqueue_failures += count;
    }

    /// Makes the next `count` receives fail.
    pub fn fail_receives(&self, count: u32) {
        lock(&self.plan).receive_failures += count;
    }

    /// Makes the next `count` deletes fail.
    pub fn fail_deletes(&self, count: u32) {
        lock(&self.plan).delete_failures += count;
    }

    /// Enqueue calls seen so far, failed ones included.
    #[must_use]
    pub fn enqueue_attempts(&self) -> u32 {
        lock(&self.plan).enqueue_attempts
    }

    /// Delete calls seen so far, failed ones included.
    #[must_use]
    pub fn delete_attempts(&self) -> u32 {
        lock(&self.plan).delete_attempts
    }

    fn injected(operation: &'static str) -> QueueError {
        QueueError::Transport {
            operation,
            message: String::from("injected failure"),
        }
    }
}

impl Queue for FlakyQueue {
    fn enqueue<'a>(&'a self, body: &'a [u8]) -> QueueFuture<'a, MessageId> {
        let fail = {
            let mut plan = lock(&self.plan);
            plan.enqueue_attempts += 1;
            take_failure(&mut plan.enqueue_failures)
        };
        if fail {
            return Box::pin(async { Err(Self::injected("enqueue")) });
        }
        self.inner.enqueue(body)
    }

    fn receive(&self, max_messages: u32, wait: Duration) -> QueueFuture<'_, Vec<ReceivedMessage>> {
        if take_failure(&mut lock(&self.plan).receive_failures) {
            return Box::pin(async { Err(Self::injected("receive")) });
        }
        self.inner.receive(max_messages, wait)
    }

    fn delete<'a>(&'a self, handle: &'a DeleteHandle) -> QueueFuture<'a, ()> {
        let fail = {
            let mut plan = lock(&self.plan);
            plan.delete_attempts += 1;
            take_failure(&mut plan.delete_failures)
        };
        if fail {
            return Box::pin(async { Err(Self::injected("delete")) });
        }
        self.inner.delete(handle)
    }
}

#[derive(Debug, Default)]
struct Recording {
    attempts: Vec<String>,
    completed: Vec<String>,
    failures: BTreeMap<String, u32>,
    panics: BTreeSet<String>,
    delay: Duration,
}

/// Processor double that records calls and injects failures per request id.
#[derive(Clone, Debug, Default)]
pub struct RecordingProcessor {
    state: Arc<Mutex<Recording>>,
}

impl RecordingProcessor {
    /// Creates a processor that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` attempts for `resource_id`.
    pub fn fail_for(&self, resource_id: &str, times: u32) {
        *lock(&self.state)
            .failures
            .entry(resource_id.to_owned())
            .or_default() += times;
    }

    /// Panics on every attempt for `resource_id`.
    pub fn panic_for(&self, resource_id: &str) {
        lock(&self.state).panics.insert(resource_id.to_owned());
    }

    /// Sleeps for `delay` before every attempt completes.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = delay;
    }

    /// Identifiers of every attempted request, in call order.
    #[must_use]
    pub fn attempts(&self) -> Vec<String> {
        lock(&self.state).attempts.clone()
    }

    /// Identifiers of successfully processed requests, in completion order.
    #[must_use]
    pub fn completed(&self) -> Vec<String> {
        lock(&self.state).completed.clone()
    }
}

impl Processor for RecordingProcessor {
    fn process<'a>(&'a self, request: &'a ProvisioningRequest) -> ProcessFuture<'a> {
        Box::pin(async move {
            let (delay, should_panic) = {
                let mut state = lock(&self.state);
                state.attempts.push(request.id.clone());
                (state.delay, state.panics.contains(&request.id))
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            assert!(!should_panic, "scripted panic for {}", request.id);

            let mut state = lock(&self.state);
            if let Some(remaining) = state.failures.get_mut(&request.id) {
                if take_failure(remaining) {
                    return Err(ProcessingError::for_request(request, "scripted failure"));
                }
            }
            state.completed.push(request.id.clone());
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct ParameterState {
    values: BTreeMap<String, String>,
    failing: bool,
    lookups: u32,
}

/// In-memory [`ParameterStore`] with an optional forced failure.
#[derive(Clone, Debug, Default)]
pub struct StaticParameters {
    state: Arc<Mutex<ParameterState>>,
}

impl StaticParameters {
    /// Store holding the given key/value pairs.
    #[must_use]
    pub fn with(entries: &[(&str, &str)]) -> Self {
        let store = Self::default();
        lock(&store.state).values.extend(
            entries
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned())),
        );
        store
    }

    /// Store whose every lookup fails.
    #[must_use]
    pub fn failing() -> Self {
        let store = Self::default();
        lock(&store.state).failing = true;
        store
    }

    /// Number of lookups performed.
    #[must_use]
    pub fn lookups(&self) -> u32 {
        lock(&self.state).lookups
    }
}

impl ParameterStore for StaticParameters {
    fn get_parameter<'a>(&'a self, key: &'a str) -> ParameterFuture<'a> {
        let result = {
            let mut state = lock(&self.state);
            state.lookups += 1;
            if state.failing {
                Err(ParameterError::Lookup {
                    key: key.to_owned(),
                    message: String::from("injected failure"),
                })
            } else {
                Ok(state.values.get(key).cloned())
            }
        };
        Box::pin(async move { result })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// Keys in `unset` are removed for the guard's lifetime so ambient
    /// configuration cannot leak into a test.
    pub async fn scoped(set: &[(&str, &str)], unset: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                set.iter()
                    .map(|(key, _)| *key)
                    .chain(unset.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard::scoped"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(set.len() + unset.len());
        for (key, value) in set {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in unset {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
