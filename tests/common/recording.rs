use async_trait::async_trait;
use operator_core::controller::{Context, DeleteControl, Reconciler, UpdateControl};
use operator_core::error::{OperatorError, Result};
use operator_core::expectation::ExpectationStatus;
use operator_core::resource::ManagedResource;
use operator_core::retry::RetryInfo;
use operator_core::workflow::{
    Capabilities, DependentReconcileResult, DependentResource, ReconcileOperation, WorkflowContext,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a [`RecordingReconciler`] returns once its scripted failures are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileReply {
    NoUpdate,
    PatchStatus,
    RescheduleAfter(Duration),
}

/// Reconciler that records every call and can be scripted to fail or stall.
#[derive(Debug, Clone)]
pub struct RecordingReconciler {
    inner: Arc<RecordingState>,
}

#[derive(Debug)]
struct RecordingState {
    calls: AtomicUsize,
    cleanup_calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    failures_remaining: AtomicU32,
    failure: Mutex<OperatorError>,
    panic_next: AtomicBool,
    delay: Mutex<Duration>,
    reply: Mutex<ReconcileReply>,
    cleanup_done: AtomicBool,
    seen_versions: Mutex<Vec<String>>,
    seen_finalizers: Mutex<Vec<bool>>,
    retry_infos: Mutex<Vec<Option<RetryInfo>>>,
}

impl Default for RecordingReconciler {
    fn default() -> Self {
        Self {
            inner: Arc::new(RecordingState {
                calls: AtomicUsize::new(0),
                cleanup_calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                failures_remaining: AtomicU32::new(0),
                failure: Mutex::new(OperatorError::reconcile("scripted failure")),
                panic_next: AtomicBool::new(false),
                delay: Mutex::new(Duration::ZERO),
                reply: Mutex::new(ReconcileReply::NoUpdate),
                cleanup_done: AtomicBool::new(true),
                seen_versions: Mutex::new(Vec::new()),
                seen_finalizers: Mutex::new(Vec::new()),
                retry_infos: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl RecordingReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, times: u32) -> Self {
        self.inner.failures_remaining.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_with(self, times: u32, error: OperatorError) -> Self {
        *self.inner.failure.lock() = error;
        self.failing(times)
    }

    pub fn panicking_once(self) -> Self {
        self.inner.panic_next.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock() = delay;
        self
    }

    pub fn replying(self, reply: ReconcileReply) -> Self {
        *self.inner.reply.lock() = reply;
        self
    }

    pub fn cleanup_done(self, done: bool) -> Self {
        self.inner.cleanup_done.store(done, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> usize {
        self.inner.cleanup_calls.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.inner.max_running.load(Ordering::SeqCst)
    }

    pub fn seen_versions(&self) -> Vec<String> {
        self.inner.seen_versions.lock().clone()
    }

    pub fn seen_finalizers(&self) -> Vec<bool> {
        self.inner.seen_finalizers.lock().clone()
    }

    pub fn retry_infos(&self) -> Vec<Option<RetryInfo>> {
        self.inner.retry_infos.lock().clone()
    }
}

#[async_trait]
impl Reconciler for RecordingReconciler {
    async fn reconcile(&self, resource: ManagedResource, context: &Context) -> Result<UpdateControl> {
        let state = &self.inner;
        state.calls.fetch_add(1, Ordering::SeqCst);
        let running = state.running.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_running.fetch_max(running, Ordering::SeqCst);
        state.seen_versions.lock().push(resource.resource_version.clone());
        state
            .seen_finalizers
            .lock()
            .push(!resource.finalizers.is_empty());
        state.retry_infos.lock().push(context.retry_info());

        let delay = *state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        state.running.fetch_sub(1, Ordering::SeqCst);

        if state.panic_next.swap(false, Ordering::SeqCst) {
            panic!("reconciler exploded");
        }
        let failing = state
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| remaining.checked_sub(1))
            .is_ok();
        if failing {
            return Err(state.failure.lock().clone());
        }

        let reply = *state.reply.lock();
        Ok(match reply {
            ReconcileReply::NoUpdate => UpdateControl::no_update(),
            ReconcileReply::PatchStatus => {
                let status = json!({"observed_generation": resource.generation});
                UpdateControl::patch_status(resource.with_status(status))
            }
            ReconcileReply::RescheduleAfter(delay) => UpdateControl::no_update().reschedule_after(delay),
        })
    }

    async fn cleanup(&self, _resource: ManagedResource, _context: &Context) -> Result<DeleteControl> {
        self.inner.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.cleanup_done.load(Ordering::SeqCst) {
            Ok(DeleteControl::default_delete())
        } else {
            Ok(DeleteControl::no_finalizer_removal().reschedule_after(Duration::from_secs(10)))
        }
    }
}

/// Reconciler that expects `status.ready` after its first run and records the
/// expectation outcome each later run was admitted with.
#[derive(Debug, Clone)]
pub struct ExpectingReconciler {
    timeout: Duration,
    outcomes: Arc<Mutex<Vec<Option<ExpectationStatus>>>>,
}

impl ExpectingReconciler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn outcomes(&self) -> Vec<Option<ExpectationStatus>> {
        self.outcomes.lock().clone()
    }
}

pub fn is_ready(resource: &ManagedResource) -> bool {
    resource
        .status
        .as_ref()
        .and_then(|status| status.get("ready"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[async_trait]
impl Reconciler for ExpectingReconciler {
    async fn reconcile(&self, resource: ManagedResource, context: &Context) -> Result<UpdateControl> {
        let mut outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            context
                .expectations()
                .set_expectation(&resource.id, "ready", self.timeout, is_ready);
        }
        outcomes.push(context.expectation_result().map(|result| result.status));
        Ok(UpdateControl::no_update())
    }
}

/// Shared, ordered log of dependent-resource operations, e.g. `reconcile:db`.
#[derive(Debug, Clone, Default)]
pub struct OperationLog(Arc<Mutex<Vec<String>>>);

impl OperationLog {
    pub fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|logged| logged == entry)
    }
}

/// Dependent resource that logs its calls and can be told to fail.
#[derive(Debug, Clone)]
pub struct RecordingDependent {
    name: String,
    log: OperationLog,
    capabilities: Capabilities,
    fail_reconcile: bool,
    fail_delete: bool,
    output: Option<Value>,
}

impl RecordingDependent {
    pub fn new(name: &str, log: &OperationLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            capabilities: Capabilities::full(),
            fail_reconcile: false,
            fail_delete: false,
            output: Some(json!({"name": name})),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_reconcile = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[async_trait]
impl DependentResource for RecordingDependent {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn reconcile(
        &self,
        _primary: &ManagedResource,
        _context: &WorkflowContext,
    ) -> Result<DependentReconcileResult> {
        self.log.record(format!("reconcile:{}", self.name));
        if self.fail_reconcile {
            return Err(OperatorError::dependent(&self.name, "backend rejected the request"));
        }
        Ok(DependentReconcileResult::new(
            ReconcileOperation::Created,
            self.output.clone(),
        ))
    }

    async fn delete(&self, _primary: &ManagedResource, _context: &WorkflowContext) -> Result<()> {
        self.log.record(format!("delete:{}", self.name));
        if self.fail_delete {
            return Err(OperatorError::dependent(&self.name, "delete failed"));
        }
        Ok(())
    }
}
