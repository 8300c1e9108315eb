//! # Reconciliation Scheduler
//!
//! Turns change notifications into reconciliations with these guarantees:
//!
//! - At most one reconciliation runs per resource. Events arriving meanwhile
//!   are coalesced into a single follow-up run.
//! - Failures are retried with the controller's backoff. Conflicts are retried
//!   immediately but still count against the attempt budget, as does the
//!   immediate re-run for an event that arrived during a failed run.
//!   Exhaustion is terminal until the next event.
//! - A resource with an unmet expectation is not admitted until the
//!   expectation is fulfilled or its deadline passes.
//! - Admissions are throttled per resource by the rate limiter.
//! - Idle resources are re-reconciled once their expiration interval elapses.
//! - Each run sees the freshest snapshot the controller knows of, including its
//!   own writes that the change source has not delivered yet.
//!
//! Per-resource state lives in a [`DashMap`] and every transition of it happens
//! while holding that resource's entry, so deciding whether to admit, defer or
//! coalesce is race-free across worker threads.

use super::configuration::ControllerConfiguration;
use super::control::PostExecutionControl;
use super::dispatcher::ReconciliationDispatcher;
use super::event::{ChangeEvent, SchedulerEvent};
use super::reconciler::Reconciler;
use super::timer::{TimerFired, TimerScheduler};
use crate::cache::ResourceFreshnessCache;
use crate::client::ResourceClient;
use crate::constants::defaults;
use crate::error::{OperatorError, Result};
use crate::expectation::{ExpectationManager, ExpectationStatus};
use crate::expiration::ExpirationState;
use crate::rate_limiter::RateState;
use crate::resource::{ManagedResource, ResourceId};
use crate::retry::RetryExecution;
use crate::state_machine::{determine_target_state, ExecutionEvent, ExecutionState, LifecycleState};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug)]
struct ResourceState {
    execution: ExecutionState,
    lifecycle: LifecycleState,
    retry: Option<RetryExecution>,
    rate: RateState,
    expiration: Option<ExpirationState>,
    /// An event arrived that no execution has consumed yet
    event_buffered: bool,
    /// A change event, as opposed to only timer triggers, arrived since the last admission
    change_pending: bool,
    reconciled_generation: Option<i64>,
}

impl ResourceState {
    fn new(configuration: &ControllerConfiguration) -> Self {
        Self {
            execution: ExecutionState::default(),
            lifecycle: LifecycleState::default(),
            retry: None,
            rate: configuration.rate_limiter.init_state(),
            expiration: configuration.expiration.as_ref().map(|policy| policy.init_state()),
            event_buffered: false,
            change_pending: false,
            reconciled_generation: None,
        }
    }

    fn transition(&mut self, id: &ResourceId, event: ExecutionEvent) {
        match determine_target_state(self.execution, event) {
            Ok(target) => {
                if target != self.execution {
                    trace!(resource = %id, from = %self.execution, to = %target, event = event.event_type(), "Execution state transition");
                }
                self.execution = target;
            }
            Err(error) => {
                error!(resource = %id, error = %error, "Rejected execution state transition");
            }
        }
    }
}

/// Per-controller event processor. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReconciliationScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    configuration: Arc<ControllerConfiguration>,
    dispatcher: ReconciliationDispatcher,
    states: DashMap<ResourceId, ResourceState>,
    primaries: DashMap<ResourceId, ManagedResource>,
    freshness: ResourceFreshnessCache,
    expectations: ExpectationManager,
    timers: TimerScheduler,
    timer_events: Mutex<Option<mpsc::UnboundedReceiver<TimerFired>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    permits: Arc<Semaphore>,
    running: AtomicBool,
    stopped: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    events: broadcast::Sender<SchedulerEvent>,
}

impl fmt::Debug for ReconciliationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationScheduler")
            .field("controller", &self.inner.configuration.name())
            .field("running", &self.is_running())
            .field("resources", &self.inner.states.len())
            .field("timers", &self.inner.timers.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl ReconciliationScheduler {
    pub fn new<R: Reconciler>(
        reconciler: R,
        client: Arc<dyn ResourceClient>,
        configuration: ControllerConfiguration,
    ) -> Self {
        Self::with_reconciler(Arc::new(reconciler), client, configuration)
    }

    pub fn with_reconciler(
        reconciler: Arc<dyn Reconciler>,
        client: Arc<dyn ResourceClient>,
        configuration: ControllerConfiguration,
    ) -> Self {
        let configuration = Arc::new(configuration);
        let freshness = ResourceFreshnessCache::new(Arc::clone(&configuration.eviction));
        let expectations = ExpectationManager::new();
        let dispatcher = ReconciliationDispatcher::new(
            reconciler,
            client,
            Arc::clone(&configuration),
            freshness.clone(),
            expectations.clone(),
        );
        let (timer_sender, timer_receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(defaults::SCHEDULER_EVENT_CAPACITY);

        Self {
            inner: Arc::new(SchedulerInner {
                permits: Arc::new(Semaphore::new(configuration.reconciliation_pool_size)),
                configuration,
                dispatcher,
                states: DashMap::new(),
                primaries: DashMap::new(),
                freshness,
                expectations,
                timers: TimerScheduler::new(timer_sender),
                timer_events: Mutex::new(Some(timer_receiver)),
                pump: Mutex::new(None),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                events,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.configuration.name()
    }

    pub fn configuration(&self) -> &ControllerConfiguration {
        &self.inner.configuration
    }

    /// Feeds one change notification. Never blocks on reconciliation.
    ///
    /// Events submitted before [`start`](Self::start) are buffered and processed
    /// once the scheduler starts.
    pub fn submit(&self, id: ResourceId, event: ChangeEvent) {
        self.inner.handle_event(id, event);
    }

    /// Shorthand for an [`ChangeEvent::Upsert`] of `resource`.
    pub fn submit_resource(&self, resource: ManagedResource) {
        let id = resource.id.clone();
        self.submit(id, ChangeEvent::Upsert(resource));
    }

    /// Starts processing. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Stops admitting work, cancels timers and waits up to the termination
    /// timeout for in-flight reconciliations. A stopped scheduler cannot restart.
    pub async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    pub fn execution_state(&self, id: &ResourceId) -> Option<ExecutionState> {
        self.inner.states.get(id).map(|state| state.execution)
    }

    pub fn lifecycle_state(&self, id: &ResourceId) -> Option<LifecycleState> {
        self.inner.states.get(id).map(|state| state.lifecycle)
    }

    pub fn is_timer_scheduled(&self, id: &ResourceId) -> bool {
        self.inner.timers.is_scheduled(id)
    }

    pub fn tracked_resources(&self) -> usize {
        self.inner.states.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn freshness_cache(&self) -> &ResourceFreshnessCache {
        &self.inner.freshness
    }

    pub fn expectations(&self) -> &ExpectationManager {
        &self.inner.expectations
    }
}

impl SchedulerInner {
    fn publish(&self, event: SchedulerEvent) {
        debug!(
            controller = self.configuration.name(),
            resource = %event.resource(),
            event = event.event_type(),
            "Publishing scheduler event"
        );
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn start(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            warn!(controller = self.configuration.name(), "Scheduler was stopped and cannot be restarted");
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let receiver = self.timer_events.lock().take();
        if let Some(receiver) = receiver {
            let pump = tokio::spawn(pump_timer_events(Arc::downgrade(self), receiver));
            *self.pump.lock() = Some(pump);
        }

        let mut buffered = 0usize;
        for mut entry in self.states.iter_mut() {
            if entry.event_buffered {
                let id = entry.key().clone();
                self.submit_for_execution(&id, entry.value_mut());
                buffered += 1;
            }
        }

        info!(
            controller = self.configuration.name(),
            buffered_resources = buffered,
            pool_size = self.configuration.reconciliation_pool_size,
            "▶️ Reconciliation scheduler started"
        );
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);
        self.timers.cancel_all();
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.abort();
        }

        let timeout = self.configuration.termination_timeout;
        let drained = async {
            loop {
                let notified = self.drained.notified();
                if self.in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => {
                info!(controller = self.configuration.name(), "⏹️ Reconciliation scheduler stopped");
                Ok(())
            }
            Err(_) => {
                warn!(
                    controller = self.configuration.name(),
                    in_flight = self.in_flight.load(Ordering::Acquire),
                    timeout_ms = timeout.as_millis() as u64,
                    "Reconciliations still running at shutdown"
                );
                Err(OperatorError::timeout("scheduler shutdown", timeout))
            }
        }
    }

    fn handle_event(self: &Arc<Self>, id: ResourceId, event: ChangeEvent) {
        if self.stopped.load(Ordering::Acquire) {
            debug!(resource = %id, event = event.event_type(), "Scheduler stopped, dropping event");
            return;
        }

        let observed = match event {
            ChangeEvent::Deleted => {
                self.handle_delete_event(&id);
                return;
            }
            ChangeEvent::Trigger => {
                if !self.primaries.contains_key(&id) {
                    debug!(resource = %id, "Trigger for unknown resource ignored");
                    return;
                }
                None
            }
            ChangeEvent::Upsert(resource) => Some(resource),
        };

        let mut entry = self
            .states
            .entry(id.clone())
            .or_insert_with(|| ResourceState::new(&self.configuration));
        let state = entry.value_mut();

        if !state.lifecycle.accepts_events() {
            // An unmarked snapshot after cleanup means the resource was recreated
            // and its delete event was missed
            let recreated = state.lifecycle == LifecycleState::ProcessedMarkForDeletion
                && observed
                    .as_ref()
                    .is_some_and(|resource| !resource.is_marked_for_deletion());
            if !recreated {
                debug!(resource = %id, lifecycle = ?state.lifecycle, "Ignoring event for resource being deleted");
                return;
            }
            info!(resource = %id, "♻️ Resource recreated after cleanup, tracking it again");
            *state = ResourceState::new(&self.configuration);
            self.freshness.evict(&id);
        }

        if let Some(resource) = observed {
            let unchanged_generation = self.configuration.generation_aware
                && !resource.is_marked_for_deletion()
                && state
                    .reconciled_generation
                    .is_some_and(|generation| resource.generation <= generation);
            self.primaries.insert(id.clone(), resource);
            if unchanged_generation {
                debug!(resource = %id, "Generation already reconciled, skipping event");
                return;
            }
            state.change_pending = true;
        }

        state.transition(&id, ExecutionEvent::EventReceived);
        if state.execution.is_executing() {
            debug!(resource = %id, "Reconciliation in flight, event coalesced");
            return;
        }

        state.event_buffered = true;
        if !self.running.load(Ordering::Acquire) {
            debug!(resource = %id, "Scheduler not started, event buffered");
            return;
        }
        self.submit_for_execution(&id, state);
    }

    /// Admits `id` to the worker pool unless it is running, waiting on an
    /// expectation, or rate limited. Callers hold the resource's state entry.
    fn submit_for_execution(self: &Arc<Self>, id: &ResourceId, state: &mut ResourceState) {
        if !state.execution.can_admit() {
            return;
        }
        let Some(observed) = self.primaries.get(id).map(|entry| entry.value().clone()) else {
            debug!(resource = %id, "No snapshot for resource yet, waiting for an upsert");
            return;
        };
        let resource = self.freshness.get_fresh_resource(&observed);

        let mut expectation = None;
        if !resource.is_marked_for_deletion() && self.expectations.is_expectation_present(id) {
            match self.expectations.check_expectation(&resource) {
                Some(result) if result.status == ExpectationStatus::NotYetFulfilled => {
                    debug!(resource = %id, expectation = %result.name, "Skipping reconciliation, expectation not yet fulfilled");
                    if !self.timers.is_scheduled(id) {
                        if let Some(delay) = self.expectations.time_until_deadline(id) {
                            state.transition(id, ExecutionEvent::Defer);
                            self.timers.schedule(id, delay);
                        }
                    }
                    return;
                }
                result => expectation = result,
            }
        }

        if let Some(delay) = self.configuration.rate_limiter.is_limited(&mut state.rate) {
            let delay = delay.max(Duration::from_millis(defaults::MIN_RATE_LIMIT_RESCHEDULE_MS));
            state.transition(id, ExecutionEvent::Defer);
            self.timers.schedule(id, delay);
            info!(resource = %id, delay_ms = delay.as_millis() as u64, "🚦 Rate limited, rescheduling");
            self.publish(SchedulerEvent::RateLimited {
                resource: id.clone(),
                delay,
            });
            return;
        }

        if self.timers.cancel(id) {
            state.transition(id, ExecutionEvent::CancelTimer);
        }
        state.transition(id, ExecutionEvent::Admit);
        state.event_buffered = false;
        let timer_only = !std::mem::take(&mut state.change_pending);
        let retry_info = state.retry.as_ref().map(RetryExecution::info);

        debug!(
            resource = %id,
            version = %resource.resource_version,
            retry_attempt = retry_info.map(|info| info.attempt),
            expectation = ?expectation.as_ref().map(|result| result.status),
            "Submitting reconciliation"
        );

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(self);
        let id = id.clone();
        tokio::spawn(async move {
            let post = match Arc::clone(&inner.permits).acquire_owned().await {
                Ok(_permit) => inner.dispatcher.handle_execution(resource, retry_info, expectation).await,
                Err(_) => PostExecutionControl::failed(OperatorError::internal(
                    "reconciliation pool closed",
                )),
            };
            inner.event_processing_finished(&id, post, timer_only);
            if inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.drained.notify_waiters();
            }
        });
    }

    fn event_processing_finished(
        self: &Arc<Self>,
        id: &ResourceId,
        post: PostExecutionControl,
        timer_only: bool,
    ) {
        let mut deleted = false;
        if let Some(mut entry) = self.states.get_mut(id) {
            let state = entry.value_mut();
            let pending = state.execution.has_pending_event();
            state.transition(id, ExecutionEvent::Finish);

            if state.lifecycle == LifecycleState::DeleteEventPresent {
                deleted = true;
            } else if !self.running.load(Ordering::Acquire) {
                state.event_buffered = pending;
            } else if post.is_success() {
                self.handle_success(id, state, post, pending, timer_only);
            } else {
                self.handle_failure(id, state, post, pending);
            }
        }

        if deleted {
            debug!(resource = %id, "Delete event arrived during reconciliation, dropping state");
            self.cleanup_resource_state(id);
            self.publish(SchedulerEvent::ResourceDeleted {
                resource: id.clone(),
            });
        }
    }

    fn handle_success(
        self: &Arc<Self>,
        id: &ResourceId,
        state: &mut ResourceState,
        post: PostExecutionControl,
        pending: bool,
        timer_only: bool,
    ) {
        state.retry = None;

        if post.finalizer_removed {
            state.lifecycle = LifecycleState::ProcessedMarkForDeletion;
            if self.timers.cancel(id) {
                state.transition(id, ExecutionEvent::CancelTimer);
            }
            self.publish(SchedulerEvent::CleanupCompleted {
                resource: id.clone(),
            });
            return;
        }

        if let Some(generation) = post.reconciled_generation {
            state.reconciled_generation = Some(generation);
        }

        if post.finalizer_added {
            self.publish(SchedulerEvent::FinalizerAdded {
                resource: id.clone(),
            });
        } else if post.cleanup_pending {
            self.publish(SchedulerEvent::CleanupRescheduled {
                resource: id.clone(),
                delay: post.reschedule,
            });
        } else if post.reconciled_generation.is_some() {
            crate::logging::log_reconcile_operation("reconcile", id, "completed", None);
            self.publish(SchedulerEvent::Reconciled {
                resource: id.clone(),
            });
        }

        if pending {
            self.submit_for_execution(id, state);
            return;
        }

        let expiry = state.expiration.as_mut().and_then(|expiration| {
            if timer_only {
                expiration.advance();
            } else {
                expiration.reset();
            }
            expiration.refresh();
            expiration.time_until_expiry()
        });

        // An expectation set by this run is rechecked no later than its deadline
        let deadline = self.expectations.time_until_deadline(id);
        if let Some(delay) = post.reschedule.or(expiry).into_iter().chain(deadline).min() {
            state.transition(id, ExecutionEvent::Defer);
            self.timers.schedule(id, delay);
        }
    }

    fn handle_failure(
        self: &Arc<Self>,
        id: &ResourceId,
        state: &mut ResourceState,
        mut post: PostExecutionControl,
        pending: bool,
    ) {
        let Some(error) = post.error.take() else {
            return;
        };
        if post.no_retry || !error.is_retryable() {
            state.retry = None;
            error!(resource = %id, error = %error, "❌ Reconciliation failed, not retrying");
            self.publish(SchedulerEvent::FailedWithoutRetry {
                resource: id.clone(),
                error,
            });
            if pending {
                self.submit_for_execution(id, state);
            } else if let Some(delay) = post.reschedule {
                state.transition(id, ExecutionEvent::Defer);
                self.timers.schedule(id, delay);
            }
            return;
        }

        let retry = state
            .retry
            .get_or_insert_with(|| self.configuration.retry.init_execution_after_first_attempt());

        if pending {
            // The follow-up run for the new event counts as an attempt
            if retry.next_delay().is_some() {
                warn!(
                    resource = %id,
                    error = %error,
                    attempt = retry.attempt_index(),
                    "Reconciliation failed, new event pending, running again"
                );
            } else {
                error!(resource = %id, error = %error, attempts = retry.attempt_index(), "❌ Retries exhausted, running again for new event");
                state.retry = None;
                self.publish(SchedulerEvent::RetriesExhausted {
                    resource: id.clone(),
                    error,
                });
            }
            self.submit_for_execution(id, state);
            return;
        }

        match retry.next_delay() {
            Some(delay) => {
                let attempt = retry.attempt_index();
                let delay = if error.is_conflict() { Duration::ZERO } else { delay };
                warn!(
                    resource = %id,
                    error = %error,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "🔄 Reconciliation failed, retry scheduled"
                );
                state.transition(id, ExecutionEvent::Defer);
                self.timers.schedule(id, delay);
                self.publish(SchedulerEvent::RetryScheduled {
                    resource: id.clone(),
                    attempt,
                    delay,
                    error,
                });
            }
            None => {
                error!(
                    resource = %id,
                    error = %error,
                    attempts = retry.attempt_index(),
                    "❌ Retries exhausted"
                );
                state.retry = None;
                self.publish(SchedulerEvent::RetriesExhausted {
                    resource: id.clone(),
                    error,
                });
            }
        }
    }

    fn handle_delete_event(&self, id: &ResourceId) {
        self.primaries.remove(id);

        let mut executing = false;
        if let Some(mut entry) = self.states.get_mut(id) {
            if entry.execution.is_executing() {
                entry.lifecycle = LifecycleState::DeleteEventPresent;
                executing = true;
            }
        }
        if executing {
            debug!(resource = %id, "Delete event during reconciliation, deferring cleanup");
            return;
        }

        self.cleanup_resource_state(id);
        info!(resource = %id, "🗑️ Resource deleted, state dropped");
        self.publish(SchedulerEvent::ResourceDeleted {
            resource: id.clone(),
        });
    }

    fn cleanup_resource_state(&self, id: &ResourceId) {
        self.states.remove(id);
        self.primaries.remove(id);
        self.timers.cancel(id);
        self.freshness.evict(id);
        self.expectations.cleanup(id);
    }
}

async fn pump_timer_events(
    scheduler: Weak<SchedulerInner>,
    mut receiver: mpsc::UnboundedReceiver<TimerFired>,
) {
    while let Some((id, token)) = receiver.recv().await {
        let Some(inner) = scheduler.upgrade() else {
            break;
        };
        if inner.timers.fired(&id, token) {
            inner.handle_event(id, ChangeEvent::Trigger);
        }
    }
}
