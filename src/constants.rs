//! # System Constants
//!
//! Default policy values and scheduler event names shared across the crate.

/// Default values for retry, rate limiting and scheduling policies.
pub mod defaults {
    pub const RETRY_INITIAL_INTERVAL_MS: u64 = 2_000;
    pub const RETRY_MULTIPLIER: f64 = 1.5;
    pub const RETRY_MAX_ATTEMPTS: i32 = 5;
    /// `initial * multiplier^max_attempts`, rounded down.
    pub const RETRY_MAX_INTERVAL_MS: u64 = 15_187;

    /// Lower bound applied to rate-limit reschedules so a nearly-elapsed window
    /// does not spin the timer.
    pub const MIN_RATE_LIMIT_RESCHEDULE_MS: u64 = 50;

    pub const MAX_RECONCILIATION_INTERVAL_MS: u64 = 10 * 60 * 60 * 1_000;
    pub const CLEANUP_RESCHEDULE_MS: u64 = 5_000;

    pub const RECONCILIATION_POOL_SIZE: usize = 50;
    pub const WORKFLOW_POOL_SIZE: usize = 20;
    pub const TERMINATION_TIMEOUT_MS: u64 = 10_000;

    pub const SCHEDULER_EVENT_CAPACITY: usize = 1_024;
    pub const FINALIZER_SUFFIX: &str = "/finalizer";
}

/// Event names emitted on the scheduler event stream and in structured logs.
pub mod events {
    pub const RECONCILED: &str = "reconcile.completed";
    pub const RETRY_SCHEDULED: &str = "reconcile.retry_scheduled";
    pub const RETRIES_EXHAUSTED: &str = "reconcile.retries_exhausted";
    pub const FAILED_WITHOUT_RETRY: &str = "reconcile.failed_without_retry";
    pub const RATE_LIMITED: &str = "reconcile.rate_limited";
    pub const FINALIZER_ADDED: &str = "reconcile.finalizer_added";
    pub const CLEANUP_COMPLETED: &str = "cleanup.completed";
    pub const CLEANUP_RESCHEDULED: &str = "cleanup.rescheduled";
    pub const RESOURCE_DELETED: &str = "resource.deleted";
}

/// Default finalizer name for a controller.
pub fn default_finalizer_name(controller_name: &str) -> String {
    format!("{controller_name}{}", defaults::FINALIZER_SUFFIX)
}
