//! # Expiration Policy
//!
//! Answers "has enough time passed since the last refresh" for periodic
//! re-triggering of idle resources (the max reconciliation interval).
//!
//! The interval sequence comes from a [`GenericRetry`]: a fixed policy repeats one
//! interval forever, a backoff policy stretches the interval each time an idle
//! resource is re-triggered without any real change, and resets when a real
//! change arrives.

use crate::retry::{GenericRetry, RetryExecution};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct ExpirationPolicy {
    intervals: GenericRetry,
}

impl ExpirationPolicy {
    /// The same interval after every refresh.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            intervals: GenericRetry::linear(interval, -1).with_max_interval(Some(interval)),
        }
    }

    /// Intervals that grow while the resource stays idle.
    pub fn backoff(intervals: GenericRetry) -> Self {
        Self { intervals }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.intervals.initial_interval().is_zero() {
            return Err("max reconciliation interval must be greater than 0".to_string());
        }
        self.intervals.validate()
    }

    pub fn init_state(&self) -> ExpirationState {
        ExpirationState::new(self.intervals.clone())
    }
}

/// Refresh bookkeeping for one resource.
#[derive(Debug, Clone)]
pub struct ExpirationState {
    policy: GenericRetry,
    execution: RetryExecution,
    interval: Option<Duration>,
    last_refresh: Instant,
}

impl ExpirationState {
    fn new(policy: GenericRetry) -> Self {
        let mut execution = policy.init_execution_after_first_attempt();
        let interval = execution.next_delay();
        Self {
            policy,
            execution,
            interval,
            last_refresh: Instant::now(),
        }
    }

    pub fn refresh(&mut self) {
        self.refresh_at(Instant::now());
    }

    pub fn refresh_at(&mut self, now: Instant) {
        self.last_refresh = now;
    }

    /// Moves to the next, possibly longer, interval.
    pub fn advance(&mut self) {
        self.interval = self.execution.next_delay();
    }

    /// Restarts the interval sequence.
    pub fn reset(&mut self) {
        *self = Self {
            last_refresh: self.last_refresh,
            ..Self::new(self.policy.clone())
        };
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.interval
            .map(|interval| now >= self.last_refresh + interval)
            .unwrap_or(false)
    }

    /// Time left until the next expiry; `None` once the policy stops re-triggering.
    pub fn time_until_expiry_at(&self, now: Instant) -> Option<Duration> {
        self.interval
            .map(|interval| (self.last_refresh + interval).saturating_duration_since(now))
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.time_until_expiry_at(Instant::now())
    }
}
