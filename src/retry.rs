//! # Retry Policies
//!
//! Backoff computation for failed reconciliations.
//!
//! [`GenericRetry`] is the immutable policy; [`RetryExecution`] carries the mutable
//! per-resource progress (attempt index, current interval, accumulated delay).
//! The first call to [`RetryExecution::next_delay`] always yields zero so the
//! initial attempt is never artificially delayed. Later calls yield the initial
//! interval and then grow it by the multiplier, capped at the maximum interval.
//!
//! ```rust
//! use operator_core::retry::GenericRetry;
//! use std::time::Duration;
//!
//! let policy = GenericRetry::default()
//!     .with_initial_interval(Duration::from_millis(100))
//!     .with_multiplier(2.0)
//!     .with_max_attempts(4);
//! let mut execution = policy.init_execution();
//!
//! let delays: Vec<_> = std::iter::from_fn(|| execution.next_delay()).collect();
//! assert_eq!(
//!     delays,
//!     vec![0, 100, 200, 400]
//!         .into_iter()
//!         .map(Duration::from_millis)
//!         .collect::<Vec<_>>()
//! );
//! ```

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential, linear or disabled backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRetry {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
    /// `None` means unlimited.
    max_attempts: Option<u32>,
    max_elapsed: Option<Duration>,
}

impl Default for GenericRetry {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(defaults::RETRY_INITIAL_INTERVAL_MS),
            multiplier: defaults::RETRY_MULTIPLIER,
            max_interval: Some(Duration::from_millis(defaults::RETRY_MAX_INTERVAL_MS)),
            max_attempts: Some(defaults::RETRY_MAX_ATTEMPTS.unsigned_abs()),
            max_elapsed: None,
        }
    }
}

impl GenericRetry {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Fixed-interval retries.
    pub fn linear(interval: Duration, max_attempts: i32) -> Self {
        Self::default()
            .with_initial_interval(interval)
            .with_multiplier(1.0)
            .with_max_interval(None)
            .with_max_attempts(max_attempts)
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Option<Duration>) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Negative values mean unlimited attempts.
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = u32::try_from(max_attempts).ok();
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Option<Duration>) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_interval(&self) -> Option<Duration> {
        self.max_interval
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_attempts.is_none() && self.max_elapsed.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "retry multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_attempts == Some(0) {
            return Err("retry max_attempts must be at least 1 (1 disables retry)".to_string());
        }
        if let Some(max_interval) = self.max_interval {
            if max_interval < self.initial_interval {
                return Err(format!(
                    "retry max_interval ({}ms) is lower than initial_interval ({}ms)",
                    max_interval.as_millis(),
                    self.initial_interval.as_millis()
                ));
            }
        }
        Ok(())
    }

    pub fn init_execution(&self) -> RetryExecution {
        RetryExecution {
            policy: self.clone(),
            attempt_index: 0,
            current_interval: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Execution state for a resource whose first attempt already ran and failed.
    pub fn init_execution_after_first_attempt(&self) -> RetryExecution {
        let mut execution = self.init_execution();
        let _ = execution.next_delay();
        execution
    }

    fn capped(&self, interval: Duration) -> Duration {
        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

/// Per-resource retry progress.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExecution {
    policy: GenericRetry,
    attempt_index: u32,
    current_interval: Duration,
    elapsed: Duration,
}

impl RetryExecution {
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.peek_delay()?;
        if self.attempt_index > 0 {
            self.current_interval = delay;
        }
        self.attempt_index += 1;
        self.elapsed = self.elapsed.saturating_add(delay);
        Some(delay)
    }

    /// Whether the next call to [`next_delay`](Self::next_delay) returns `None`.
    pub fn is_last_attempt(&self) -> bool {
        self.peek_delay().is_none()
    }

    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn policy(&self) -> &GenericRetry {
        &self.policy
    }

    pub fn info(&self) -> RetryInfo {
        RetryInfo {
            attempt: self.attempt_index,
            last_attempt: self.is_last_attempt(),
        }
    }

    fn peek_delay(&self) -> Option<Duration> {
        if let Some(max_attempts) = self.policy.max_attempts {
            if self.attempt_index >= max_attempts {
                return None;
            }
        }

        let delay = match self.attempt_index {
            0 => Duration::ZERO,
            1 => self.policy.capped(self.policy.initial_interval),
            _ => {
                // Whole nanoseconds keep a multiplier of 1.0 exact
                let grown = self.current_interval.as_nanos() as f64 * self.policy.multiplier;
                let grown = if grown >= u64::MAX as f64 {
                    Duration::MAX
                } else {
                    Duration::from_nanos(grown as u64)
                };
                self.policy.capped(grown)
            }
        };

        if let Some(max_elapsed) = self.policy.max_elapsed {
            if self.elapsed.saturating_add(delay) > max_elapsed {
                return None;
            }
        }
        Some(delay)
    }
}

/// Retry progress exposed to reconcilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// 1-based number of the run in progress; the first retry is attempt 2.
    pub attempt: u32,
    pub last_attempt: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn exponential() -> GenericRetry {
        GenericRetry::default()
            .with_initial_interval(ms(100))
            .with_multiplier(2.0)
            .with_max_interval(None)
            .with_max_attempts(4)
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut execution = exponential().init_execution();
        assert_eq!(execution.next_delay(), Some(ms(0)));
        assert_eq!(execution.next_delay(), Some(ms(100)));
        assert_eq!(execution.next_delay(), Some(ms(200)));
        assert!(!execution.is_last_attempt());
        assert_eq!(execution.next_delay(), Some(ms(400)));
        assert!(execution.is_last_attempt());
        assert_eq!(execution.next_delay(), None);
        assert_eq!(execution.elapsed(), ms(700));
    }

    #[test]
    fn test_max_interval_caps_growth() {
        let mut execution = exponential()
            .with_max_interval(Some(ms(250)))
            .with_max_attempts(6)
            .init_execution();
        let delays: Vec<_> = std::iter::from_fn(|| execution.next_delay()).collect();
        assert_eq!(delays, vec![ms(0), ms(100), ms(200), ms(250), ms(250), ms(250)]);
    }

    #[test]
    fn test_linear_retry() {
        let mut execution = GenericRetry::linear(ms(300), 3).init_execution();
        let delays: Vec<_> = std::iter::from_fn(|| execution.next_delay()).collect();
        assert_eq!(delays, vec![ms(0), ms(300), ms(300)]);
    }

    #[test]
    fn test_no_retry_allows_only_first_attempt() {
        let mut execution = GenericRetry::no_retry().init_execution_after_first_attempt();
        assert!(execution.is_last_attempt());
        assert_eq!(execution.next_delay(), None);
    }

    #[test]
    fn test_max_elapsed_terminates_unlimited_attempts() {
        let mut execution = exponential()
            .with_max_attempts(-1)
            .with_max_elapsed(Some(ms(350)))
            .init_execution();
        assert_eq!(execution.next_delay(), Some(ms(0)));
        assert_eq!(execution.next_delay(), Some(ms(100)));
        assert_eq!(execution.next_delay(), Some(ms(200)));
        // 300 elapsed + 400 would exceed 350
        assert!(execution.is_last_attempt());
        assert_eq!(execution.next_delay(), None);
    }

    #[test]
    fn test_unlimited_policy_keeps_going() {
        let policy = exponential()
            .with_max_attempts(-1)
            .with_max_interval(Some(ms(1_000)));
        assert!(policy.is_unlimited());
        let mut execution = policy.init_execution();
        for _ in 0..100 {
            assert!(execution.next_delay().is_some());
        }
        assert_eq!(execution.current_interval(), ms(1_000));
    }

    #[test]
    fn test_validation() {
        assert!(GenericRetry::default().validate().is_ok());
        assert!(exponential().with_multiplier(0.5).validate().is_err());
        assert!(exponential().with_max_attempts(0).validate().is_err());
        assert!(exponential()
            .with_max_interval(Some(ms(10)))
            .validate()
            .is_err());
    }

    #[test]
    fn test_retry_info() {
        let execution = exponential().init_execution_after_first_attempt();
        assert_eq!(
            execution.info(),
            RetryInfo {
                attempt: 1,
                last_attempt: false
            }
        );
    }
}
