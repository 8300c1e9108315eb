//! # Rate Limiting
//!
//! Fixed-window throttle applied per resource before a reconciliation is admitted.
//! The window resets lazily: the first check after the period has elapsed starts a
//! new window.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Permits-per-period limiter. A zero period disables limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearRateLimiter {
    refresh_period: Duration,
    limit_for_period: u32,
}

impl LinearRateLimiter {
    pub fn new(refresh_period: Duration, limit_for_period: u32) -> Self {
        Self {
            refresh_period,
            limit_for_period,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn is_activated(&self) -> bool {
        !self.refresh_period.is_zero()
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    pub fn limit_for_period(&self) -> u32 {
        self.limit_for_period
    }

    /// An active limiter must grant at least one permit per period.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_activated() && self.limit_for_period == 0 {
            return Err(format!(
                "rate limit of 0 permits per {}ms would block every reconciliation",
                self.refresh_period.as_millis()
            ));
        }
        Ok(())
    }

    pub fn init_state(&self) -> RateState {
        RateState::new()
    }

    /// Consumes a permit, or returns how long until the window resets.
    pub fn is_limited(&self, state: &mut RateState) -> Option<Duration> {
        self.is_limited_at(state, Instant::now())
    }

    pub fn is_limited_at(&self, state: &mut RateState, now: Instant) -> Option<Duration> {
        if !self.is_activated() {
            return None;
        }

        let window_end = state.window_start + self.refresh_period;
        if now >= window_end {
            state.window_start = now;
            state.permits_consumed = 0;
        }

        if state.permits_consumed < self.limit_for_period {
            state.permits_consumed += 1;
            return None;
        }

        Some((state.window_start + self.refresh_period).saturating_duration_since(now))
    }
}

impl Default for LinearRateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Window bookkeeping for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    window_start: Instant,
    permits_consumed: u32,
}

impl RateState {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            permits_consumed: 0,
        }
    }

    pub fn permits_consumed(&self) -> u32 {
        self.permits_consumed
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }
}

impl Default for RateState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_single_permit_window() {
        let limiter = LinearRateLimiter::new(Duration::from_millis(1_000), 1);
        let mut state = limiter.init_state();

        assert_eq!(limiter.is_limited(&mut state), None);

        tokio::time::advance(Duration::from_millis(1)).await;
        let remaining = limiter
            .is_limited(&mut state)
            .expect("second call within the window is limited");
        assert!(remaining > Duration::ZERO);
        assert!(remaining < Duration::from_millis(1_000));

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert_eq!(limiter.is_limited(&mut state), None);
        assert_eq!(state.permits_consumed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_time_shrinks() {
        let limiter = LinearRateLimiter::new(Duration::from_millis(1_000), 2);
        let mut state = limiter.init_state();
        assert!(limiter.is_limited(&mut state).is_none());
        assert!(limiter.is_limited(&mut state).is_none());

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(
            limiter.is_limited(&mut state),
            Some(Duration::from_millis(600))
        );
    }

    #[test]
    fn test_zero_period_disables_limiting() {
        let limiter = LinearRateLimiter::new(Duration::ZERO, 1);
        let mut state = limiter.init_state();
        for _ in 0..10 {
            assert_eq!(limiter.is_limited(&mut state), None);
        }
        assert_eq!(state.permits_consumed(), 0);
    }
}
