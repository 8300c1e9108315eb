//! # Operator Configuration
//!
//! YAML-backed configuration for the scheduler and workflow engine. Every section
//! has defaults, so an empty document is a valid configuration, and every section
//! validates itself before a controller is registered.
//!
//! ## Usage
//!
//! ```rust
//! use operator_core::config::ConfigurationManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigurationManager::load_from_yaml_with_env(
//!     r#"
//! retry:
//!   initial_interval_ms: 500
//!   max_attempts: 3
//! rate_limit:
//!   permits: 10
//!   period_ms: 1000
//! "#,
//!     "test",
//! )?;
//!
//! let config = manager.config();
//! assert_eq!(config.retry.max_attempts, 3);
//! assert!(config.rate_limit.to_limiter().is_activated());
//! # Ok(())
//! # }
//! ```

pub mod loader;

pub use loader::ConfigurationManager;

use crate::constants::defaults;
use crate::error::{OperatorError, Result};
use crate::expiration::ExpirationPolicy;
use crate::rate_limiter::LinearRateLimiter;
use crate::retry::GenericRetry;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub executor: ExecutorConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub reconciliation: ReconciliationConfig,
    pub workflow: WorkflowConfig,
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        self.executor
            .validate()
            .and_then(|_| self.retry.validate())
            .and_then(|_| self.rate_limit.validate())
            .and_then(|_| self.reconciliation.validate())
            .map_err(OperatorError::Configuration)
    }
}

/// Worker pools and shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub reconciliation_pool_size: usize,
    pub workflow_pool_size: usize,
    pub termination_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            reconciliation_pool_size: defaults::RECONCILIATION_POOL_SIZE,
            workflow_pool_size: defaults::WORKFLOW_POOL_SIZE,
            termination_timeout_ms: defaults::TERMINATION_TIMEOUT_MS,
        }
    }
}

impl ExecutorConfig {
    pub fn termination_timeout(&self) -> Duration {
        Duration::from_millis(self.termination_timeout_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.reconciliation_pool_size == 0 {
            return Err("executor.reconciliation_pool_size must be greater than 0".to_string());
        }
        if self.workflow_pool_size == 0 {
            return Err("executor.workflow_pool_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Backoff for failed reconciliations. `max_attempts: -1` is unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: Option<u64>,
    pub max_attempts: i32,
    pub max_elapsed_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: defaults::RETRY_INITIAL_INTERVAL_MS,
            multiplier: defaults::RETRY_MULTIPLIER,
            max_interval_ms: Some(defaults::RETRY_MAX_INTERVAL_MS),
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            max_elapsed_ms: None,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> GenericRetry {
        GenericRetry::default()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_interval_ms.map(Duration::from_millis))
            .with_max_attempts(self.max_attempts)
            .with_max_elapsed(self.max_elapsed_ms.map(Duration::from_millis))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts < -1 {
            return Err(format!(
                "retry.max_attempts must be -1 (unlimited) or a positive count, got {}",
                self.max_attempts
            ));
        }
        self.to_policy().validate()
    }
}

/// Per-resource throttle; `period_ms: 0` disables it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub permits: u32,
    pub period_ms: u64,
}

impl RateLimitConfig {
    pub fn to_limiter(&self) -> LinearRateLimiter {
        LinearRateLimiter::new(Duration::from_millis(self.period_ms), self.permits)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.to_limiter()
            .validate()
            .map_err(|reason| format!("rate_limit: {reason}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Idle resources are re-reconciled after this long; `None` disables it
    pub max_reconciliation_interval_ms: Option<u64>,
    pub use_finalizer: bool,
    /// Defaults to `<controller name>/finalizer`
    pub finalizer: Option<String>,
    /// Delay before re-running a cleanup that left dependents behind
    pub cleanup_reschedule_ms: u64,
    /// Skip update events that did not advance the generation
    pub generation_aware: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_reconciliation_interval_ms: Some(defaults::MAX_RECONCILIATION_INTERVAL_MS),
            use_finalizer: true,
            finalizer: None,
            cleanup_reschedule_ms: defaults::CLEANUP_RESCHEDULE_MS,
            generation_aware: false,
        }
    }
}

impl ReconciliationConfig {
    pub fn expiration_policy(&self) -> Option<ExpirationPolicy> {
        self.max_reconciliation_interval_ms
            .map(|interval| ExpirationPolicy::fixed(Duration::from_millis(interval)))
    }

    pub fn cleanup_reschedule(&self) -> Duration {
        Duration::from_millis(self.cleanup_reschedule_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_reconciliation_interval_ms == Some(0) {
            return Err(
                "reconciliation.max_reconciliation_interval_ms must be greater than 0 or omitted"
                    .to_string(),
            );
        }
        if let Some(finalizer) = &self.finalizer {
            if finalizer.trim().is_empty() {
                return Err("reconciliation.finalizer must not be blank".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Return node errors in the result instead of failing the reconciliation
    pub silent_exception_handling: bool,
    /// The reconciler drives the workflow itself through its context
    pub explicit_invocation: bool,
}
