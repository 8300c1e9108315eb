//! # Expectations
//!
//! Cooperative, time-bounded waiting. The scheduler never preempts a running
//! reconciler, so code that waits on the external system bounds its own waiting
//! here and fails with [`OperatorError::Timeout`] when the bound is exceeded.
//!
//! - [`ExpectationManager`] registers a named predicate per resource that later
//!   reconciliations check without blocking.
//! - [`wait_for_condition`] polls inside one reconciliation until a value appears.

use crate::error::{OperatorError, Result};
use crate::resource::{ManagedResource, ResourceId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type ExpectationPredicate = Arc<dyn Fn(&ManagedResource) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationStatus {
    Fulfilled,
    NotYetFulfilled,
    TimedOut,
}

impl fmt::Display for ExpectationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::NotYetFulfilled => write!(f, "not_yet_fulfilled"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationResult {
    pub name: String,
    pub status: ExpectationStatus,
}

impl ExpectationResult {
    pub fn is_fulfilled(&self) -> bool {
        self.status == ExpectationStatus::Fulfilled
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == ExpectationStatus::TimedOut
    }
}

#[derive(Clone)]
struct Expectation {
    name: String,
    predicate: ExpectationPredicate,
    deadline: Instant,
}

/// One outstanding expectation per resource.
#[derive(Default, Clone)]
pub struct ExpectationManager {
    expectations: Arc<DashMap<ResourceId, Expectation>>,
}

impl fmt::Debug for ExpectationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectationManager")
            .field("outstanding", &self.expectations.len())
            .finish()
    }
}

impl ExpectationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an expectation, replacing any previous one for the resource.
    pub fn set_expectation<F>(
        &self,
        id: &ResourceId,
        name: impl Into<String>,
        timeout: Duration,
        predicate: F,
    ) where
        F: Fn(&ManagedResource) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(resource = %id, expectation = %name, timeout_ms = timeout.as_millis() as u64, "Registering expectation");
        self.expectations.insert(
            id.clone(),
            Expectation {
                name,
                predicate: Arc::new(predicate),
                deadline: Instant::now() + timeout,
            },
        );
    }

    /// Evaluates the outstanding expectation; fulfilled and timed out ones are removed.
    pub fn check_expectation(&self, resource: &ManagedResource) -> Option<ExpectationResult> {
        let expectation = self.expectations.get(&resource.id)?.value().clone();

        let status = if (expectation.predicate)(resource) {
            ExpectationStatus::Fulfilled
        } else if Instant::now() >= expectation.deadline {
            ExpectationStatus::TimedOut
        } else {
            ExpectationStatus::NotYetFulfilled
        };

        if status != ExpectationStatus::NotYetFulfilled {
            self.expectations.remove(&resource.id);
        }
        debug!(resource = %resource.id, expectation = %expectation.name, status = %status, "Checked expectation");

        Some(ExpectationResult {
            name: expectation.name,
            status,
        })
    }

    /// Time left before the outstanding expectation times out; zero once overdue.
    pub fn time_until_deadline(&self, id: &ResourceId) -> Option<Duration> {
        self.expectations
            .get(id)
            .map(|expectation| expectation.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expectation_present(&self, id: &ResourceId) -> bool {
        self.expectations.contains_key(id)
    }

    pub fn cleanup(&self, id: &ResourceId) {
        self.expectations.remove(id);
    }
}

/// Polls `check` until it yields a value or `timeout` elapses.
pub async fn wait_for_condition<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let polling = async {
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, polling).await {
        Ok(result) => result,
        Err(_) => Err(OperatorError::timeout(operation, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn resource(ready: bool) -> ManagedResource {
        ManagedResource::new(ResourceId::new("db"), json!({}))
            .with_status(json!({ "ready": ready }))
    }

    fn is_ready(resource: &ManagedResource) -> bool {
        resource
            .status
            .as_ref()
            .and_then(|status| status.get("ready"))
            .and_then(|ready| ready.as_bool())
            .unwrap_or(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_expectation_lifecycle() {
        let manager = ExpectationManager::new();
        let id = ResourceId::new("db");
        manager.set_expectation(&id, "ready", Duration::from_secs(30), is_ready);

        let result = manager.check_expectation(&resource(false)).unwrap();
        assert_eq!(result.status, ExpectationStatus::NotYetFulfilled);
        assert!(manager.is_expectation_present(&id));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(manager.time_until_deadline(&id), Some(Duration::from_secs(20)));

        let result = manager.check_expectation(&resource(true)).unwrap();
        assert!(result.is_fulfilled());
        assert!(!manager.is_expectation_present(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expectation_times_out() {
        let manager = ExpectationManager::new();
        manager.set_expectation(&ResourceId::new("db"), "ready", Duration::from_secs(5), is_ready);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(
            manager.time_until_deadline(&ResourceId::new("db")),
            Some(Duration::ZERO)
        );
        let result = manager.check_expectation(&resource(false)).unwrap();
        assert!(result.is_timed_out());
        assert!(manager.check_expectation(&resource(false)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_condition_returns_value() {
        let polls = AtomicU32::new(0);
        let value = wait_for_condition("replicas", Duration::from_secs(5), Duration::from_millis(100), || {
            let count = polls.fetch_add(1, Ordering::SeqCst);
            async move { Ok((count >= 3).then_some(count)) }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_condition_times_out() {
        let result: Result<()> = wait_for_condition(
            "never",
            Duration::from_millis(500),
            Duration::from_millis(100),
            || async { Ok(None) },
        )
        .await;
        let error = result.unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(
            error,
            OperatorError::Timeout {
                operation: "never".to_string(),
                timeout_ms: 500
            }
        );
    }
}
