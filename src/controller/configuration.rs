//! Per-controller settings, assembled from [`OperatorConfig`] and code.

use crate::cache::eviction::{EvictionPredicate, OptimisticLockEquality, VersionOrdering};
use crate::config::OperatorConfig;
use crate::constants::default_finalizer_name;
use crate::error::{OperatorError, Result};
use crate::expiration::ExpirationPolicy;
use crate::rate_limiter::LinearRateLimiter;
use crate::retry::GenericRetry;
use crate::workflow::{Workflow, WorkflowBuilder};
use std::sync::Arc;
use std::time::Duration;

/// Validated settings for one controller.
#[derive(Debug, Clone)]
pub struct ControllerConfiguration {
    pub(crate) name: String,
    pub(crate) retry: GenericRetry,
    pub(crate) rate_limiter: LinearRateLimiter,
    pub(crate) expiration: Option<ExpirationPolicy>,
    pub(crate) finalizer: Option<String>,
    pub(crate) cleanup_reschedule: Duration,
    pub(crate) generation_aware: bool,
    pub(crate) reconciliation_pool_size: usize,
    pub(crate) termination_timeout: Duration,
    pub(crate) eviction: Arc<dyn EvictionPredicate>,
    pub(crate) workflow: Option<Workflow>,
}

impl ControllerConfiguration {
    pub fn builder(name: impl Into<String>) -> ControllerConfigurationBuilder {
        ControllerConfigurationBuilder::from_config(name, &OperatorConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retry(&self) -> &GenericRetry {
        &self.retry
    }

    pub fn rate_limiter(&self) -> &LinearRateLimiter {
        &self.rate_limiter
    }

    /// `None` when the controller does not use a finalizer.
    pub fn finalizer(&self) -> Option<&str> {
        self.finalizer.as_deref()
    }

    pub fn is_generation_aware(&self) -> bool {
        self.generation_aware
    }

    pub fn eviction_predicate(&self) -> &Arc<dyn EvictionPredicate> {
        &self.eviction
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.workflow.as_ref()
    }
}

/// Builder for [`ControllerConfiguration`].
///
/// The freshness-cache eviction rule has no default and must be chosen with
/// [`eviction_predicate`](Self::eviction_predicate), [`version_ordering`](Self::version_ordering)
/// or [`optimistic_lock_equality`](Self::optimistic_lock_equality).
#[derive(Debug)]
pub struct ControllerConfigurationBuilder {
    name: String,
    retry: GenericRetry,
    rate_limiter: LinearRateLimiter,
    expiration: Option<ExpirationPolicy>,
    use_finalizer: bool,
    finalizer: Option<String>,
    cleanup_reschedule: Duration,
    generation_aware: bool,
    reconciliation_pool_size: usize,
    workflow_pool_size: usize,
    termination_timeout: Duration,
    silent_workflow: bool,
    explicit_workflow_invocation: bool,
    eviction: Option<Arc<dyn EvictionPredicate>>,
    workflow: Option<WorkflowBuilder>,
}

impl ControllerConfigurationBuilder {
    /// Seeds every setting from the operator-wide configuration.
    pub fn from_config(name: impl Into<String>, config: &OperatorConfig) -> Self {
        Self {
            name: name.into(),
            retry: config.retry.to_policy(),
            rate_limiter: config.rate_limit.to_limiter(),
            expiration: config.reconciliation.expiration_policy(),
            use_finalizer: config.reconciliation.use_finalizer,
            finalizer: config.reconciliation.finalizer.clone(),
            cleanup_reschedule: config.reconciliation.cleanup_reschedule(),
            generation_aware: config.reconciliation.generation_aware,
            reconciliation_pool_size: config.executor.reconciliation_pool_size,
            workflow_pool_size: config.executor.workflow_pool_size,
            termination_timeout: config.executor.termination_timeout(),
            silent_workflow: config.workflow.silent_exception_handling,
            explicit_workflow_invocation: config.workflow.explicit_invocation,
            eviction: None,
            workflow: None,
        }
    }

    pub fn retry(mut self, retry: GenericRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn rate_limiter(mut self, rate_limiter: LinearRateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// `None` disables periodic re-reconciliation.
    pub fn max_reconciliation_interval(mut self, expiration: Option<ExpirationPolicy>) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn use_finalizer(mut self, use_finalizer: bool) -> Self {
        self.use_finalizer = use_finalizer;
        self
    }

    pub fn finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizer = Some(finalizer.into());
        self
    }

    pub fn cleanup_reschedule(mut self, delay: Duration) -> Self {
        self.cleanup_reschedule = delay;
        self
    }

    pub fn generation_aware(mut self, generation_aware: bool) -> Self {
        self.generation_aware = generation_aware;
        self
    }

    pub fn reconciliation_pool_size(mut self, pool_size: usize) -> Self {
        self.reconciliation_pool_size = pool_size;
        self
    }

    pub fn workflow_pool_size(mut self, pool_size: usize) -> Self {
        self.workflow_pool_size = pool_size;
        self
    }

    pub fn termination_timeout(mut self, timeout: Duration) -> Self {
        self.termination_timeout = timeout;
        self
    }

    pub fn silent_workflow(mut self, silent: bool) -> Self {
        self.silent_workflow = silent;
        self
    }

    pub fn explicit_workflow_invocation(mut self, explicit: bool) -> Self {
        self.explicit_workflow_invocation = explicit;
        self
    }

    pub fn eviction_predicate(mut self, predicate: Arc<dyn EvictionPredicate>) -> Self {
        self.eviction = Some(predicate);
        self
    }

    pub fn version_ordering(self) -> Self {
        self.eviction_predicate(Arc::new(VersionOrdering))
    }

    pub fn optimistic_lock_equality(self) -> Self {
        self.eviction_predicate(Arc::new(OptimisticLockEquality))
    }

    /// Managed workflow. Its silent, explicit-invocation and pool settings come from this builder.
    pub fn workflow(mut self, workflow: WorkflowBuilder) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn build(self) -> Result<ControllerConfiguration> {
        if self.name.trim().is_empty() {
            return Err(OperatorError::configuration("controller name must not be empty"));
        }
        self.retry.validate().map_err(OperatorError::Configuration)?;
        self.rate_limiter.validate().map_err(|reason| {
            OperatorError::configuration(format!("controller '{}': {reason}", self.name))
        })?;
        if let Some(expiration) = &self.expiration {
            expiration.validate().map_err(|reason| {
                OperatorError::configuration(format!("controller '{}': {reason}", self.name))
            })?;
        }
        if self.reconciliation_pool_size == 0 {
            return Err(OperatorError::configuration(format!(
                "controller '{}': reconciliation pool size must be greater than 0",
                self.name
            )));
        }
        let eviction = self.eviction.ok_or_else(|| {
            OperatorError::configuration(format!(
                "controller '{}': an eviction predicate for the freshness cache must be chosen",
                self.name
            ))
        })?;

        let finalizer = if self.use_finalizer {
            let finalizer = self
                .finalizer
                .unwrap_or_else(|| default_finalizer_name(&self.name));
            if finalizer.trim().is_empty() {
                return Err(OperatorError::configuration(format!(
                    "controller '{}': finalizer must not be blank",
                    self.name
                )));
            }
            Some(finalizer)
        } else {
            None
        };

        let workflow = self
            .workflow
            .map(|builder| {
                builder
                    .silent(self.silent_workflow)
                    .explicit_invocation(self.explicit_workflow_invocation)
                    .pool_size(self.workflow_pool_size)
                    .build()
            })
            .transpose()?;

        Ok(ControllerConfiguration {
            name: self.name,
            retry: self.retry,
            rate_limiter: self.rate_limiter,
            expiration: self.expiration,
            finalizer,
            cleanup_reschedule: self.cleanup_reschedule,
            generation_aware: self.generation_aware,
            reconciliation_pool_size: self.reconciliation_pool_size,
            termination_timeout: self.termination_timeout,
            eviction,
            workflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ManagedResource;
    use crate::workflow::{
        DependentReconcileResult, DependentResource, DependentResourceNode, WorkflowContext,
    };
    use async_trait::async_trait;

    struct NoopDependent;

    #[async_trait]
    impl DependentResource for NoopDependent {
        async fn reconcile(
            &self,
            _primary: &ManagedResource,
            _context: &WorkflowContext,
        ) -> Result<DependentReconcileResult> {
            Ok(DependentReconcileResult::unchanged(None))
        }
    }

    #[test]
    fn test_eviction_predicate_is_required() {
        let error = ControllerConfiguration::builder("web").build().unwrap_err();
        assert!(error.to_string().contains("eviction predicate"));

        let configuration = ControllerConfiguration::builder("web")
            .optimistic_lock_equality()
            .build()
            .unwrap();
        assert_eq!(configuration.eviction_predicate().name(), "optimistic_lock_equality");
    }

    #[test]
    fn test_default_finalizer_name() {
        let configuration = ControllerConfiguration::builder("web")
            .version_ordering()
            .build()
            .unwrap();
        assert_eq!(configuration.finalizer(), Some("web/finalizer"));

        let without = ControllerConfiguration::builder("web")
            .version_ordering()
            .use_finalizer(false)
            .build()
            .unwrap();
        assert_eq!(without.finalizer(), None);
    }

    #[test]
    fn test_workflow_settings_follow_controller() {
        let mut config = OperatorConfig::default();
        config.workflow.silent_exception_handling = true;

        let configuration = ControllerConfigurationBuilder::from_config("web", &config)
            .version_ordering()
            .workflow(Workflow::builder().add(DependentResourceNode::new("config", NoopDependent)))
            .build()
            .unwrap();
        let workflow = configuration.workflow().unwrap();
        assert!(workflow.is_silent());
        assert!(!workflow.is_explicit_invocation());
    }

    #[test]
    fn test_invalid_workflow_fails_build() {
        let result = ControllerConfiguration::builder("web")
            .version_ordering()
            .workflow(
                Workflow::builder()
                    .add(DependentResourceNode::new("a", NoopDependent).depends_on(["missing"])),
            )
            .build();
        assert!(matches!(result, Err(OperatorError::InvalidWorkflow(_))));
    }

    #[test]
    fn test_starving_policies_rejected() {
        let blocked = ControllerConfiguration::builder("web")
            .version_ordering()
            .rate_limiter(LinearRateLimiter::new(Duration::from_secs(1), 0))
            .build();
        assert!(matches!(blocked, Err(OperatorError::Configuration(_))));

        let busy = ControllerConfiguration::builder("web")
            .version_ordering()
            .max_reconciliation_interval(Some(ExpirationPolicy::fixed(Duration::ZERO)))
            .build();
        assert!(matches!(busy, Err(OperatorError::Configuration(_))));

        let disabled = ControllerConfiguration::builder("web")
            .version_ordering()
            .rate_limiter(LinearRateLimiter::disabled())
            .build();
        assert!(disabled.is_ok());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let result = ControllerConfiguration::builder("web")
            .version_ordering()
            .reconciliation_pool_size(0)
            .build();
        assert!(matches!(result, Err(OperatorError::Configuration(_))));
    }
}
