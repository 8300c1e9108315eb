//! Per-execution context handed to reconcilers.

use crate::client::ResourceClient;
use crate::error::{OperatorError, Result};
use crate::expectation::{ExpectationManager, ExpectationResult};
use crate::resource::{ManagedResource, ResourceId};
use crate::retry::RetryInfo;
use crate::workflow::{Workflow, WorkflowResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub struct Context {
    controller: String,
    resource_id: ResourceId,
    retry_info: Option<RetryInfo>,
    client: Arc<dyn ResourceClient>,
    expectations: ExpectationManager,
    expectation_result: Option<ExpectationResult>,
    workflow: Option<Workflow>,
    reconcile_result: Mutex<Option<WorkflowResult>>,
    cleanup_result: Mutex<Option<WorkflowResult>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("controller", &self.controller)
            .field("resource_id", &self.resource_id)
            .field("retry_info", &self.retry_info)
            .field("expectation_result", &self.expectation_result)
            .field("has_workflow", &self.workflow.is_some())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(
        controller: impl Into<String>,
        resource_id: ResourceId,
        retry_info: Option<RetryInfo>,
        client: Arc<dyn ResourceClient>,
        expectations: ExpectationManager,
        workflow: Option<Workflow>,
    ) -> Self {
        Self {
            controller: controller.into(),
            resource_id,
            retry_info,
            client,
            expectations,
            expectation_result: None,
            workflow,
            reconcile_result: Mutex::new(None),
            cleanup_result: Mutex::new(None),
        }
    }

    pub(crate) fn with_expectation_result(mut self, result: Option<ExpectationResult>) -> Self {
        self.expectation_result = result;
        self
    }

    pub fn controller_name(&self) -> &str {
        &self.controller
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// `None` on the first attempt.
    pub fn retry_info(&self) -> Option<RetryInfo> {
        self.retry_info
    }

    pub fn is_last_attempt(&self) -> bool {
        self.retry_info.is_some_and(|info| info.last_attempt)
    }

    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    pub fn expectations(&self) -> &ExpectationManager {
        &self.expectations
    }

    /// Outcome of the expectation that gated this execution: fulfilled or timed out.
    pub fn expectation_result(&self) -> Option<&ExpectationResult> {
        self.expectation_result.as_ref()
    }

    /// Result of the managed workflow's reconcile run in this execution, if any.
    pub fn workflow_reconcile_result(&self) -> Option<WorkflowResult> {
        self.reconcile_result.lock().clone()
    }

    pub fn workflow_cleanup_result(&self) -> Option<WorkflowResult> {
        self.cleanup_result.lock().clone()
    }

    /// Runs the managed workflow's reconcile; used when the workflow is invoked explicitly.
    pub async fn reconcile_workflow(&self, primary: &ManagedResource) -> Result<WorkflowResult> {
        let workflow = self.managed_workflow()?;
        let result = workflow.reconcile(primary).await?;
        self.set_reconcile_result(result.clone());
        Ok(result)
    }

    pub async fn cleanup_workflow(&self, primary: &ManagedResource) -> Result<WorkflowResult> {
        let workflow = self.managed_workflow()?;
        let result = workflow.cleanup(primary).await?;
        self.set_cleanup_result(result.clone());
        Ok(result)
    }

    pub(crate) fn set_reconcile_result(&self, result: WorkflowResult) {
        *self.reconcile_result.lock() = Some(result);
    }

    pub(crate) fn set_cleanup_result(&self, result: WorkflowResult) {
        *self.cleanup_result.lock() = Some(result);
    }

    fn managed_workflow(&self) -> Result<&Workflow> {
        self.workflow.as_ref().ok_or_else(|| {
            OperatorError::configuration(format!(
                "controller '{}' has no managed workflow",
                self.controller
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryResourceClient;
    use serde_json::json;

    fn context(workflow: Option<Workflow>) -> Context {
        Context::new(
            "test",
            ResourceId::new("web"),
            None,
            Arc::new(InMemoryResourceClient::new()),
            ExpectationManager::new(),
            workflow,
        )
    }

    #[tokio::test]
    async fn test_workflow_invocation_without_workflow_fails() {
        let context = context(None);
        let primary = ManagedResource::new(ResourceId::new("web"), json!({}));
        let error = context.reconcile_workflow(&primary).await.unwrap_err();
        assert!(matches!(error, OperatorError::Configuration(_)));
        assert!(context.workflow_reconcile_result().is_none());
    }

    #[tokio::test]
    async fn test_explicit_invocation_records_result() {
        let workflow = Workflow::builder().explicit_invocation(true).build().unwrap();
        let context = context(Some(workflow));
        let primary = ManagedResource::new(ResourceId::new("web"), json!({}));

        let result = context.reconcile_workflow(&primary).await.unwrap();
        assert!(!result.has_errors());
        assert!(context.workflow_reconcile_result().is_some());
        assert!(context.workflow_cleanup_result().is_none());
    }

    #[test]
    fn test_retry_info_accessors() {
        let mut context = context(None);
        assert!(!context.is_last_attempt());
        context.retry_info = Some(RetryInfo {
            attempt: 3,
            last_attempt: true,
        });
        assert!(context.is_last_attempt());
        assert!(context.expectation_result().is_none());
    }
}
