//! Runs one execution for one resource: finalizer bookkeeping, the managed
//! workflow, the reconciler, and the write it asks for.

use super::configuration::ControllerConfiguration;
use super::context::Context;
use super::control::{PostExecutionControl, UpdateAction, UpdateControl};
use super::reconciler::Reconciler;
use crate::cache::ResourceFreshnessCache;
use crate::client::ResourceClient;
use crate::error::{OperatorError, Result};
use crate::expectation::{ExpectationManager, ExpectationResult};
use crate::resource::ManagedResource;
use crate::retry::RetryInfo;
use crate::utils::catch_panic;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) struct ReconciliationDispatcher {
    reconciler: Arc<dyn Reconciler>,
    client: Arc<dyn ResourceClient>,
    configuration: Arc<ControllerConfiguration>,
    freshness: ResourceFreshnessCache,
    expectations: ExpectationManager,
}

impl ReconciliationDispatcher {
    pub fn new(
        reconciler: Arc<dyn Reconciler>,
        client: Arc<dyn ResourceClient>,
        configuration: Arc<ControllerConfiguration>,
        freshness: ResourceFreshnessCache,
        expectations: ExpectationManager,
    ) -> Self {
        Self {
            reconciler,
            client,
            configuration,
            freshness,
            expectations,
        }
    }

    pub async fn handle_execution(
        &self,
        resource: ManagedResource,
        retry_info: Option<RetryInfo>,
        expectation: Option<ExpectationResult>,
    ) -> PostExecutionControl {
        let context = Context::new(
            self.configuration.name(),
            resource.id.clone(),
            retry_info,
            Arc::clone(&self.client),
            self.expectations.clone(),
            self.configuration.workflow.clone(),
        )
        .with_expectation_result(expectation);
        let finalizer = self.configuration.finalizer();

        if resource.is_marked_for_deletion() {
            return match finalizer {
                Some(finalizer) if resource.has_finalizer(finalizer) => {
                    self.handle_cleanup(resource, finalizer, &context).await
                }
                _ => {
                    debug!(
                        resource = %resource.id,
                        finalizer = finalizer,
                        "Resource marked for deletion without our finalizer, nothing to do"
                    );
                    PostExecutionControl::default_dispatch()
                }
            };
        }

        if let Some(finalizer) = finalizer {
            if !resource.has_finalizer(finalizer) {
                return self.add_finalizer(resource, finalizer).await;
            }
        }

        self.handle_reconcile(resource, &context).await
    }

    async fn add_finalizer(&self, resource: ManagedResource, finalizer: &str) -> PostExecutionControl {
        match self.client.add_finalizer(&resource, finalizer).await {
            Ok(updated) => {
                info!(resource = %resource.id, finalizer = finalizer, "📌 Finalizer added");
                self.freshness.cache_resource(resource, updated.clone());
                PostExecutionControl::finalizer_added(updated)
            }
            Err(error) => {
                warn!(resource = %resource.id, error = %error, "Failed to add finalizer");
                PostExecutionControl::failed(error)
            }
        }
    }

    async fn handle_reconcile(&self, resource: ManagedResource, context: &Context) -> PostExecutionControl {
        if let Some(workflow) = self.configuration.workflow() {
            if !workflow.is_explicit_invocation() {
                match workflow.reconcile(&resource).await {
                    Ok(result) => context.set_reconcile_result(result),
                    Err(error) => return self.handle_error(resource, context, error).await,
                }
            }
        }

        let outcome = catch_panic(
            "reconciler",
            self.reconciler.reconcile(resource.clone(), context),
        )
        .await;

        let control = match outcome {
            Ok(control) => control,
            Err(error) => return self.handle_error(resource, context, error).await,
        };

        let generation = resource.generation;
        match self.apply_update(&resource, control).await {
            Ok(mut post) => {
                post.reconciled_generation = Some(generation);
                post
            }
            Err(error) => self.handle_error(resource, context, error).await,
        }
    }

    async fn apply_update(
        &self,
        original: &ManagedResource,
        control: UpdateControl,
    ) -> Result<PostExecutionControl> {
        let updated = match control.action {
            UpdateAction::NoUpdate => None,
            UpdateAction::UpdateResource(desired) => Some(self.client.update(&desired).await?),
            UpdateAction::PatchStatus(desired) => Some(self.client.patch_status(&desired).await?),
            UpdateAction::UpdateResourceAndStatus(desired) => {
                let mut written = self.client.update(&desired).await?;
                written.status = desired.status.clone();
                Some(self.client.patch_status(&written).await?)
            }
        };

        if let Some(updated) = &updated {
            debug!(
                resource = %original.id,
                from_version = %original.resource_version,
                to_version = %updated.resource_version,
                "Primary resource written"
            );
            self.freshness.cache_resource(original.clone(), updated.clone());
        }

        Ok(PostExecutionControl {
            updated_resource: updated,
            reschedule: control.reschedule,
            ..PostExecutionControl::default()
        })
    }

    async fn handle_error(
        &self,
        resource: ManagedResource,
        context: &Context,
        error: OperatorError,
    ) -> PostExecutionControl {
        let control = self
            .reconciler
            .update_error_status(&resource, context, &error)
            .await;

        let mut post = PostExecutionControl::failed(error);
        if let Some(patch) = control.patch {
            match self.client.patch_status(&patch).await {
                Ok(updated) => {
                    self.freshness.cache_resource(resource, updated.clone());
                    post.updated_resource = Some(updated);
                }
                Err(patch_error) => {
                    warn!(resource = %patch.id, error = %patch_error, "Failed to record error status");
                }
            }
        }
        if control.no_retry {
            post.no_retry = true;
            post.reschedule = control.reschedule;
        }
        post
    }

    async fn handle_cleanup(
        &self,
        resource: ManagedResource,
        finalizer: &str,
        context: &Context,
    ) -> PostExecutionControl {
        if let Some(workflow) = self.configuration.workflow() {
            if !workflow.is_explicit_invocation() && !workflow.is_empty() {
                match workflow.cleanup(&resource).await {
                    Ok(result) => {
                        let complete = result.is_cleanup_complete();
                        context.set_cleanup_result(result);
                        if !complete {
                            info!(
                                resource = %resource.id,
                                delay_ms = self.configuration.cleanup_reschedule.as_millis() as u64,
                                "Workflow cleanup incomplete, keeping finalizer"
                            );
                            return PostExecutionControl::cleanup_pending(Some(
                                self.configuration.cleanup_reschedule,
                            ));
                        }
                    }
                    Err(error) => return PostExecutionControl::failed(error),
                }
            }
        }

        let outcome = catch_panic("cleanup", self.reconciler.cleanup(resource.clone(), context)).await;
        let control = match outcome {
            Ok(control) => control,
            Err(error) => return PostExecutionControl::failed(error),
        };

        if !control.remove_finalizer {
            return PostExecutionControl::cleanup_pending(control.reschedule);
        }

        match self.client.remove_finalizer(&resource, finalizer).await {
            Ok(updated) => {
                info!(resource = %resource.id, finalizer = finalizer, "🧹 Cleanup complete, finalizer removed");
                PostExecutionControl::finalizer_removed(updated)
            }
            Err(error) => {
                warn!(resource = %resource.id, error = %error, "Failed to remove finalizer");
                PostExecutionControl::failed(error)
            }
        }
    }
}
