use super::context::Context;
use super::control::{DeleteControl, ErrorStatusUpdateControl, UpdateControl};
use crate::error::{OperatorError, Result};
use crate::resource::ManagedResource;
use async_trait::async_trait;

/// User logic driven by the scheduler.
///
/// At most one of these methods runs at a time for a given resource. The
/// resource passed in is the freshest snapshot known to the controller, which
/// may be newer than the last one delivered by the change source.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Converges the world towards `resource`.
    async fn reconcile(&self, resource: ManagedResource, context: &Context) -> Result<UpdateControl>;

    /// Runs while the resource is marked for deletion and still carries the
    /// controller's finalizer. The finalizer is removed once this reports
    /// [`DeleteControl::default_delete`].
    async fn cleanup(&self, _resource: ManagedResource, _context: &Context) -> Result<DeleteControl> {
        Ok(DeleteControl::default_delete())
    }

    /// Called after `reconcile` fails, before the retry is scheduled.
    async fn update_error_status(
        &self,
        _resource: &ManagedResource,
        _context: &Context,
        _error: &OperatorError,
    ) -> ErrorStatusUpdateControl {
        ErrorStatusUpdateControl::default_error_processing()
    }
}
