//! Values reconcilers return to steer what happens after they run.

use crate::error::OperatorError;
use crate::resource::ManagedResource;
use std::time::Duration;

/// Write requested by a successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    NoUpdate,
    UpdateResource(ManagedResource),
    PatchStatus(ManagedResource),
    UpdateResourceAndStatus(ManagedResource),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateControl {
    pub action: UpdateAction,
    pub reschedule: Option<Duration>,
}

impl UpdateControl {
    pub fn no_update() -> Self {
        Self {
            action: UpdateAction::NoUpdate,
            reschedule: None,
        }
    }

    pub fn update_resource(resource: ManagedResource) -> Self {
        Self {
            action: UpdateAction::UpdateResource(resource),
            reschedule: None,
        }
    }

    pub fn patch_status(resource: ManagedResource) -> Self {
        Self {
            action: UpdateAction::PatchStatus(resource),
            reschedule: None,
        }
    }

    pub fn update_resource_and_status(resource: ManagedResource) -> Self {
        Self {
            action: UpdateAction::UpdateResourceAndStatus(resource),
            reschedule: None,
        }
    }

    /// Runs the reconciliation again after `delay` even without new events.
    pub fn reschedule_after(mut self, delay: Duration) -> Self {
        self.reschedule = Some(delay);
        self
    }
}

/// Outcome of a cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteControl {
    pub remove_finalizer: bool,
    pub reschedule: Option<Duration>,
}

impl DeleteControl {
    /// Cleanup finished; the finalizer may be removed.
    pub fn default_delete() -> Self {
        Self {
            remove_finalizer: true,
            reschedule: None,
        }
    }

    /// Cleanup is still in progress.
    pub fn no_finalizer_removal() -> Self {
        Self {
            remove_finalizer: false,
            reschedule: None,
        }
    }

    /// Only meaningful together with [`no_finalizer_removal`](Self::no_finalizer_removal).
    pub fn reschedule_after(mut self, delay: Duration) -> Self {
        self.reschedule = Some(delay);
        self
    }
}

/// Returned by the error-status hook after a failed reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStatusUpdateControl {
    pub patch: Option<ManagedResource>,
    pub no_retry: bool,
    pub reschedule: Option<Duration>,
}

impl ErrorStatusUpdateControl {
    /// Retry per policy without touching the status.
    pub fn default_error_processing() -> Self {
        Self {
            patch: None,
            no_retry: false,
            reschedule: None,
        }
    }

    /// Record the failure on the resource's status, then retry per policy.
    pub fn patch_status(resource: ManagedResource) -> Self {
        Self {
            patch: Some(resource),
            ..Self::default_error_processing()
        }
    }

    /// Treat the failure as terminal.
    pub fn without_retry(mut self) -> Self {
        self.no_retry = true;
        self
    }

    /// With [`without_retry`](Self::without_retry), run again after `delay`.
    pub fn reschedule_after(mut self, delay: Duration) -> Self {
        self.reschedule = Some(delay);
        self
    }
}

/// What the dispatcher reports back to the scheduler after one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PostExecutionControl {
    pub error: Option<OperatorError>,
    pub reschedule: Option<Duration>,
    pub updated_resource: Option<ManagedResource>,
    /// Generation of the resource a successful reconcile ran against
    pub reconciled_generation: Option<i64>,
    pub finalizer_added: bool,
    pub finalizer_removed: bool,
    pub cleanup_pending: bool,
    pub no_retry: bool,
}

impl PostExecutionControl {
    pub fn default_dispatch() -> Self {
        Self::default()
    }

    pub fn failed(error: OperatorError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn finalizer_added(updated: ManagedResource) -> Self {
        Self {
            reschedule: Some(Duration::ZERO),
            updated_resource: Some(updated),
            finalizer_added: true,
            ..Self::default()
        }
    }

    pub fn finalizer_removed(updated: ManagedResource) -> Self {
        Self {
            updated_resource: Some(updated),
            finalizer_removed: true,
            ..Self::default()
        }
    }

    pub fn cleanup_pending(reschedule: Option<Duration>) -> Self {
        Self {
            reschedule,
            cleanup_pending: true,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
