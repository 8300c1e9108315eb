use crate::constants::events;
use crate::error::OperatorError;
use crate::resource::{ManagedResource, ResourceId};
use std::time::Duration;

/// Notification fed into the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The resource was created or changed; carries the observed snapshot.
    Upsert(ManagedResource),
    /// The resource is gone from the source.
    Deleted,
    /// Reconcile again with the last known snapshot.
    Trigger,
}

impl ChangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::Deleted => "deleted",
            Self::Trigger => "trigger",
        }
    }
}

/// What the scheduler did with a resource, published on its event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Reconciled {
        resource: ResourceId,
    },
    FinalizerAdded {
        resource: ResourceId,
    },
    RetryScheduled {
        resource: ResourceId,
        attempt: u32,
        delay: Duration,
        error: OperatorError,
    },
    RetriesExhausted {
        resource: ResourceId,
        error: OperatorError,
    },
    FailedWithoutRetry {
        resource: ResourceId,
        error: OperatorError,
    },
    RateLimited {
        resource: ResourceId,
        delay: Duration,
    },
    CleanupRescheduled {
        resource: ResourceId,
        delay: Option<Duration>,
    },
    CleanupCompleted {
        resource: ResourceId,
    },
    ResourceDeleted {
        resource: ResourceId,
    },
}

impl SchedulerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Reconciled { .. } => events::RECONCILED,
            Self::FinalizerAdded { .. } => events::FINALIZER_ADDED,
            Self::RetryScheduled { .. } => events::RETRY_SCHEDULED,
            Self::RetriesExhausted { .. } => events::RETRIES_EXHAUSTED,
            Self::FailedWithoutRetry { .. } => events::FAILED_WITHOUT_RETRY,
            Self::RateLimited { .. } => events::RATE_LIMITED,
            Self::CleanupRescheduled { .. } => events::CLEANUP_RESCHEDULED,
            Self::CleanupCompleted { .. } => events::CLEANUP_COMPLETED,
            Self::ResourceDeleted { .. } => events::RESOURCE_DELETED,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        match self {
            Self::Reconciled { resource }
            | Self::FinalizerAdded { resource }
            | Self::RetryScheduled { resource, .. }
            | Self::RetriesExhausted { resource, .. }
            | Self::FailedWithoutRetry { resource, .. }
            | Self::RateLimited { resource, .. }
            | Self::CleanupRescheduled { resource, .. }
            | Self::CleanupCompleted { resource }
            | Self::ResourceDeleted { resource } => resource,
        }
    }
}
