use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-resource execution state owned by the reconciliation scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Nothing running and nothing scheduled
    #[default]
    Idle,
    /// A timer will re-submit the resource (retry, rate limit or reschedule)
    Scheduled,
    /// A reconciliation is in flight
    Executing,
    /// A reconciliation is in flight and at least one event arrived meanwhile
    ExecutingWithPendingEvent,
}

impl ExecutionState {
    /// Check if a reconciliation is in flight
    pub fn is_executing(&self) -> bool {
        matches!(self, Self::Executing | Self::ExecutingWithPendingEvent)
    }

    /// Check if a follow-up run is owed once the current one finishes
    pub fn has_pending_event(&self) -> bool {
        matches!(self, Self::ExecutingWithPendingEvent)
    }

    /// Check if a new execution may be admitted
    pub fn can_admit(&self) -> bool {
        matches!(self, Self::Idle | Self::Scheduled)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Executing => write!(f, "executing"),
            Self::ExecutingWithPendingEvent => write!(f, "executing_with_pending_event"),
        }
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "scheduled" => Ok(Self::Scheduled),
            "executing" => Ok(Self::Executing),
            "executing_with_pending_event" => Ok(Self::ExecutingWithPendingEvent),
            _ => Err(format!("Invalid execution state: {s}")),
        }
    }
}

/// Where a resource is in its deletion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Active,
    /// The resource disappeared from the source; state is dropped once idle
    DeleteEventPresent,
    /// Cleanup finished and the finalizer was removed; events are ignored
    /// until the delete event arrives
    ProcessedMarkForDeletion,
}

impl LifecycleState {
    pub fn accepts_events(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::DeleteEventPresent => write!(f, "delete_event_present"),
            Self::ProcessedMarkForDeletion => write!(f, "processed_mark_for_deletion"),
        }
    }
}
