use serde::{Deserialize, Serialize};

/// Events that drive [`ExecutionState`](super::ExecutionState) transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    /// A change notification or timer fire arrived for the resource
    EventReceived,
    /// The resource was handed to a worker
    Admit,
    /// A timer was armed to re-submit the resource later
    Defer,
    /// The timer was cancelled before firing
    CancelTimer,
    /// The in-flight reconciliation returned
    Finish,
}

impl ExecutionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EventReceived => "event_received",
            Self::Admit => "admit",
            Self::Defer => "defer",
            Self::CancelTimer => "cancel_timer",
            Self::Finish => "finish",
        }
    }
}
