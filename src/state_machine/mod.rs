//! # Execution State Machine
//!
//! Serializes reconciliation per resource. The scheduler holds one
//! [`ExecutionState`] per resource and moves it only through
//! [`determine_target_state`], always under that resource's map-entry lock.
//!
//! ```text
//!            Admit                       EventReceived
//!   Idle ───────────▶ Executing ─────────────────────▶ ExecutingWithPendingEvent
//!    ▲  ▲                │  ▲                                    │
//!    │  │ CancelTimer    │  │ Admit                              │ Finish
//!    │  └── Scheduled ◀──┼──┘                                    │ (re-admitted at once)
//!    │         ▲  Defer  │ Finish                                │
//!    └─────────┴─────────┴───────────────────────────────────────┘
//! ```

pub mod events;
pub mod states;

pub use events::ExecutionEvent;
pub use states::{ExecutionState, LifecycleState};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: ExecutionState, event: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

/// Computes the state reached from `current` on `event`.
pub fn determine_target_state(
    current: ExecutionState,
    event: ExecutionEvent,
) -> StateMachineResult<ExecutionState> {
    use ExecutionEvent as E;
    use ExecutionState as S;

    let target = match (current, event) {
        // Events while idle or scheduled are admitted by the caller
        (S::Idle, E::EventReceived) => S::Idle,
        (S::Scheduled, E::EventReceived) => S::Scheduled,

        // Coalescing
        (S::Executing, E::EventReceived) => S::ExecutingWithPendingEvent,
        (S::ExecutingWithPendingEvent, E::EventReceived) => S::ExecutingWithPendingEvent,

        (S::Idle | S::Scheduled, E::Admit) => S::Executing,
        (S::Idle | S::Scheduled, E::Defer) => S::Scheduled,
        (S::Idle | S::Scheduled, E::CancelTimer) => S::Idle,

        (S::Executing | S::ExecutingWithPendingEvent, E::Finish) => S::Idle,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from,
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalescing_transitions() {
        let mut state = ExecutionState::Idle;
        state = determine_target_state(state, ExecutionEvent::Admit).unwrap();
        for _ in 0..5 {
            state = determine_target_state(state, ExecutionEvent::EventReceived).unwrap();
        }
        assert_eq!(state, ExecutionState::ExecutingWithPendingEvent);
        state = determine_target_state(state, ExecutionEvent::Finish).unwrap();
        assert_eq!(state, ExecutionState::Idle);
    }

    #[test]
    fn test_deferral_and_cancellation() {
        let state = determine_target_state(ExecutionState::Idle, ExecutionEvent::Defer).unwrap();
        assert_eq!(state, ExecutionState::Scheduled);
        assert_eq!(
            determine_target_state(state, ExecutionEvent::Admit).unwrap(),
            ExecutionState::Executing
        );
        assert_eq!(
            determine_target_state(state, ExecutionEvent::CancelTimer).unwrap(),
            ExecutionState::Idle
        );
    }

    #[test]
    fn test_second_admission_is_rejected() {
        let error = determine_target_state(ExecutionState::Executing, ExecutionEvent::Admit)
            .unwrap_err();
        assert_eq!(
            error,
            StateMachineError::InvalidTransition {
                from: ExecutionState::Executing,
                event: "admit".to_string()
            }
        );
        assert!(determine_target_state(ExecutionState::Idle, ExecutionEvent::Finish).is_err());
    }
}
