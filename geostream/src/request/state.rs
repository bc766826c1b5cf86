//! Request lifecycle state machine.
//!
//! State is never mutated directly; every change goes through
//! [`StateCell::transition`], which enforces the legal transition table
//! and reports whether a state-change hook should fire. Re-assigning the
//! current state is a no-op for the hook (idempotent notification).
//!
//! ```text
//!           resume            pause
//!   Idle ──────────► Running ◄──────► Paused
//!                       │                │
//!                       └───► Failed ◄───┘      (terminal)
//! ```
//!
//! Cancellation is not a stored state: a cancelled request is removed from
//! the queue and flagged so later dispatches are no-ops.

use std::fmt;

use crate::error::SensorError;

/// Lifecycle state of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    /// Created, never resumed.
    Idle,
    /// In the active queue, receiving dispatches.
    Running,
    /// In the queue but deactivated; observers are retained.
    Paused,
    /// Terminally failed with the fatal error.
    Failed(SensorError),
}

impl RequestState {
    /// True for the running state.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// True for the terminal failed state.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Failed(e) => write!(f, "Failed({e})"),
        }
    }
}

/// Outcome of a requested state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The state changed; the hook should fire with `(old, new)`.
    Changed {
        /// State before the transition.
        old: RequestState,
        /// State after the transition.
        new: RequestState,
    },
    /// The requested state equals the current one; no hook fires.
    Unchanged,
    /// The transition is illegal (e.g. out of `Failed`) and was ignored.
    Rejected,
}

impl Transition {
    /// Returns the `(old, new)` pair when the state actually changed.
    pub fn changed(self) -> Option<(RequestState, RequestState)> {
        match self {
            Self::Changed { old, new } => Some((old, new)),
            _ => None,
        }
    }
}

/// Guarded holder for a request's lifecycle state.
#[derive(Debug)]
pub struct StateCell {
    current: RequestState,
}

impl StateCell {
    /// Creates a cell in the initial `Idle` state.
    pub fn new() -> Self {
        Self {
            current: RequestState::Idle,
        }
    }

    /// The current state.
    pub fn current(&self) -> &RequestState {
        &self.current
    }

    /// Attempts a transition to `next`, enforcing the transition table.
    pub fn transition(&mut self, next: RequestState) -> Transition {
        if self.current == next {
            return Transition::Unchanged;
        }

        let legal = match (&self.current, &next) {
            // Failed is terminal.
            (RequestState::Failed(_), _) => false,
            (RequestState::Idle, RequestState::Running) => true,
            (RequestState::Running, RequestState::Paused) => true,
            (RequestState::Paused, RequestState::Running) => true,
            (RequestState::Running, RequestState::Failed(_)) => true,
            (RequestState::Paused, RequestState::Failed(_)) => true,
            _ => false,
        };

        if !legal {
            return Transition::Rejected;
        }

        let old = std::mem::replace(&mut self.current, next.clone());
        Transition::Changed { old, new: next }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_initial_state_is_idle() {
        let cell = StateCell::new();
        assert_eq!(*cell.current(), RequestState::Idle);
    }

    #[test]
    fn test_resume_pause_cycle() {
        let mut cell = StateCell::new();

        assert_eq!(
            cell.transition(RequestState::Running),
            Transition::Changed {
                old: RequestState::Idle,
                new: RequestState::Running,
            }
        );
        assert!(cell
            .transition(RequestState::Paused)
            .changed()
            .is_some());
        assert!(cell
            .transition(RequestState::Running)
            .changed()
            .is_some());
    }

    #[test]
    fn test_same_state_is_unchanged_not_rejected() {
        let mut cell = StateCell::new();
        cell.transition(RequestState::Running);
        assert_eq!(
            cell.transition(RequestState::Running),
            Transition::Unchanged
        );
    }

    #[test]
    fn test_idle_cannot_pause() {
        let mut cell = StateCell::new();
        assert_eq!(
            cell.transition(RequestState::Paused),
            Transition::Rejected
        );
        assert_eq!(*cell.current(), RequestState::Idle);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut cell = StateCell::new();
        cell.transition(RequestState::Running);
        let err = SensorError::Timeout(Duration::from_secs(2));
        assert!(cell
            .transition(RequestState::Failed(err.clone()))
            .changed()
            .is_some());

        assert_eq!(
            cell.transition(RequestState::Running),
            Transition::Rejected
        );
        assert_eq!(
            cell.transition(RequestState::Paused),
            Transition::Rejected
        );
        assert_eq!(*cell.current(), RequestState::Failed(err));
    }

    #[test]
    fn test_idle_cannot_fail_directly() {
        let mut cell = StateCell::new();
        let err = SensorError::provider("boom");
        assert_eq!(
            cell.transition(RequestState::Failed(err)),
            Transition::Rejected
        );
    }

    #[test]
    fn test_paused_can_fail() {
        let mut cell = StateCell::new();
        cell.transition(RequestState::Running);
        cell.transition(RequestState::Paused);
        let err = SensorError::provider("boom");
        assert!(cell
            .transition(RequestState::Failed(err))
            .changed()
            .is_some());
    }
}
