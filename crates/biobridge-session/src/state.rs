//! Device session state machine.
//!
//! # States
//!
//! - `Disconnected`: no link to the terminal
//! - `Connecting`: link being opened and identity queried
//! - `Ready`: link open, nothing running
//! - `Capturing`: capture worker owns the transport
//! - `Administering`: an administrative operation owns the transport
//! - `Reconnecting`: link lost, recovery scheduled
//! - `Failed`: connection attempt failed, waiting for a manual retry
//!
//! # Valid Transitions
//!
//! - Disconnected → Connecting → Ready/Failed
//! - Ready → Capturing/Administering → Ready
//! - Capturing/Administering → Reconnecting → Connecting
//! - Ready/Reconnecting/Failed → Disconnected
//!
//! `Capturing` and `Administering` are distinct states, so the transport
//! can never be claimed by both.
//!
//! # Examples
//!
//! ```
//! use biobridge_session::{SessionState, SessionStateMachine};
//!
//! let mut machine = SessionStateMachine::new();
//! machine.transition_to(SessionState::Connecting).unwrap();
//! machine.transition_to(SessionState::Ready).unwrap();
//! machine.transition_to(SessionState::Capturing).unwrap();
//!
//! // The worker must be stopped before an operation can run
//! assert!(machine.transition_to(SessionState::Administering).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use biobridge_core::{Error, Result};

/// Transitions retained for status reporting.
const MAX_HISTORY_SIZE: usize = 64;

/// Lifecycle state of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No link to the terminal.
    Disconnected,

    /// Opening the link and querying the terminal's identity.
    Connecting,

    /// Link open and idle.
    Ready,

    /// The capture worker is polling the live stream.
    Capturing,

    /// An administrative operation is using the transport.
    Administering,

    /// The link was lost; a reconnection attempt is scheduled.
    Reconnecting,

    /// The last connection attempt failed.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Ready => "Ready",
            SessionState::Capturing => "Capturing",
            SessionState::Administering => "Administering",
            SessionState::Reconnecting => "Reconnecting",
            SessionState::Failed => "Failed",
        };
        write!(f, "{}", state_str)
    }
}

impl SessionState {
    /// Whether the lifecycle allows moving from `self` to `target`.
    ///
    /// # Examples
    ///
    /// ```
    /// use biobridge_session::SessionState;
    ///
    /// assert!(SessionState::Ready.can_transition_to(&SessionState::Capturing));
    /// assert!(!SessionState::Capturing.can_transition_to(&SessionState::Administering));
    /// assert!(!SessionState::Disconnected.can_transition_to(&SessionState::Ready));
    /// ```
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, target),
            // From Disconnected
            (Disconnected, Connecting)
            // From Connecting
            | (Connecting, Ready | Failed)
            // From Ready
            | (Ready, Capturing | Administering | Reconnecting | Disconnected)
            // From Capturing
            | (Capturing, Ready | Reconnecting)
            // From Administering
            | (Administering, Ready | Reconnecting)
            // From Reconnecting
            | (Reconnecting, Connecting | Disconnected)
            // From Failed
            | (Failed, Connecting | Reconnecting | Disconnected)
        )
    }

    /// Whether the link to the terminal is open in this state.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Capturing | SessionState::Administering
        )
    }

    /// States the session may rest in between operations.
    pub fn is_resting(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Disconnected | SessionState::Failed
        )
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Copy)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: SessionState, to: SessionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time since the change.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Validated state holder with a bounded transition history.
///
/// Not synchronized; the session keeps it behind its own lock.
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: SessionState,
    state_entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl SessionStateMachine {
    /// Create a new state machine in the `Disconnected` state.
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Disconnected,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Move to `new_state` if the transition table allows it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the table does not allow
    /// moving from the current state to `new_state`. The state is left
    /// unchanged.
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.current_state = new_state;
        self.state_entered_at = transition.timestamp;

        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }

        Ok(transition)
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL_STATES: [SessionState; 7] = [
        SessionState::Disconnected,
        SessionState::Connecting,
        SessionState::Ready,
        SessionState::Capturing,
        SessionState::Administering,
        SessionState::Reconnecting,
        SessionState::Failed,
    ];

    #[test]
    fn test_initial_state() {
        let machine = SessionStateMachine::new();
        assert_eq!(machine.current_state(), SessionState::Disconnected);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_connect_capture_cycle() {
        let mut machine = SessionStateMachine::new();

        for state in [
            SessionState::Connecting,
            SessionState::Ready,
            SessionState::Capturing,
            SessionState::Ready,
            SessionState::Administering,
            SessionState::Ready,
            SessionState::Disconnected,
        ] {
            machine.transition_to(state).unwrap();
        }

        assert_eq!(machine.current_state(), SessionState::Disconnected);
        assert_eq!(machine.history().len(), 7);
    }

    #[test]
    fn test_recovery_cycle() {
        let mut machine = SessionStateMachine::new();
        machine.transition_to(SessionState::Connecting).unwrap();
        machine.transition_to(SessionState::Ready).unwrap();
        machine.transition_to(SessionState::Capturing).unwrap();
        machine.transition_to(SessionState::Reconnecting).unwrap();
        machine.transition_to(SessionState::Connecting).unwrap();
        machine.transition_to(SessionState::Failed).unwrap();
        machine.transition_to(SessionState::Connecting).unwrap();

        let last = machine.history().back().unwrap();
        assert_eq!(last.from, SessionState::Failed);
        assert_eq!(last.to, SessionState::Connecting);
    }

    #[test]
    fn test_link_lost_during_operation() {
        let mut machine = SessionStateMachine::new();
        machine.transition_to(SessionState::Connecting).unwrap();
        machine.transition_to(SessionState::Ready).unwrap();
        machine.transition_to(SessionState::Administering).unwrap();
        machine.transition_to(SessionState::Reconnecting).unwrap();

        assert!(!machine.current_state().is_connected());
        assert!(SessionState::Reconnecting.can_transition_to(&SessionState::Connecting));
    }

    #[test]
    fn test_capture_and_administration_are_exclusive() {
        assert!(!SessionState::Capturing.can_transition_to(&SessionState::Administering));
        assert!(!SessionState::Administering.can_transition_to(&SessionState::Capturing));
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut machine = SessionStateMachine::new();
        let err = machine.transition_to(SessionState::Capturing).unwrap_err();

        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Disconnected to Capturing"
        );
        assert_eq!(machine.current_state(), SessionState::Disconnected);
        assert!(machine.history().is_empty());
    }

    #[rstest]
    #[case(SessionState::Disconnected)]
    #[case(SessionState::Connecting)]
    #[case(SessionState::Ready)]
    #[case(SessionState::Capturing)]
    #[case(SessionState::Administering)]
    #[case(SessionState::Reconnecting)]
    #[case(SessionState::Failed)]
    fn test_no_self_transitions(#[case] state: SessionState) {
        assert!(!state.can_transition_to(&state));
    }

    #[test]
    fn test_every_busy_state_reaches_a_resting_state() {
        for state in ALL_STATES.iter().filter(|s| !s.is_resting()) {
            let reaches_rest = ALL_STATES
                .iter()
                .any(|target| target.is_resting() && state.can_transition_to(target));
            let via_ready = state.can_transition_to(&SessionState::Connecting);
            assert!(reaches_rest || via_ready, "{state} is a dead end");
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = SessionStateMachine::new();
        machine.transition_to(SessionState::Connecting).unwrap();
        machine.transition_to(SessionState::Ready).unwrap();

        for _ in 0..MAX_HISTORY_SIZE {
            machine.transition_to(SessionState::Capturing).unwrap();
            machine.transition_to(SessionState::Ready).unwrap();
        }

        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.history().back().unwrap().to, SessionState::Ready);
    }

    #[test]
    fn test_connected_states() {
        assert!(SessionState::Ready.is_connected());
        assert!(SessionState::Capturing.is_connected());
        assert!(SessionState::Administering.is_connected());
        assert!(!SessionState::Reconnecting.is_connected());
        assert!(!SessionState::Failed.is_connected());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionState::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
    }
}
