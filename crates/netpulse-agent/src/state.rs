// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent lifecycle state machine.
//!
//! Transitions are a pure function from (state, input) to the next state
//! plus emitted notifications, so the whole table is unit-testable without
//! sockets or timers. The orchestrator applies outcomes and maps the
//! notifications onto bus events.

/// Lifecycle states of the agent client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Constructed, not yet started.
    Initialized,
    /// Heartbeat loop active; channel may be up or in poll-only fallback.
    Running,
    /// Start or recovery failed; a `recover` call may retry.
    Error,
    /// A recovery attempt is in flight.
    Recovering,
    /// Stopped; terminal.
    Stopped,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Initialized => write!(f, "initialized"),
            AgentState::Running => write!(f, "running"),
            AgentState::Error => write!(f, "error"),
            AgentState::Recovering => write!(f, "recovering"),
            AgentState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Inputs driving the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    StartSucceeded,
    StartFailed,
    RecoverStarted,
    RecoverSucceeded,
    RecoverFailed,
    Stop,
    /// Idempotent cleanup regardless of prior state.
    Shutdown,
}

/// Notification emitted alongside a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    BecameRunning,
    BecameError,
    BecameStopped,
    BeganRecovering,
}

/// The result of applying an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub next: AgentState,
    pub emitted: Vec<Notification>,
}

/// Apply `input` to `state`, returning the next state and notifications.
///
/// Inputs that are not valid for the current state leave it unchanged and
/// emit nothing (a stopped agent in particular absorbs everything except
/// nothing -- stopped is terminal).
pub fn transition(state: AgentState, input: Input) -> Outcome {
    use AgentState::*;
    use Input::*;

    let (next, emitted) = match (state, input) {
        (Initialized, StartSucceeded) => (Running, vec![Notification::BecameRunning]),
        (Initialized, StartFailed) => (Error, vec![Notification::BecameError]),

        (Error, RecoverStarted) => (Recovering, vec![Notification::BeganRecovering]),
        (Recovering, RecoverSucceeded) => (Running, vec![Notification::BecameRunning]),
        (Recovering, RecoverFailed) => (Error, vec![Notification::BecameError]),

        (Running, Stop) => (Stopped, vec![Notification::BecameStopped]),
        (Stopped, Shutdown) => (Stopped, vec![]),
        (_, Shutdown) => (Stopped, vec![Notification::BecameStopped]),

        // Everything else is a no-op.
        (current, _) => (current, vec![]),
    };

    Outcome { next, emitted }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_success_runs() {
        let outcome = transition(AgentState::Initialized, Input::StartSucceeded);
        assert_eq!(outcome.next, AgentState::Running);
        assert_eq!(outcome.emitted, vec![Notification::BecameRunning]);
    }

    #[test]
    fn start_failure_errors() {
        let outcome = transition(AgentState::Initialized, Input::StartFailed);
        assert_eq!(outcome.next, AgentState::Error);
        assert_eq!(outcome.emitted, vec![Notification::BecameError]);
    }

    #[test]
    fn recovery_cycle() {
        let outcome = transition(AgentState::Error, Input::RecoverStarted);
        assert_eq!(outcome.next, AgentState::Recovering);

        let success = transition(AgentState::Recovering, Input::RecoverSucceeded);
        assert_eq!(success.next, AgentState::Running);

        let failure = transition(AgentState::Recovering, Input::RecoverFailed);
        assert_eq!(failure.next, AgentState::Error);
        assert_eq!(failure.emitted, vec![Notification::BecameError]);
    }

    #[test]
    fn running_stop_stops() {
        let outcome = transition(AgentState::Running, Input::Stop);
        assert_eq!(outcome.next, AgentState::Stopped);
        assert_eq!(outcome.emitted, vec![Notification::BecameStopped]);
    }

    #[test]
    fn shutdown_is_idempotent_from_any_state() {
        for state in [
            AgentState::Initialized,
            AgentState::Running,
            AgentState::Error,
            AgentState::Recovering,
        ] {
            let outcome = transition(state, Input::Shutdown);
            assert_eq!(outcome.next, AgentState::Stopped);
            assert_eq!(outcome.emitted, vec![Notification::BecameStopped]);
        }

        // Already stopped: no duplicate notification.
        let again = transition(AgentState::Stopped, Input::Shutdown);
        assert_eq!(again.next, AgentState::Stopped);
        assert!(again.emitted.is_empty());
    }

    #[test]
    fn stopped_is_terminal() {
        for input in [
            Input::StartSucceeded,
            Input::StartFailed,
            Input::RecoverStarted,
            Input::RecoverSucceeded,
            Input::RecoverFailed,
            Input::Stop,
        ] {
            let outcome = transition(AgentState::Stopped, input);
            assert_eq!(outcome.next, AgentState::Stopped);
            assert!(outcome.emitted.is_empty());
        }
    }

    #[test]
    fn invalid_inputs_are_no_ops() {
        // A running agent ignores start/recover inputs.
        let outcome = transition(AgentState::Running, Input::StartSucceeded);
        assert_eq!(outcome.next, AgentState::Running);
        assert!(outcome.emitted.is_empty());

        let outcome = transition(AgentState::Initialized, Input::RecoverSucceeded);
        assert_eq!(outcome.next, AgentState::Initialized);
        assert!(outcome.emitted.is_empty());
    }

    #[test]
    fn display_names() {
        assert_eq!(AgentState::Initialized.to_string(), "initialized");
        assert_eq!(AgentState::Running.to_string(), "running");
        assert_eq!(AgentState::Error.to_string(), "error");
        assert_eq!(AgentState::Recovering.to_string(), "recovering");
        assert_eq!(AgentState::Stopped.to_string(), "stopped");
    }
}
