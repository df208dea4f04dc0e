// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observable agent events.
//!
//! Every failure category the client encounters is converted into an event
//! on the bus so a host application can log or alert without the library
//! terminating itself. A device that cannot reach the hub keeps retrying
//! at bounded intervals; it never gives up short of an explicit stop.

use serde::Serialize;

use netpulse_bus::EventBus;
use netpulse_core::Command;

/// Events published by the agent client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The agent entered the running state.
    Started { device_id: String },
    /// The agent stopped (explicit stop or shutdown).
    Stopped,
    /// The real-time channel connected.
    ChannelConnected,
    /// The real-time channel dropped; reconnection is in progress.
    ChannelDisconnected { reason: String },
    /// Reconnection attempts are exhausted; the socket stays down and the
    /// agent continues in poll-only mode. Terminal for the channel.
    ReconnectFailed { attempts: u32 },
    /// The re-authentication sub-flow exhausted its attempts.
    AuthFailed { attempts: u32 },
    /// A heartbeat cycle completed.
    HeartbeatSuccess { commands: usize },
    /// A heartbeat cycle failed; the next one runs on schedule.
    HeartbeatError { message: String },
    /// A claimed command arrived (push or poll).
    CommandReceived { command: Command },
    /// The hub acknowledged a submitted result.
    CommandAcked { command_id: String },
    /// An unrecognized message from the hub, passed through opaquely.
    ServerEvent { value: serde_json::Value },
    /// Any other failure surfaced to the host.
    Error { message: String },
}

/// The agent's event bus.
pub type AgentBus = EventBus<AgentEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = AgentEvent::HeartbeatError {
            message: "connection refused".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"heartbeat_error\""));

        let event = AgentEvent::ReconnectFailed { attempts: 10 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"reconnect_failed\""));
        assert!(json.contains("\"attempts\":10"));
    }
}
