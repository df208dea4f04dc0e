// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-level contract between the gateway and agents.
//!
//! Shared by the server (netpulse-gateway) and the device-side client
//! (netpulse-agent) so both ends speak from one definition.
//!
//! The envelope is `{"type": "...", ...}` JSON. Each known type maps to a
//! variant; an unrecognized type falls through to [`GatewayMessage::Other`]
//! and is treated as an opaque pass-through event, never an error.
//!
//! Server -> agent: `connected`, `heartbeat_ack`, `command`, `ack`, `error`.
//! Agent -> server: `heartbeat`, `claim_command`, `command_result`.
//! Observer-bound (published on customer channels): `device_status`,
//! `command_completed`.

use serde::{Deserialize, Serialize};

use crate::types::{Command, CommandResultReport, HeartbeatReport};

/// Header carrying the session token on HTTP requests and the WS upgrade.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// A single gateway protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Handshake ack carrying the deviceId the session token resolved to.
    Connected { device_id: String },

    /// Agent-driven liveness signal.
    Heartbeat {
        #[serde(flatten)]
        report: HeartbeatReport,
    },

    /// Cheap request/response ack for a heartbeat; not a queue operation.
    HeartbeatAck,

    /// Explicit pull: the agent asks for one claimed command.
    ClaimCommand,

    /// One claimed command, pushed unsolicited or in reply to
    /// `claim_command` (`None` when nothing was eligible).
    Command { command: Option<Command> },

    /// A result for a claimed command, fields flattened into the envelope.
    CommandResult {
        #[serde(flatten)]
        result: CommandResultReport,
    },

    /// Server acknowledgement of a received result.
    Ack { command_id: String },

    /// A protocol-level problem description.
    Error { message: String },

    /// Liveness change for a device, fanned out to customer observers.
    DeviceStatus { device_id: String, status: String },

    /// A command reached a terminal state; observers see live status
    /// without polling.
    CommandCompleted { command: Command },

    /// Any unrecognized message type, preserved verbatim.
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl GatewayMessage {
    /// Wire-encode as a JSON text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}

/// Request body for the HTTP authentication endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub device_id: String,
    pub device_secret: String,
}

/// Response body for the HTTP authentication endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub session_token: String,
    pub expires_at: String,
    pub heartbeat_interval_secs: u64,
}

/// Request body for the HTTP heartbeat (poll fallback) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(flatten)]
    pub report: HeartbeatReport,
    /// Results the agent could not deliver over the socket.
    #[serde(default)]
    pub results: Vec<CommandResultReport>,
}

/// Response body for the HTTP heartbeat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ack: bool,
    /// Commands claimed for this device on the poll path.
    pub commands: Vec<Command>,
    /// Interval the agent should adopt for its next cycle.
    pub next_interval_secs: u64,
}
