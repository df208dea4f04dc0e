// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device-side agent client for the Netpulse fleet service.
//!
//! The agent authenticates against the hub, maintains a heartbeat with
//! re-auth-on-401, keeps a WebSocket with reconnect/backoff and ping-pong
//! liveness, executes claimed commands through a pluggable handler, and
//! surfaces every state change as a typed event on an internal bus. The
//! library never terminates its host: failures become events, and a
//! device that cannot reach the hub keeps retrying at bounded intervals
//! until explicitly stopped.

pub mod agent;
pub mod auth;
pub mod backoff;
pub mod events;
pub mod handler;
pub mod heartbeat;
pub mod state;
pub mod ws;

pub use netpulse_core::protocol::SESSION_TOKEN_HEADER;

pub use agent::Agent;
pub use auth::{AuthClient, AuthGrant, SharedToken};
pub use backoff::BackoffSchedule;
pub use events::{AgentBus, AgentEvent};
pub use handler::{CommandHandler, EchoHandler, ExecutionOutput};
pub use heartbeat::{HeartbeatLoop, PendingResults};
pub use state::{transition, AgentState, Input, Notification, Outcome};
pub use ws::{ws_url, WsClient, WsClientConfig, WsHandle};
