// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Netpulse fleet service.
//!
//! The gateway is the real-time endpoint agents connect to: it
//! authenticates devices, maintains the per-device connection registry,
//! pushes claimed commands to live sockets, accepts results, and fans
//! liveness and completion events out to customer-scoped observers. HTTP
//! heartbeat polling provides the fallback path for devices without a
//! working socket.

pub mod auth;
pub mod connection;
pub mod handlers;
pub mod observers;
pub mod server;
pub mod ws;

pub use auth::OperatorAuth;
pub use connection::{ConnectionManager, DeviceHandle};
pub use netpulse_core::GatewayMessage;
pub use server::{router, start_server, GatewayState};
