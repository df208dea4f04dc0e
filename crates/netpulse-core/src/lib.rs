// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Netpulse fleet service.
//!
//! This crate provides the error taxonomy, domain types, and the trait
//! seams (lease store, device directory) used throughout the workspace.
//! Backing-store implementations live in their own crates and are
//! constructed once at process start, then passed in.

pub mod error;
pub mod protocol;
pub mod traits;
pub mod types;

pub use error::NetpulseError;
pub use protocol::{GatewayMessage, SESSION_TOKEN_HEADER};
pub use traits::{customer_channel, device_channel, DeviceDirectory, LeaseStore};
pub use types::{
    Command, CommandOutcome, CommandResultReport, CommandStatus, DeviceRecord, HeartbeatReport,
    Session,
};
