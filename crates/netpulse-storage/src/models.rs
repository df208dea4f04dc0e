// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `netpulse-core::types` for use across
//! component boundaries. This module re-exports them for convenience within
//! the storage crate.

pub use netpulse_core::types::{Command, CommandStatus, DeviceRecord};
