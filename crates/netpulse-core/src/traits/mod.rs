// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the core components and their backing stores.

pub mod directory;
pub mod lease;

pub use directory::DeviceDirectory;
pub use lease::{customer_channel, device_channel, LeaseStore};
