// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease-based command queue: at-least-once, single-claimant delivery.
//!
//! [`CommandQueue`] owns the command lifecycle; [`spawn_reclaimer`] runs
//! the visibility-timeout recovery sweep that makes abandoned leases
//! claimable again.

pub mod command_queue;
pub mod reclaimer;

pub use command_queue::CommandQueue;
pub use reclaimer::spawn_reclaimer;
