// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Netpulse integration tests.

pub mod harness;
pub mod mock_directory;

pub use harness::{HubHarness, OPERATOR_TOKEN};
pub use mock_directory::MockDirectory;
