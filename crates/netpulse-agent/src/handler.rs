// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command execution seam.
//!
//! Running diagnostics (ping, traceroute, DNS lookups) is the host
//! application's concern; the agent only carries a command's declared
//! kind and payload to the handler and its result back to the hub.

use async_trait::async_trait;

use netpulse_core::{Command, CommandOutcome};

/// What an execution produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub status: CommandOutcome,
    pub output: serde_json::Value,
}

/// Executes claimed commands on the device.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, command: &Command) -> ExecutionOutput;
}

/// A handler that completes every command by echoing its payload.
/// Useful for wiring tests and for bring-up of new devices.
pub struct EchoHandler;

#[async_trait]
impl CommandHandler for EchoHandler {
    async fn execute(&self, command: &Command) -> ExecutionOutput {
        ExecutionOutput {
            status: CommandOutcome::Completed,
            output: serde_json::json!({
                "kind": command.kind,
                "echo": command.payload,
            }),
        }
    }
}
