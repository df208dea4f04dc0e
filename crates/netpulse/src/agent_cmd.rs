// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `netpulse agent run` command implementation.
//!
//! Runs the device-side client with the echo handler (real diagnostic
//! executors are wired in by the fleet image) and logs every agent event.
//! A failed start keeps recovering on an interval; the device never gives
//! up short of an explicit stop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use netpulse_agent::{Agent, AgentEvent, EchoHandler};
use netpulse_config::model::NetpulseConfig;
use netpulse_core::NetpulseError;

use crate::shutdown;

/// Delay between recovery attempts after a failed start.
const RECOVER_DELAY: Duration = Duration::from_secs(10);

/// Runs the agent until a shutdown signal arrives.
pub async fn run_agent(config: NetpulseConfig) -> Result<(), NetpulseError> {
    if config.agent.device_id.is_empty() || config.agent.device_secret.is_empty() {
        return Err(NetpulseError::Config(
            "agent.device_id and agent.device_secret must be set".into(),
        ));
    }

    info!(
        device_id = config.agent.device_id.as_str(),
        server = config.agent.server_url.as_str(),
        "starting netpulse agent"
    );

    let mut agent = Agent::new(config.agent, Arc::new(EchoHandler));
    let cancel = shutdown::install_signal_handler();

    // Surface agent events into the log.
    {
        let mut events = agent.events().subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    envelope = events.recv() => match envelope {
                        Ok(envelope) => log_event(&envelope.event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "event log fell behind");
                        }
                        Err(_) => break,
                    },
                }
            }
        });
    }

    if let Err(e) = agent.start().await {
        warn!(error = %e, "start failed; entering recovery loop");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(RECOVER_DELAY) => {}
                _ = cancel.cancelled() => {
                    agent.stop().await;
                    return Ok(());
                }
            }
            match agent.recover().await {
                Ok(()) => break,
                Err(e) => warn!(error = %e, "recovery failed; will retry"),
            }
        }
    }

    cancel.cancelled().await;
    agent.stop().await;
    info!("netpulse agent shutdown complete");
    Ok(())
}

fn log_event(event: &AgentEvent) {
    match event {
        AgentEvent::Started { device_id } => info!(device_id = device_id.as_str(), "agent running"),
        AgentEvent::Stopped => info!("agent stopped"),
        AgentEvent::ChannelConnected => info!("real-time channel up"),
        AgentEvent::ChannelDisconnected { reason } => {
            info!(reason = reason.as_str(), "real-time channel down")
        }
        AgentEvent::ReconnectFailed { attempts } => {
            warn!(attempts = *attempts, "channel reconnection exhausted; continuing on poll path")
        }
        AgentEvent::AuthFailed { attempts } => {
            warn!(attempts = *attempts, "re-authentication exhausted")
        }
        AgentEvent::HeartbeatSuccess { commands } => {
            if *commands > 0 {
                info!(commands = *commands, "heartbeat delivered commands");
            }
        }
        AgentEvent::HeartbeatError { message } => warn!(message = message.as_str(), "heartbeat failed"),
        AgentEvent::CommandReceived { command } => {
            info!(command_id = command.id.as_str(), kind = command.kind.as_str(), "command received")
        }
        AgentEvent::CommandAcked { command_id } => {
            info!(command_id = command_id.as_str(), "result acknowledged")
        }
        AgentEvent::ServerEvent { value } => info!(event = %value, "server event"),
        AgentEvent::Error { message } => warn!(message = message.as_str(), "agent error"),
    }
}
