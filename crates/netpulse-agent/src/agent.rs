// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent orchestration.
//!
//! `start` performs, in order: HTTP authentication (bounded retries with
//! backoff), best-effort opening of the real-time channel (a failure here
//! is logged and the agent continues in degraded, poll-only mode rather
//! than failing start), and the heartbeat loop. A single cooperative
//! scheduler interleaves the heartbeat, ping, pong-timeout, and
//! reconnect-delay timers; none block one another. `stop` cancels every
//! pending timer and closes the socket with a normal closure; in-flight
//! HTTP calls are not forcibly aborted but their results are ignored once
//! stopped.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netpulse_config::model::AgentConfig;
use netpulse_core::types::timestamp_now;
use netpulse_core::{Command, CommandResultReport, GatewayMessage, NetpulseError};

use crate::auth::{AuthClient, SharedToken};
use crate::events::{AgentBus, AgentEvent};
use crate::handler::CommandHandler;
use crate::heartbeat::{HeartbeatLoop, PendingResults};
use crate::state::{transition, AgentState, Input, Notification};
use crate::ws::{WsClient, WsClientConfig, WsHandle};

/// The device-side agent client.
pub struct Agent {
    config: AgentConfig,
    state: AgentState,
    bus: AgentBus,
    token: SharedToken,
    cancel: CancellationToken,
    handler: Arc<dyn CommandHandler>,
    ws_handle: Option<WsHandle>,
    pending_results: PendingResults,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Agent {
    pub fn new(config: AgentConfig, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            config,
            state: AgentState::Initialized,
            bus: AgentBus::new(256),
            token: SharedToken::new(),
            cancel: CancellationToken::new(),
            handler,
            ws_handle: None,
            pending_results: PendingResults::new(),
            tasks: Vec::new(),
        }
    }

    /// The bus carrying this agent's observable events.
    pub fn events(&self) -> AgentBus {
        self.bus.clone()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Whether the real-time channel is currently up.
    pub fn channel_connected(&self) -> bool {
        self.ws_handle
            .as_ref()
            .map(|h| h.is_connected())
            .unwrap_or(false)
    }

    /// Start the agent: authenticate, open the channel, begin heartbeats.
    pub async fn start(&mut self) -> Result<(), NetpulseError> {
        if self.state != AgentState::Initialized {
            return Err(NetpulseError::Internal(format!(
                "cannot start from state {}",
                self.state
            )));
        }
        match self.bring_up().await {
            Ok(()) => {
                self.apply(Input::StartSucceeded);
                Ok(())
            }
            Err(e) => {
                self.bus.publish(AgentEvent::Error {
                    message: format!("start failed: {e}"),
                });
                self.apply(Input::StartFailed);
                Err(e)
            }
        }
    }

    /// Retry after a failed start. Success returns to running; failure
    /// stays in the error state for another attempt.
    pub async fn recover(&mut self) -> Result<(), NetpulseError> {
        if self.state != AgentState::Error {
            return Err(NetpulseError::Internal(format!(
                "cannot recover from state {}",
                self.state
            )));
        }
        self.apply(Input::RecoverStarted);
        match self.bring_up().await {
            Ok(()) => {
                self.apply(Input::RecoverSucceeded);
                Ok(())
            }
            Err(e) => {
                self.bus.publish(AgentEvent::Error {
                    message: format!("recovery failed: {e}"),
                });
                self.apply(Input::RecoverFailed);
                Err(e)
            }
        }
    }

    /// Stop the agent: cancel every timer, close the socket, drain tasks.
    /// Idempotent regardless of prior state.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.ws_handle = None;
        self.token.clear().await;
        self.apply(Input::Shutdown);
    }

    fn apply(&mut self, input: Input) {
        let outcome = transition(self.state, input);
        tracing::debug!(from = %self.state, to = %outcome.next, "state transition");
        self.state = outcome.next;
        for notification in outcome.emitted {
            match notification {
                Notification::BecameRunning => {
                    self.bus.publish(AgentEvent::Started {
                        device_id: self.config.device_id.clone(),
                    });
                }
                Notification::BecameStopped => {
                    self.bus.publish(AgentEvent::Stopped);
                }
                // The failure site already published a descriptive Error.
                Notification::BecameError | Notification::BeganRecovering => {}
            }
        }
    }

    async fn bring_up(&mut self) -> Result<(), NetpulseError> {
        let auth_client = AuthClient::new(&self.config)?;
        let grant = auth_client.authenticate(&self.cancel).await?;
        self.token.set(grant.token.clone()).await;

        let (incoming_tx, mut incoming_rx) = mpsc::channel::<GatewayMessage>(64);
        let (commands_tx, mut commands_rx) = mpsc::channel::<Command>(64);

        // Real-time channel, best-effort: the client retries and reports
        // through events; a dead socket leaves the agent in poll-only mode.
        let (ws_client, ws_handle) = WsClient::new(
            WsClientConfig::from_agent_config(&self.config),
            self.token.clone(),
            incoming_tx,
            self.bus.clone(),
            self.cancel.clone(),
        );
        self.ws_handle = Some(ws_handle.clone());
        self.tasks.push(tokio::spawn(ws_client.run()));

        // Inbound socket frames become events or enter the command pipeline.
        {
            let bus = self.bus.clone();
            let commands_tx = commands_tx.clone();
            let cancel = self.cancel.clone();
            self.tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        frame = incoming_rx.recv() => {
                            let Some(message) = frame else { break };
                            match message {
                                GatewayMessage::Command { command: Some(command) } => {
                                    if commands_tx.send(command).await.is_err() {
                                        break;
                                    }
                                }
                                GatewayMessage::Command { command: None } => {}
                                GatewayMessage::Connected { device_id } => {
                                    tracing::debug!(device_id, "hub confirmed session");
                                }
                                GatewayMessage::Ack { command_id } => {
                                    bus.publish(AgentEvent::CommandAcked { command_id });
                                }
                                GatewayMessage::Error { message } => {
                                    bus.publish(AgentEvent::Error { message });
                                }
                                GatewayMessage::HeartbeatAck => {}
                                GatewayMessage::Other(value) => {
                                    bus.publish(AgentEvent::ServerEvent { value });
                                }
                                other => {
                                    tracing::debug!(message = ?other, "ignoring frame");
                                }
                            }
                        }
                    }
                }
            }));
        }

        // Executor: runs claimed commands through the handler and routes
        // results over the socket, or onto the poll path while it is down.
        {
            let bus = self.bus.clone();
            let handler = self.handler.clone();
            let ws_handle = ws_handle.clone();
            let pending_results = self.pending_results.clone();
            let cancel = self.cancel.clone();
            self.tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        command = commands_rx.recv() => {
                            let Some(command) = command else { break };
                            bus.publish(AgentEvent::CommandReceived {
                                command: command.clone(),
                            });
                            let started = Instant::now();
                            let output = handler.execute(&command).await;
                            let report = CommandResultReport {
                                command_id: command.id.clone(),
                                claim_token: command.claim_token.clone().unwrap_or_default(),
                                status: output.status,
                                output: output.output,
                                executed_at: timestamp_now(),
                                duration_ms: started.elapsed().as_millis() as u64,
                            };
                            if ws_handle.is_connected() {
                                ws_handle
                                    .send(GatewayMessage::CommandResult { result: report })
                                    .await;
                            } else {
                                pending_results.push(report).await;
                            }
                        }
                    }
                }
            }));
        }

        let heartbeat = HeartbeatLoop::new(
            &self.config,
            grant.heartbeat_interval,
            self.token.clone(),
            auth_client,
            self.bus.clone(),
            self.pending_results.clone(),
            commands_tx,
            self.cancel.clone(),
        )?;
        self.tasks.push(tokio::spawn(heartbeat.run()));

        Ok(())
    }
}
