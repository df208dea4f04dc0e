// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent heartbeat loop (the HTTP poll path).
//!
//! Sends status+metrics on an interval the server may adjust per cycle,
//! carries any results that could not be delivered over the socket, and
//! dispatches commands claimed by the poll. A 401 triggers the isolated
//! re-authentication sub-flow: its own bounded retries, a silent token
//! swap on success, `auth:failed` + `heartbeat:error` events on
//! exhaustion -- but the loop never stops; the next tick runs on schedule
//! regardless. Non-401 failures are reported and retried next tick and
//! never trigger re-authentication.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use netpulse_config::model::AgentConfig;
use netpulse_core::protocol::{HeartbeatRequest, HeartbeatResponse};
use netpulse_core::{Command, CommandResultReport, HeartbeatReport, NetpulseError};

use crate::auth::{AuthClient, SharedToken};
use crate::events::{AgentBus, AgentEvent};

/// Results awaiting delivery on the poll path.
///
/// The socket path bypasses this; results land here only while the channel
/// is down, and drain into the next heartbeat request body.
#[derive(Debug, Clone, Default)]
pub struct PendingResults {
    inner: Arc<Mutex<Vec<CommandResultReport>>>,
}

impl PendingResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, result: CommandResultReport) {
        self.inner.lock().await.push(result);
    }

    pub async fn drain(&self) -> Vec<CommandResultReport> {
        std::mem::take(&mut *self.inner.lock().await)
    }

    /// Put undelivered results back at the front, preserving order.
    pub async fn restore(&self, mut results: Vec<CommandResultReport>) {
        if results.is_empty() {
            return;
        }
        let mut guard = self.inner.lock().await;
        results.append(&mut guard);
        *guard = results;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// The heartbeat loop task.
pub struct HeartbeatLoop {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
    token: SharedToken,
    auth: AuthClient,
    interval: Duration,
    events: AgentBus,
    pending_results: PendingResults,
    commands_tx: mpsc::Sender<Command>,
    started_at: Instant,
    cancel: CancellationToken,
}

impl HeartbeatLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AgentConfig,
        initial_interval: Duration,
        token: SharedToken,
        auth: AuthClient,
        events: AgentBus,
        pending_results: PendingResults,
        commands_tx: mpsc::Sender<Command>,
        cancel: CancellationToken,
    ) -> Result<Self, NetpulseError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| NetpulseError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            device_id: config.device_id.clone(),
            token,
            auth,
            interval: initial_interval,
            events,
            pending_results,
            commands_tx,
            started_at: Instant::now(),
            cancel,
        })
    }

    /// Run until cancelled. The first beat fires immediately so queued work
    /// reaches a freshly started device without waiting a full interval.
    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.beat().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => break,
            }
        }
        tracing::debug!(device_id = self.device_id.as_str(), "heartbeat loop stopped");
    }

    async fn beat(&mut self) {
        let results = self.pending_results.drain().await;
        let Some(token) = self.token.get().await else {
            self.pending_results.restore(results).await;
            self.events.publish(AgentEvent::HeartbeatError {
                message: "no session token".into(),
            });
            return;
        };

        match self.send_heartbeat(&token, &results).await {
            Ok(response) => {
                tracing::debug!(
                    commands = response.commands.len(),
                    next_interval = response.next_interval_secs,
                    "heartbeat acknowledged"
                );
                self.events.publish(AgentEvent::HeartbeatSuccess {
                    commands: response.commands.len(),
                });
                if response.next_interval_secs > 0 {
                    self.interval = Duration::from_secs(response.next_interval_secs);
                }
                for command in response.commands {
                    if self.commands_tx.send(command).await.is_err() {
                        tracing::warn!("command pipeline closed; dropping polled command");
                        break;
                    }
                }
            }
            Err(NetpulseError::Unauthorized(_)) => {
                self.pending_results.restore(results).await;
                tracing::info!("heartbeat rejected with 401; re-authenticating");
                match self.auth.authenticate(&self.cancel).await {
                    Ok(grant) => {
                        // Silent resume: the next beat carries the new token.
                        self.token.set(grant.token).await;
                        self.interval = grant.heartbeat_interval;
                    }
                    Err(e) => {
                        self.events.publish(AgentEvent::AuthFailed {
                            attempts: self.auth.max_attempts(),
                        });
                        self.events.publish(AgentEvent::HeartbeatError {
                            message: format!("re-authentication failed: {e}"),
                        });
                    }
                }
            }
            Err(e) => {
                // Retried on the next scheduled tick; never triggers re-auth.
                self.pending_results.restore(results).await;
                self.events.publish(AgentEvent::HeartbeatError {
                    message: e.to_string(),
                });
            }
        }
    }

    async fn send_heartbeat(
        &self,
        token: &str,
        results: &[CommandResultReport],
    ) -> Result<HeartbeatResponse, NetpulseError> {
        let request = HeartbeatRequest {
            report: HeartbeatReport {
                status: "ok".into(),
                metrics: serde_json::json!({
                    "uptime_secs": self.started_at.elapsed().as_secs(),
                }),
            },
            results: results.to_vec(),
        };

        let response = self
            .http
            .post(format!("{}/v1/agent/heartbeat", self.base_url))
            .header(crate::SESSION_TOKEN_HEADER, token)
            .json(&request)
            .send()
            .await
            .map_err(|e| NetpulseError::Transport {
                message: format!("heartbeat request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        match response.status().as_u16() {
            200 => response
                .json::<HeartbeatResponse>()
                .await
                .map_err(|e| NetpulseError::Protocol(format!("malformed heartbeat response: {e}"))),
            401 => Err(NetpulseError::Unauthorized("session token rejected".into())),
            status => Err(NetpulseError::Transport {
                message: format!("heartbeat endpoint returned {status}"),
                source: None,
            }),
        }
    }
}
