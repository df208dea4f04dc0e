// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent-side WebSocket client.
//!
//! Maintains the real-time channel to the hub: connects with the session
//! token header, reconnects with exponential backoff and multiplicative
//! jitter up to a bounded attempt count, sends a ping on a fixed interval
//! and forces the socket closed when the pong misses its (shorter)
//! deadline, and queues outbound messages while disconnected in a bounded
//! FIFO that drops the oldest on overflow and drains in order on
//! reconnect.
//!
//! Exhausting the reconnect attempts emits a terminal `reconnect:failed`
//! event and leaves the socket down; the agent keeps functioning through
//! the HTTP heartbeat/poll path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use netpulse_config::model::AgentConfig;
use netpulse_core::{GatewayMessage, NetpulseError};

use crate::auth::SharedToken;
use crate::backoff::BackoffSchedule;
use crate::events::{AgentBus, AgentEvent};

/// Socket client configuration, derived from the agent section.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Full WebSocket URL of the gateway endpoint.
    pub url: String,
    pub backoff: BackoffSchedule,
    pub max_attempts: u32,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub queue_capacity: usize,
}

impl WsClientConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            url: ws_url(&config.server_url),
            backoff: BackoffSchedule::new(
                Duration::from_millis(config.reconnect_base_ms),
                Duration::from_millis(config.reconnect_max_ms),
                config.reconnect_jitter,
            ),
            max_attempts: config.reconnect_max_attempts.max(1),
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
            queue_capacity: config.outbound_queue_capacity.max(1),
        }
    }
}

/// Derive the gateway WS URL from the configured HTTP base URL.
pub fn ws_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{swapped}/v1/agent/ws")
}

/// Cheap, cloneable sending handle onto the socket client.
#[derive(Clone)]
pub struct WsHandle {
    outbound_tx: mpsc::Sender<GatewayMessage>,
    pending: Arc<Mutex<VecDeque<GatewayMessage>>>,
    connected: Arc<AtomicBool>,
    capacity: usize,
}

impl WsHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send a message, queuing it while the socket is down.
    ///
    /// The offline queue is bounded; on overflow the oldest message is
    /// dropped. Queued messages drain FIFO immediately upon reconnection.
    pub async fn send(&self, message: GatewayMessage) {
        if self.is_connected() {
            if let Err(returned) = self.outbound_tx.send(message).await {
                // The writer dropped mid-send; keep the message for the
                // next session.
                self.queue(returned.0);
            }
        } else {
            self.queue(message);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending queue poisoned").len()
    }

    fn queue(&self, message: GatewayMessage) {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        if pending.len() == self.capacity {
            pending.pop_front();
            tracing::warn!("outbound queue full; dropped oldest message");
        }
        pending.push_back(message);
    }

    fn requeue_front(&self, message: GatewayMessage) {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        pending.push_front(message);
        if pending.len() > self.capacity {
            pending.pop_front();
        }
    }

    fn drain(&self) -> Vec<GatewayMessage> {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        pending.drain(..).collect()
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

/// How a connected session ended.
enum SessionEnd {
    Cancelled,
    Closed(String),
}

/// The socket client task.
pub struct WsClient {
    config: WsClientConfig,
    token: SharedToken,
    handle: WsHandle,
    outbound_rx: mpsc::Receiver<GatewayMessage>,
    incoming_tx: mpsc::Sender<GatewayMessage>,
    events: AgentBus,
    cancel: CancellationToken,
}

impl WsClient {
    pub fn new(
        config: WsClientConfig,
        token: SharedToken,
        incoming_tx: mpsc::Sender<GatewayMessage>,
        events: AgentBus,
        cancel: CancellationToken,
    ) -> (Self, WsHandle) {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let handle = WsHandle {
            outbound_tx,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            connected: Arc::new(AtomicBool::new(false)),
            capacity: config.queue_capacity,
        };
        (
            Self {
                config,
                token,
                handle: handle.clone(),
                outbound_rx,
                incoming_tx,
                events,
                cancel,
            },
            handle,
        )
    }

    /// Run until cancelled or reconnect attempts are exhausted.
    pub async fn run(mut self) {
        let mut failures: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.connect().await {
                Ok(stream) => {
                    failures = 0;
                    self.handle.set_connected(true);
                    self.events.publish(AgentEvent::ChannelConnected);
                    tracing::info!(url = self.config.url.as_str(), "channel connected");

                    let end = self.drive(stream).await;
                    self.handle.set_connected(false);
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Closed(reason) => {
                            tracing::info!(reason = reason.as_str(), "channel dropped");
                            self.events
                                .publish(AgentEvent::ChannelDisconnected { reason });
                            // Re-enter the reconnection flow immediately;
                            // failures from here on back off.
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        attempt = failures,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "channel connect failed"
                    );
                    if failures >= self.config.max_attempts {
                        // Terminal for the socket; the agent continues in
                        // poll-only mode.
                        self.events.publish(AgentEvent::ReconnectFailed {
                            attempts: failures,
                        });
                        break;
                    }
                    let delay = self.config.backoff.delay(failures - 1);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }
        tracing::debug!("channel client stopped");
    }

    async fn connect(
        &self,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        NetpulseError,
    > {
        let token = self
            .token
            .get()
            .await
            .ok_or_else(|| NetpulseError::Unauthorized("no session token".into()))?;

        let mut request = self.config.url.as_str().into_client_request().map_err(|e| {
            NetpulseError::Transport {
                message: format!("bad gateway URL: {e}"),
                source: Some(Box::new(e)),
            }
        })?;
        request.headers_mut().insert(
            crate::SESSION_TOKEN_HEADER,
            HeaderValue::from_str(&token)
                .map_err(|e| NetpulseError::Protocol(format!("bad session token: {e}")))?,
        );

        let (stream, _response) = tokio_tungstenite::connect_async(request).await.map_err(
            |e| NetpulseError::Transport {
                message: format!("websocket connect failed: {e}"),
                source: Some(Box::new(e)),
            },
        )?;
        Ok(stream)
    }

    async fn drive(
        &mut self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> SessionEnd {
        let (mut sink, mut source) = stream.split();

        // FIFO drain of everything queued while disconnected.
        for message in self.handle.drain() {
            if sink
                .send(Message::Text(message.to_json().into()))
                .await
                .is_err()
            {
                return SessionEnd::Closed("send failed during queue drain".into());
            }
        }

        let mut ping_ticker = tokio::time::interval(self.config.ping_interval);
        ping_ticker.tick().await; // the interval's immediate first tick

        // Armed only between a sent ping and its pong.
        let pong_deadline = tokio::time::sleep(Duration::from_secs(0));
        tokio::pin!(pong_deadline);
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "shutting down".into(),
                        })))
                        .await;
                    return SessionEnd::Cancelled;
                }

                outbound = self.outbound_rx.recv() => {
                    let Some(message) = outbound else {
                        return SessionEnd::Cancelled;
                    };
                    if sink
                        .send(Message::Text(message.to_json().into()))
                        .await
                        .is_err()
                    {
                        self.handle.requeue_front(message);
                        return SessionEnd::Closed("send failed".into());
                    }
                }

                _ = ping_ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return SessionEnd::Closed("ping send failed".into());
                    }
                    awaiting_pong = true;
                    pong_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.config.pong_timeout);
                }

                _ = &mut pong_deadline, if awaiting_pong => {
                    // Missing pong forces the socket closed, which
                    // re-enters the reconnection flow.
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Away,
                            reason: "pong timeout".into(),
                        })))
                        .await;
                    return SessionEnd::Closed("pong timeout".into());
                }

                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<GatewayMessage>(text.as_str()) {
                            Ok(message) => {
                                if self.incoming_tx.send(message).await.is_err() {
                                    return SessionEnd::Cancelled;
                                }
                            }
                            Err(e) => {
                                // One bad frame is dropped, not fatal.
                                tracing::warn!(error = %e, "malformed frame from hub");
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    // Pings are answered by the protocol layer.
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by hub: {} {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by hub".into());
                        return SessionEnd::Closed(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return SessionEnd::Closed(format!("transport error: {e}"));
                    }
                    None => {
                        return SessionEnd::Closed("stream ended".into());
                    }
                },
            }
        }
    }
}
