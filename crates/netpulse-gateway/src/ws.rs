// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device WebSocket endpoint.
//!
//! The agent presents its session token in the `x-session-token` header on
//! the upgrade request. An unresolvable or expired token completes the
//! upgrade and is immediately closed with code 1008 (policy violation) and
//! reason "Unauthorized" -- a distinguishable closure, never reaching
//! message exchange. On success the gateway sends `connected` with the
//! resolved deviceId and registers the connection.
//!
//! Disconnect handling IS the liveness-down mechanism: socket close or
//! error unregisters the connection, which broadcasts the offline status.
//! There is no server-side missed-heartbeat timer; heartbeats over the
//! socket are agent-driven liveness signaling answered with a cheap ack.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use netpulse_core::{GatewayMessage, Session};

use crate::handlers::{apply_result_report, resolve_session};
use crate::server::GatewayState;

/// WebSocket upgrade handler for GET /v1/agent/ws.
pub async fn device_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Response {
    let session = resolve_session(&state, &headers).await.ok().flatten();
    ws.on_upgrade(move |socket| async move {
        match session {
            Some(session) => handle_device_socket(socket, state, session).await,
            None => reject_unauthorized(socket).await,
        }
    })
}

/// Close the freshly upgraded socket with a policy-violation frame.
async fn reject_unauthorized(mut socket: WebSocket) {
    tracing::debug!("socket rejected: bad or missing session token");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "Unauthorized".into(),
        })))
        .await;
}

/// Drive one authenticated device connection until it closes.
async fn handle_device_socket(socket: WebSocket, state: GatewayState, session: Session) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let device_id = session.device_id.clone();

    // Outbound channel feeding the socket's write task. Direct pushes from
    // request handlers land here via the connection manager.
    let (tx, mut rx) = mpsc::channel::<GatewayMessage>(64);

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender
                .send(Message::Text(msg.to_json().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Handshake ack first, then registration (which supersedes any prior
    // connection for the device and emits the online broadcast).
    let _ = tx
        .send(GatewayMessage::Connected {
            device_id: device_id.clone(),
        })
        .await;
    let conn_id = state.connections.register(&device_id, tx.clone()).await;

    // Any work that queued up while the device was offline is pushed now.
    crate::handlers::push_available_work(&state, &device_id).await;

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                handle_device_message(&state, &session, &text, &tx).await;
            }
            Message::Close(_) => break,
            // Binary frames are not part of the protocol; ping/pong is
            // handled by the websocket layer.
            _ => {}
        }
    }

    state.connections.unregister(&device_id, conn_id).await;
    sender_task.abort();
}

/// Dispatch one text frame from the device.
async fn handle_device_message(
    state: &GatewayState,
    session: &Session,
    text: &str,
    tx: &mpsc::Sender<GatewayMessage>,
) {
    let device_id = session.device_id.as_str();

    let message: GatewayMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            // A single malformed message is dropped; the connection stays up.
            tracing::warn!(device_id, error = %e, "malformed gateway message");
            let _ = tx
                .send(GatewayMessage::Error {
                    message: format!("malformed message: {e}"),
                })
                .await;
            return;
        }
    };

    match message {
        GatewayMessage::Heartbeat { report } => {
            tracing::debug!(device_id, status = report.status.as_str(), "socket heartbeat");
            state.connections.touch(device_id);
            if let Err(e) = state.directory.touch_last_seen(device_id).await {
                tracing::warn!(device_id, error = %e, "failed to stamp last_seen");
            }
            let _ = tx.send(GatewayMessage::HeartbeatAck).await;
        }

        GatewayMessage::ClaimCommand => {
            state.connections.touch(device_id);
            let command = match state
                .queue
                .claim(device_id, 1, state.queue.default_lease())
                .await
            {
                Ok(mut claimed) => claimed.pop(),
                Err(e) => {
                    tracing::error!(device_id, error = %e, "claim failed");
                    let _ = tx
                        .send(GatewayMessage::Error {
                            message: "claim failed".to_string(),
                        })
                        .await;
                    return;
                }
            };
            let _ = tx.send(GatewayMessage::Command { command }).await;
        }

        GatewayMessage::CommandResult { result } => {
            state.connections.touch(device_id);
            let command_id = result.command_id.clone();
            match apply_result_report(state, &session.customer_id, result).await {
                Ok(_) => {
                    let _ = tx.send(GatewayMessage::Ack { command_id }).await;
                }
                Err(e) if e.is_lease_mismatch() => {
                    // The work was reclaimed or resolved elsewhere; the
                    // agent discards this attempt.
                    tracing::debug!(device_id, command_id = command_id.as_str(), "stale result");
                    let _ = tx
                        .send(GatewayMessage::Error {
                            message: format!("lease mismatch for command {command_id}"),
                        })
                        .await;
                }
                Err(e) => {
                    tracing::error!(device_id, error = %e, "result submission failed");
                    let _ = tx
                        .send(GatewayMessage::Error {
                            message: "result submission failed".to_string(),
                        })
                        .await;
                }
            }
        }

        GatewayMessage::Other(value) => {
            // Opaque pass-through: forward to the device's customer channel.
            tracing::debug!(device_id, "pass-through event from device");
            state
                .connections
                .broadcast_to_customer(&session.customer_id, &GatewayMessage::Other(value))
                .await;
        }

        other => {
            // Server-bound frames only; anything else is ignored.
            tracing::debug!(device_id, message = ?other, "ignoring unexpected frame");
        }
    }
}
