// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer observer WebSocket endpoint.
//!
//! Dashboards and admin tools subscribe to one customer's broadcast
//! channel and receive `device_status` / `command_completed` events as
//! they happen, without polling. Operator bearer auth is enforced by the
//! route middleware before the upgrade.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use tokio::sync::broadcast;

use netpulse_core::customer_channel;

use crate::server::GatewayState;

/// WebSocket upgrade handler for GET /v1/customers/{customer_id}/ws.
pub async fn customer_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Path(customer_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| observe_customer(socket, state, customer_id))
}

/// Forward the customer's broadcast channel onto the observer socket.
async fn observe_customer(mut socket: WebSocket, state: GatewayState, customer_id: String) {
    let mut events = match state.lease.subscribe(&customer_channel(&customer_id)).await {
        Ok(events) => events,
        Err(e) => {
            tracing::error!(customer_id, error = %e, "observer subscribe failed");
            return;
        }
    };
    tracing::debug!(customer_id, "observer attached");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // This observer fell behind; others are unaffected.
                    tracing::warn!(customer_id, missed, "observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Observers are read-only; inbound frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(customer_id, "observer detached");
}
