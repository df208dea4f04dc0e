// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers: agent authentication, heartbeat polling, the
//! operator command API, and health.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use netpulse_core::protocol::{
    AuthRequest, AuthResponse, HeartbeatRequest, HeartbeatResponse, SESSION_TOKEN_HEADER,
};
use netpulse_core::types::timestamp_after;
use netpulse_core::{Command, CommandResultReport, GatewayMessage, NetpulseError, Session};

use crate::server::GatewayState;

/// Request body for POST /v1/commands.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub device_id: String,
    #[serde(default = "default_source")]
    pub source: String,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i64,
}

fn default_source() -> String {
    "api".to_string()
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub connected_devices: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "unauthorized".to_string(),
        }),
    )
        .into_response()
}

fn internal_error(e: &NetpulseError) -> Response {
    tracing::error!(error = %e, "handler failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}

/// Resolve the session token header, or `None` when absent/expired.
pub(crate) async fn resolve_session(
    state: &GatewayState,
    headers: &HeaderMap,
) -> Result<Option<Session>, NetpulseError> {
    let Some(token) = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };
    state.sessions.resolve(token).await
}

/// POST /v1/agent/auth
///
/// Verifies device credentials and issues a session token with its expiry
/// and the initial heartbeat-interval suggestion.
pub async fn post_agent_auth(
    State(state): State<GatewayState>,
    Json(body): Json<AuthRequest>,
) -> Response {
    let customer_id = match state
        .directory
        .authenticate(&body.device_id, &body.device_secret)
        .await
    {
        Ok(Some(customer_id)) => customer_id,
        Ok(None) => {
            tracing::debug!(device_id = body.device_id.as_str(), "auth rejected");
            return unauthorized();
        }
        Err(e) => return internal_error(&e),
    };

    let session = match state.sessions.issue(&body.device_id, &customer_id).await {
        Ok(session) => session,
        Err(e) => return internal_error(&e),
    };

    tracing::info!(device_id = body.device_id.as_str(), "device authenticated");
    (
        StatusCode::OK,
        Json(AuthResponse {
            session_token: session.token,
            expires_at: timestamp_after(state.sessions.ttl()),
            heartbeat_interval_secs: state.heartbeat_interval_secs,
        }),
    )
        .into_response()
}

/// POST /v1/agent/heartbeat
///
/// The polling fallback: accepts status+metrics (plus any results the agent
/// could not deliver over the socket), claims pending commands, and returns
/// the next suggested interval.
pub async fn post_agent_heartbeat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatRequest>,
) -> Response {
    let session = match resolve_session(&state, &headers).await {
        Ok(Some(session)) => session,
        Ok(None) => return unauthorized(),
        Err(e) => return internal_error(&e),
    };
    let device_id = session.device_id.as_str();

    tracing::debug!(
        device_id,
        status = body.report.status.as_str(),
        results = body.results.len(),
        "heartbeat received"
    );
    if let Err(e) = state.directory.touch_last_seen(device_id).await {
        tracing::warn!(device_id, error = %e, "failed to stamp last_seen");
    }

    for result in body.results {
        // Stale results are expected after reclaim; drop them quietly.
        if let Err(e) = apply_result_report(&state, &session.customer_id, result).await {
            if !e.is_lease_mismatch() {
                tracing::warn!(device_id, error = %e, "heartbeat-carried result failed");
            }
        }
    }

    let commands = match state
        .queue
        .claim(
            device_id,
            state.queue.max_poll_commands(),
            state.queue.default_lease(),
        )
        .await
    {
        Ok(commands) => commands,
        Err(e) => return internal_error(&e),
    };

    (
        StatusCode::OK,
        Json(HeartbeatResponse {
            ack: true,
            commands,
            next_interval_secs: state.heartbeat_interval_secs,
        }),
    )
        .into_response()
}

/// POST /v1/commands (operator)
///
/// Enqueues a command and, when the target device holds a live socket on
/// this instance, claims and pushes work immediately. Devices without a
/// live channel pick the command up on their next heartbeat or pull.
pub async fn post_commands(
    State(state): State<GatewayState>,
    Json(body): Json<EnqueueRequest>,
) -> Response {
    let command = match state
        .queue
        .enqueue(
            &body.device_id,
            &body.source,
            &body.kind,
            body.payload,
            body.priority,
        )
        .await
    {
        Ok(command) => command,
        Err(e) => return internal_error(&e),
    };

    push_available_work(&state, &body.device_id).await;

    (StatusCode::CREATED, Json(command)).into_response()
}

/// GET /v1/commands/{id} (operator)
pub async fn get_command(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.queue.get(&id).await {
        Ok(Some(command)) => (StatusCode::OK, Json(command)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no command {id}"),
            }),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /health (public)
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connected_devices: state.connections.connected_count(),
    })
}

/// Submit a result through the queue and fan the completion out to the
/// customer's observers. Shared by the socket path and the heartbeat path.
pub(crate) async fn apply_result_report(
    state: &GatewayState,
    customer_id: &str,
    result: CommandResultReport,
) -> Result<Command, NetpulseError> {
    let command = state
        .queue
        .submit_result(&result.command_id, &result.claim_token, result.status)
        .await?;
    state
        .connections
        .broadcast_to_customer(
            customer_id,
            &GatewayMessage::CommandCompleted {
                command: command.clone(),
            },
        )
        .await;
    Ok(command)
}

/// Claim one command and push it to the device's live channel, if any.
///
/// A push that loses the race with a disconnect leaves a claimed command
/// whose lease simply lapses; the reclaimer makes it visible again.
pub(crate) async fn push_available_work(state: &GatewayState, device_id: &str) {
    if !state.connections.is_connected(device_id) {
        return;
    }
    let claimed = match state
        .queue
        .claim(device_id, 1, state.queue.default_lease())
        .await
    {
        Ok(claimed) => claimed,
        Err(e) => {
            tracing::warn!(device_id, error = %e, "push claim failed");
            return;
        }
    };
    let Some(command) = claimed.into_iter().next() else {
        return;
    };
    let command_id = command.id.clone();
    if let Err(e) = state
        .connections
        .send_to_device(
            device_id,
            GatewayMessage::Command {
                command: Some(command),
            },
        )
        .await
    {
        tracing::debug!(
            device_id,
            command_id = command_id.as_str(),
            error = %e,
            "push failed; lease will lapse and requeue"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_request_applies_defaults() {
        let json = r#"{"device_id": "pi-01", "kind": "ping"}"#;
        let req: EnqueueRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.source, "api");
        assert_eq!(req.priority, 0);
        assert!(req.payload.is_null());
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
            connected_devices: 3,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"uptime_secs\":42"));
        assert!(json.contains("\"connected_devices\":3"));
    }
}
