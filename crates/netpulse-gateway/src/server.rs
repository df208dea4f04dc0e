// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP/WebSocket server built on axum.
//!
//! Sets up routes, middleware, and shared state. Three route groups:
//! - public: `/health`
//! - agent: `/v1/agent/*` (session-token auth inside the handlers)
//! - operator: `/v1/commands*`, `/v1/customers/*` (bearer middleware)

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use netpulse_core::{DeviceDirectory, LeaseStore, NetpulseError};
use netpulse_lease::SessionManager;
use netpulse_queue::CommandQueue;

use crate::auth::{operator_auth_middleware, OperatorAuth};
use crate::connection::ConnectionManager;
use crate::handlers;
use crate::observers;
use crate::ws;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub queue: Arc<CommandQueue>,
    pub sessions: SessionManager,
    pub directory: Arc<dyn DeviceDirectory>,
    pub lease: Arc<dyn LeaseStore>,
    pub connections: Arc<ConnectionManager>,
    pub auth: OperatorAuth,
    /// Heartbeat interval suggested to agents, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Build the gateway router over the given state.
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .with_state(state.clone());

    // Agents authenticate with session tokens resolved inside each handler
    // (and at the WS handshake), not through the operator middleware.
    let agent_routes = Router::new()
        .route("/v1/agent/auth", post(handlers::post_agent_auth))
        .route("/v1/agent/heartbeat", post(handlers::post_agent_heartbeat))
        .route("/v1/agent/ws", get(ws::device_ws_handler))
        .with_state(state.clone());

    let operator_routes = Router::new()
        .route("/v1/commands", post(handlers::post_commands))
        .route("/v1/commands/{id}", get(handlers::get_command))
        .route(
            "/v1/customers/{customer_id}/ws",
            get(observers::customer_ws_handler),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            operator_auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(agent_routes)
        .merge(operator_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve the gateway until the task is aborted.
pub async fn start_server(host: &str, port: u16, state: GatewayState) -> Result<(), NetpulseError> {
    let addr = format!("{host}:{port}");
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NetpulseError::Transport {
                message: format!("failed to bind gateway to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| NetpulseError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })
}
