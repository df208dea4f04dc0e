// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator authentication middleware.
//!
//! The operator API (command enqueue, command lookup, observer sockets)
//! requires `Authorization: Bearer <token>`. When no token is configured,
//! all operator requests are rejected (fail-closed). Agent authentication
//! is separate and session-token based; this middleware never sees it.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Operator auth configuration for the gateway.
#[derive(Clone)]
pub struct OperatorAuth {
    /// Expected bearer token. `None` rejects every operator request.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for OperatorAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorAuth")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Middleware that validates the operator bearer token.
pub async fn operator_auth_middleware(
    State(auth): State<OperatorAuth>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ref expected_token) = auth.bearer_token else {
        tracing::error!("operator API has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected_token => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
