// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device authentication against the hub's HTTP endpoint.
//!
//! Authentication is retried with exponential backoff up to a bounded
//! attempt count. A 401 means the device credentials themselves are wrong
//! and is returned immediately -- retrying cannot help. Every request
//! carries an explicit timeout independent of the retry backoff, so a hung
//! request cannot stall the caller indefinitely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use netpulse_config::model::AgentConfig;
use netpulse_core::protocol::{AuthRequest, AuthResponse};
use netpulse_core::NetpulseError;

use crate::backoff::BackoffSchedule;

/// The session token shared across the heartbeat loop and the socket
/// client. The re-auth sub-flow swaps it in place; the next request of
/// either loop picks up the new value.
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, token: String) {
        *self.inner.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

/// A successful authentication.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: String,
    pub expires_at: String,
    pub heartbeat_interval: Duration,
}

/// HTTP client for the authentication endpoint.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
    device_secret: String,
    max_attempts: u32,
    backoff: BackoffSchedule,
}

impl AuthClient {
    pub fn new(config: &AgentConfig) -> Result<Self, NetpulseError> {
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
            device_secret: config.device_secret.clone(),
            max_attempts: config.auth_max_attempts.max(1),
            backoff: BackoffSchedule::new(
                Duration::from_millis(config.auth_base_backoff_ms),
                Duration::from_secs(60),
                config.reconnect_jitter,
            ),
        })
    }

    /// Authenticate with bounded retries.
    ///
    /// Transient failures back off and retry; a 401 returns immediately;
    /// exhaustion returns the last transport error. Cancellation aborts
    /// between attempts.
    pub async fn authenticate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthGrant, NetpulseError> {
        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(NetpulseError::Internal("agent stopping".into()));
            }
            match self.try_authenticate().await {
                Ok(grant) => {
                    tracing::info!(
                        device_id = self.device_id.as_str(),
                        attempt = attempt + 1,
                        "authenticated"
                    );
                    return Ok(grant);
                }
                Err(e @ NetpulseError::Unauthorized(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "authentication attempt failed"
                    );
                    last_error = Some(e);
                }
            }
            if attempt + 1 < self.max_attempts {
                let delay = self.backoff.delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(NetpulseError::Internal("agent stopping".into()));
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| NetpulseError::Transport {
            message: "authentication attempts exhausted".into(),
            source: None,
        }))
    }

    /// Bounded attempts configured for this client.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn try_authenticate(&self) -> Result<AuthGrant, NetpulseError> {
        let response = self
            .http
            .post(format!("{}/v1/agent/auth", self.base_url))
            .json(&AuthRequest {
                device_id: self.device_id.clone(),
                device_secret: self.device_secret.clone(),
            })
            .send()
            .await
            .map_err(|e| NetpulseError::Transport {
                message: format!("auth request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        match response.status().as_u16() {
            200 => {
                let body: AuthResponse =
                    response.json().await.map_err(|e| NetpulseError::Protocol(
                        format!("malformed auth response: {e}"),
                    ))?;
                Ok(AuthGrant {
                    token: body.session_token,
                    expires_at: body.expires_at,
                    heartbeat_interval: Duration::from_secs(body.heartbeat_interval_secs),
                })
            }
            401 => Err(NetpulseError::Unauthorized(
                "device credentials rejected".into(),
            )),
            status => Err(NetpulseError::Transport {
                message: format!("auth endpoint returned {status}"),
                source: None,
            }),
        }
    }
}
