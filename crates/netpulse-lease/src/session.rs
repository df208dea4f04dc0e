// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session issuance and resolution on top of the lease store.
//!
//! A session is a `session:{token}` key holding the serialized [`Session`]
//! with TTL equal to the session lifetime, so natural expiry needs no
//! sweeper: an expired token simply resolves to nothing. A token uniquely
//! resolves to exactly one device while unexpired.

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;

use netpulse_core::types::timestamp_now;
use netpulse_core::{LeaseStore, NetpulseError, Session};

/// Token length in alphanumeric characters (~286 bits of entropy).
const TOKEN_LEN: usize = 48;

/// Attempts to place a fresh token before giving up. Collisions at this
/// entropy are not expected; the bound exists so a broken store cannot
/// loop forever.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Issues, resolves, and revokes device session tokens.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn LeaseStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn LeaseStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Session lifetime applied to newly issued tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh session for an authenticated device.
    pub async fn issue(
        &self,
        device_id: &str,
        customer_id: &str,
    ) -> Result<Session, NetpulseError> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = generate_token();
            let session = Session {
                token: token.clone(),
                device_id: device_id.to_string(),
                customer_id: customer_id.to_string(),
                issued_at: timestamp_now(),
                ttl_secs: self.ttl.as_secs(),
            };
            let value = serde_json::to_string(&session)
                .map_err(|e| NetpulseError::Internal(format!("session encode: {e}")))?;

            if self
                .store
                .set_if_absent(&session_key(&token), &value, self.ttl)
                .await?
            {
                tracing::debug!(device_id, "session issued");
                return Ok(session);
            }
        }
        Err(NetpulseError::Internal(
            "failed to place a unique session token".to_string(),
        ))
    }

    /// Resolve a token to its session, or `None` if unknown or expired.
    pub async fn resolve(&self, token: &str) -> Result<Option<Session>, NetpulseError> {
        let Some(value) = self.store.get(&session_key(token)).await? else {
            return Ok(None);
        };
        let session: Session = serde_json::from_str(&value)
            .map_err(|e| NetpulseError::Internal(format!("session decode: {e}")))?;
        Ok(Some(session))
    }

    /// Remove a session ahead of its natural expiry (device sign-out).
    pub async fn revoke(&self, token: &str) -> Result<(), NetpulseError> {
        self.store.delete(&session_key(token)).await
    }
}

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLeaseStore;

    fn manager(ttl: Duration) -> SessionManager {
        SessionManager::new(Arc::new(MemoryLeaseStore::new()), ttl)
    }

    #[tokio::test]
    async fn issue_and_resolve_round_trips() {
        let sessions = manager(Duration::from_secs(60));
        let issued = sessions.issue("pi-01", "acme").await.unwrap();

        assert_eq!(issued.token.len(), TOKEN_LEN);
        let resolved = sessions.resolve(&issued.token).await.unwrap().unwrap();
        assert_eq!(resolved.device_id, "pi-01");
        assert_eq!(resolved.customer_id, "acme");
        assert_eq!(resolved.ttl_secs, 60);
    }

    #[tokio::test]
    async fn unknown_token_resolves_to_none() {
        let sessions = manager(Duration::from_secs(60));
        assert!(sessions.resolve("no-such-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_resolves_to_none() {
        let sessions = manager(Duration::from_millis(20));
        let issued = sessions.issue("pi-01", "acme").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sessions.resolve(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_removes_session() {
        let sessions = manager(Duration::from_secs(60));
        let issued = sessions.issue("pi-01", "acme").await.unwrap();
        sessions.revoke(&issued.token).await.unwrap();
        assert!(sessions.resolve(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tokens_are_unique_per_issue() {
        let sessions = manager(Duration::from_secs(60));
        let a = sessions.issue("pi-01", "acme").await.unwrap();
        let b = sessions.issue("pi-01", "acme").await.unwrap();
        assert_ne!(a.token, b.token);
        // Both resolve independently.
        assert!(sessions.resolve(&a.token).await.unwrap().is_some());
        assert!(sessions.resolve(&b.token).await.unwrap().is_some());
    }
}
