// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease store contract: key/value with TTL plus channel pub/sub.
//!
//! Command leases and session tokens are built on these primitives. Every
//! operation is atomic at single-key granularity; no multi-key transactions
//! are assumed. Implementations back onto Redis-class stores in production
//! deployments; the workspace ships an in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::NetpulseError;

/// Atomic key/value store with expiry and best-effort channel publish.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Store `value` under `key` only if the key is absent.
    ///
    /// Returns `true` if the value was stored, `false` if the key already
    /// held an unexpired value.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, NetpulseError>;

    /// Fetch the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, NetpulseError>;

    /// Store `value` under `key`, replacing any prior value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), NetpulseError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), NetpulseError>;

    /// Publish `message` on `channel`. Delivery is best-effort: a channel
    /// with no subscribers is not an error.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), NetpulseError>;

    /// Subscribe to `channel`, receiving messages published after this call.
    async fn subscribe(&self, channel: &str)
        -> Result<broadcast::Receiver<String>, NetpulseError>;
}

/// Broadcast channel carrying events for all observers of a customer's devices.
pub fn customer_channel(customer_id: &str) -> String {
    format!("customer:{customer_id}")
}

/// Channel for direct addressing of a single device.
pub fn device_channel(device_id: &str) -> String {
    format!("device:{device_id}")
}
