// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device directory contract: the slice of the relational datastore the
//! core depends on. The gateway resolves device ownership through this
//! trait at the moment it needs it (never cached from connect time), so a
//! mid-session customer reassignment is respected.

use async_trait::async_trait;

use crate::error::NetpulseError;

/// Lookup and credential checks against the device registry.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Resolve the customer that currently owns `device_id`.
    async fn customer_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<String>, NetpulseError>;

    /// Verify `device_secret` for `device_id`.
    ///
    /// Returns the owning customer id on success, `None` on unknown device
    /// or wrong secret (the two are deliberately indistinguishable).
    async fn authenticate(
        &self,
        device_id: &str,
        device_secret: &str,
    ) -> Result<Option<String>, NetpulseError>;

    /// Record device activity (heartbeat received, socket connected).
    async fn touch_last_seen(&self, device_id: &str) -> Result<(), NetpulseError>;
}
