// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`DeviceDirectory`] for deterministic tests.

use async_trait::async_trait;
use dashmap::DashMap;

use netpulse_core::{DeviceDirectory, NetpulseError};

#[derive(Debug, Clone)]
struct MockDevice {
    customer_id: String,
    secret: String,
}

/// A directory with injectable device records and plain-text secrets.
#[derive(Debug, Default)]
pub struct MockDirectory {
    devices: DashMap<String, MockDevice>,
    touches: DashMap<String, usize>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or reassign) a device.
    pub fn insert(&self, device_id: &str, customer_id: &str, secret: &str) {
        self.devices.insert(
            device_id.to_string(),
            MockDevice {
                customer_id: customer_id.to_string(),
                secret: secret.to_string(),
            },
        );
    }

    /// How many times `touch_last_seen` ran for a device.
    pub fn touch_count(&self, device_id: &str) -> usize {
        self.touches.get(device_id).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl DeviceDirectory for MockDirectory {
    async fn customer_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<String>, NetpulseError> {
        Ok(self.devices.get(device_id).map(|d| d.customer_id.clone()))
    }

    async fn authenticate(
        &self,
        device_id: &str,
        device_secret: &str,
    ) -> Result<Option<String>, NetpulseError> {
        Ok(self
            .devices
            .get(device_id)
            .filter(|d| d.secret == device_secret)
            .map(|d| d.customer_id.clone()))
    }

    async fn touch_last_seen(&self, device_id: &str) -> Result<(), NetpulseError> {
        *self.touches.entry(device_id.to_string()).or_insert(0) += 1;
        Ok(())
    }
}
