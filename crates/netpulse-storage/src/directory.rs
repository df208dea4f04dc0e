// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`DeviceDirectory`] implementation over the SQLite device registry.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use netpulse_core::types::timestamp_now;
use netpulse_core::{DeviceDirectory, NetpulseError};

use crate::database::Database;
use crate::queries::devices;

/// SHA-256 hex digest of a device secret, as stored at rest.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Device directory backed by the `devices` table.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Database,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceDirectory for SqliteDirectory {
    async fn customer_for_device(
        &self,
        device_id: &str,
    ) -> Result<Option<String>, NetpulseError> {
        Ok(devices::get_device(&self.db, device_id)
            .await?
            .map(|d| d.customer_id))
    }

    async fn authenticate(
        &self,
        device_id: &str,
        device_secret: &str,
    ) -> Result<Option<String>, NetpulseError> {
        let Some(device) = devices::get_device(&self.db, device_id).await? else {
            return Ok(None);
        };
        if device.secret_hash == hash_secret(device_secret) {
            Ok(Some(device.customer_id))
        } else {
            tracing::debug!(device_id, "device secret mismatch");
            Ok(None)
        }
    }

    async fn touch_last_seen(&self, device_id: &str) -> Result<(), NetpulseError> {
        devices::touch_last_seen(&self.db, device_id, &timestamp_now()).await
    }
}
