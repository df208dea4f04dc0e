// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-side registry of live per-device transport channels.
//!
//! Maps deviceId -> active outbound channel for direct push, and fans
//! customer-scoped events out through the lease store's pub/sub channels
//! (one logical channel per customerId; observer sockets are the
//! subscribers, so one slow observer never blocks delivery to the rest).
//!
//! State is process-local: a device is only directly addressable on the
//! instance holding its socket. Direct push therefore returns
//! `NotConnected` rather than queuing, and callers fall back to
//! queue-based pull.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use netpulse_core::types::timestamp_now;
use netpulse_core::{
    customer_channel, device_channel, DeviceDirectory, GatewayMessage, LeaseStore, NetpulseError,
};

/// Outbound half of one device connection.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    /// Process-unique id distinguishing this connection from a successor
    /// on the same device.
    pub conn_id: u64,
    /// Sender feeding the socket's write task.
    pub tx: mpsc::Sender<GatewayMessage>,
    pub connected_at: String,
    pub last_activity_at: String,
}

/// Registry of live device connections plus customer broadcast fan-out.
pub struct ConnectionManager {
    devices: DashMap<String, DeviceHandle>,
    lease: Arc<dyn LeaseStore>,
    directory: Arc<dyn DeviceDirectory>,
    next_conn_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(lease: Arc<dyn LeaseStore>, directory: Arc<dyn DeviceDirectory>) -> Self {
        Self {
            devices: DashMap::new(),
            lease,
            directory,
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection for `device_id`, superseding any prior one.
    ///
    /// At most one connection per device: the superseded handle's sender is
    /// dropped here, which ends the old socket's write task and closes it.
    /// Returns the new connection's id, which the socket task passes back
    /// to [`unregister`](Self::unregister) so a stale task cannot evict its
    /// successor.
    pub async fn register(&self, device_id: &str, tx: mpsc::Sender<GatewayMessage>) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let now = timestamp_now();
        let superseded = self.devices.insert(
            device_id.to_string(),
            DeviceHandle {
                conn_id,
                tx,
                connected_at: now.clone(),
                last_activity_at: now,
            },
        );
        if let Some(old) = superseded {
            tracing::info!(
                device_id,
                old_conn_id = old.conn_id,
                new_conn_id = conn_id,
                "connection superseded"
            );
        }
        metrics::gauge!("netpulse_connected_devices").set(self.devices.len() as f64);

        self.broadcast_status(device_id, "online").await;
        conn_id
    }

    /// Remove the mapping for `device_id` if `conn_id` still owns it, and
    /// broadcast the offline status to the device's current customer.
    ///
    /// The customer is resolved at unregistration time, not cached from
    /// connect time, so a mid-session reassignment is respected. A stale
    /// `conn_id` (the connection was superseded) is a no-op.
    pub async fn unregister(&self, device_id: &str, conn_id: u64) {
        let removed = self
            .devices
            .remove_if(device_id, |_, handle| handle.conn_id == conn_id);
        if removed.is_none() {
            return;
        }
        metrics::gauge!("netpulse_connected_devices").set(self.devices.len() as f64);
        tracing::info!(device_id, conn_id, "device disconnected");

        self.broadcast_status(device_id, "offline").await;
    }

    /// Push a message to a device's live channel.
    pub async fn send_to_device(
        &self,
        device_id: &str,
        message: GatewayMessage,
    ) -> Result<(), NetpulseError> {
        let tx = match self.devices.get(device_id) {
            Some(handle) => handle.tx.clone(),
            None => {
                return Err(NetpulseError::NotConnected {
                    device_id: device_id.to_string(),
                })
            }
        };
        tx.send(message)
            .await
            .map_err(|_| NetpulseError::NotConnected {
                device_id: device_id.to_string(),
            })
    }

    /// Fan a message out to every observer of a customer's devices.
    /// Best-effort: delivery failures to individual subscribers never abort
    /// delivery to others.
    pub async fn broadcast_to_customer(&self, customer_id: &str, message: &GatewayMessage) {
        if let Err(e) = self
            .lease
            .publish(&customer_channel(customer_id), &message.to_json())
            .await
        {
            tracing::warn!(customer_id, error = %e, "customer broadcast failed");
        }
    }

    /// Record device activity on its live connection.
    pub fn touch(&self, device_id: &str) {
        if let Some(mut handle) = self.devices.get_mut(device_id) {
            handle.last_activity_at = timestamp_now();
        }
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn connected_count(&self) -> usize {
        self.devices.len()
    }

    /// Resolve the device's current customer and broadcast a status change
    /// on both the customer channel and the device's own channel.
    async fn broadcast_status(&self, device_id: &str, status: &str) {
        let message = GatewayMessage::DeviceStatus {
            device_id: device_id.to_string(),
            status: status.to_string(),
        };
        if let Err(e) = self
            .lease
            .publish(&device_channel(device_id), &message.to_json())
            .await
        {
            tracing::warn!(device_id, error = %e, "device channel publish failed");
        }

        let customer_id = match self.directory.customer_for_device(device_id).await {
            Ok(Some(customer_id)) => customer_id,
            Ok(None) => {
                tracing::warn!(device_id, "status broadcast skipped: device not in directory");
                return;
            }
            Err(e) => {
                tracing::warn!(device_id, error = %e, "customer lookup failed for status broadcast");
                return;
            }
        };
        self.broadcast_to_customer(&customer_id, &message).await;
    }
}
