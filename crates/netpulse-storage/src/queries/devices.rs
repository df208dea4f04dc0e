// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device registry CRUD operations.

use rusqlite::params;

use netpulse_core::types::DeviceRecord;
use netpulse_core::NetpulseError;

use crate::database::{map_tr_err, Database};

fn map_device_row(row: &rusqlite::Row<'_>) -> Result<DeviceRecord, rusqlite::Error> {
    Ok(DeviceRecord {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        secret_hash: row.get(2)?,
        created_at: row.get(3)?,
        last_seen_at: row.get(4)?,
    })
}

/// Insert a device, or replace its customer and secret if it exists.
pub async fn upsert_device(db: &Database, device: &DeviceRecord) -> Result<(), NetpulseError> {
    let device = device.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO devices (id, customer_id, secret_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     customer_id = excluded.customer_id,
                     secret_hash = excluded.secret_hash",
                params![
                    device.id,
                    device.customer_id,
                    device.secret_hash,
                    device.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a device by id.
pub async fn get_device(db: &Database, id: &str) -> Result<Option<DeviceRecord>, NetpulseError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, customer_id, secret_hash, created_at, last_seen_at
                 FROM devices WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], map_device_row);
            match result {
                Ok(device) => Ok(Some(device)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List all registered devices, newest first.
pub async fn list_devices(db: &Database) -> Result<Vec<DeviceRecord>, NetpulseError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, customer_id, secret_hash, created_at, last_seen_at
                 FROM devices ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([], map_device_row)?;
            let mut devices = Vec::new();
            for row in rows {
                devices.push(row?);
            }
            Ok(devices)
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp a device's last activity time.
pub async fn touch_last_seen(db: &Database, id: &str, now: &str) -> Result<(), NetpulseError> {
    let id = id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE devices SET last_seen_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
