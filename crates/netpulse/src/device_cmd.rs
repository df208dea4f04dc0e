// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `netpulse device` subcommands: registry administration.

use rand::distributions::Alphanumeric;
use rand::Rng;

use netpulse_config::model::NetpulseConfig;
use netpulse_core::types::{timestamp_now, DeviceRecord};
use netpulse_core::NetpulseError;
use netpulse_storage::queries::devices;
use netpulse_storage::{hash_secret, Database};

/// Generated device secret length.
const SECRET_LEN: usize = 40;

/// Register a device and print the generated secret (shown exactly once;
/// only its hash is stored).
pub async fn run_add(
    config: &NetpulseConfig,
    device_id: &str,
    customer_id: &str,
) -> Result<(), NetpulseError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;

    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();

    devices::upsert_device(
        &db,
        &DeviceRecord {
            id: device_id.to_string(),
            customer_id: customer_id.to_string(),
            secret_hash: hash_secret(&secret),
            created_at: timestamp_now(),
            last_seen_at: None,
        },
    )
    .await?;

    println!("device registered: {device_id} (customer: {customer_id})");
    println!("device secret (store it now; it is not recoverable): {secret}");

    db.close().await?;
    Ok(())
}

/// Print all registered devices.
pub async fn run_list(config: &NetpulseConfig) -> Result<(), NetpulseError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;

    let all = devices::list_devices(&db).await?;
    if all.is_empty() {
        println!("no devices registered");
    }
    for device in all {
        println!(
            "{}\tcustomer={}\tcreated={}\tlast_seen={}",
            device.id,
            device.customer_id,
            device.created_at,
            device.last_seen_at.as_deref().unwrap_or("never"),
        );
    }

    db.close().await?;
    Ok(())
}
