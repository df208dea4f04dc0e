// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `netpulse serve` command implementation.
//!
//! Wires the hub together: SQLite storage, in-memory lease store, session
//! manager, command queue, visibility reclaimer, and the gateway server.
//! Dependencies are constructed once here and passed in; there are no
//! process-wide singletons.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use netpulse_config::model::NetpulseConfig;
use netpulse_core::{DeviceDirectory, LeaseStore, NetpulseError};
use netpulse_gateway::{ConnectionManager, GatewayState, OperatorAuth};
use netpulse_lease::{MemoryLeaseStore, SessionManager};
use netpulse_queue::{spawn_reclaimer, CommandQueue};
use netpulse_storage::{Database, SqliteDirectory};

use crate::shutdown;

/// Runs the hub until a shutdown signal arrives.
pub async fn run_serve(config: NetpulseConfig) -> Result<(), NetpulseError> {
    info!("starting netpulse hub");

    if config.server.bearer_token.is_none() {
        // Fail-closed operator API still serves agents; say so loudly.
        tracing::warn!(
            "no server.bearer_token configured -- the operator API will reject all requests"
        );
    }

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(path = config.storage.database_path.as_str(), "storage ready");

    let lease: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let directory: Arc<dyn DeviceDirectory> = Arc::new(SqliteDirectory::new(db.clone()));
    let sessions = SessionManager::new(
        lease.clone(),
        Duration::from_secs(config.session.ttl_secs),
    );
    let queue = Arc::new(CommandQueue::new(db.clone(), config.queue.clone()));
    let connections = Arc::new(ConnectionManager::new(lease.clone(), directory.clone()));

    let cancel = shutdown::install_signal_handler();

    // Claims left over from a previous process run lapse naturally and are
    // recovered by the same sweep that handles live expirations.
    let reclaimer = spawn_reclaimer(
        queue.clone(),
        Duration::from_secs(config.queue.reclaim_interval_secs),
        cancel.clone(),
    );

    let state = GatewayState {
        queue,
        sessions,
        directory,
        lease,
        connections,
        auth: OperatorAuth {
            bearer_token: config.server.bearer_token.clone(),
        },
        heartbeat_interval_secs: config.session.heartbeat_interval_secs,
        start_time: std::time::Instant::now(),
    };

    tokio::select! {
        result = netpulse_gateway::start_server(&config.server.host, config.server.port, state) => {
            result?;
        }
        _ = cancel.cancelled() => {
            info!("shutdown signal received");
        }
    }

    let _ = reclaimer.await;
    info!("netpulse hub shutdown complete");
    Ok(())
}
