// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness: a complete hub on an ephemeral port.
//!
//! Assembles temp SQLite storage, an in-memory lease store, the command
//! queue, and the real gateway router, then serves it on 127.0.0.1:0.
//! Tests drive the same HTTP/WS surface real agents use.

use std::sync::Arc;
use std::time::Duration;

use netpulse_config::model::{AgentConfig, QueueConfig};
use netpulse_core::types::timestamp_now;
use netpulse_core::{DeviceRecord, LeaseStore, NetpulseError};
use netpulse_gateway::{ConnectionManager, GatewayState, OperatorAuth};
use netpulse_lease::{MemoryLeaseStore, SessionManager};
use netpulse_queue::CommandQueue;
use netpulse_storage::queries::devices;
use netpulse_storage::{hash_secret, Database, SqliteDirectory};

/// Bearer token the harness configures for the operator API.
pub const OPERATOR_TOKEN: &str = "test-operator-token";

/// A running hub instance plus handles into its internals.
pub struct HubHarness {
    /// Base URL ("http://127.0.0.1:PORT") of the running gateway.
    pub base_url: String,
    pub db: Database,
    pub queue: Arc<CommandQueue>,
    pub lease: Arc<MemoryLeaseStore>,
    pub sessions: SessionManager,
    pub connections: Arc<ConnectionManager>,
    server: tokio::task::JoinHandle<()>,
    _temp_dir: tempfile::TempDir,
}

impl HubHarness {
    /// Start a hub with default queue settings and a 60s session TTL.
    pub async fn start() -> Result<Self, NetpulseError> {
        Self::start_with(QueueConfig::default(), Duration::from_secs(60)).await
    }

    /// Start a hub with explicit queue settings and session TTL.
    pub async fn start_with(
        queue_config: QueueConfig,
        session_ttl: Duration,
    ) -> Result<Self, NetpulseError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| NetpulseError::Storage {
            source: Box::new(e),
        })?;
        let db_path = temp_dir.path().join("hub.db");
        let db = Database::open(db_path.to_str().unwrap()).await?;

        let lease = Arc::new(MemoryLeaseStore::new());
        let lease_dyn: Arc<dyn LeaseStore> = lease.clone();
        let directory = Arc::new(SqliteDirectory::new(db.clone()));
        let sessions = SessionManager::new(lease_dyn.clone(), session_ttl);
        let queue = Arc::new(CommandQueue::new(db.clone(), queue_config));
        let connections = Arc::new(ConnectionManager::new(
            lease_dyn.clone(),
            directory.clone(),
        ));

        let state = GatewayState {
            queue: queue.clone(),
            sessions: sessions.clone(),
            directory,
            lease: lease_dyn,
            connections: connections.clone(),
            auth: OperatorAuth {
                bearer_token: Some(OPERATOR_TOKEN.to_string()),
            },
            // Short interval so poll-path tests drain within their deadlines.
            heartbeat_interval_secs: 1,
            start_time: std::time::Instant::now(),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| NetpulseError::Transport {
                message: format!("harness bind failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let addr = listener.local_addr().map_err(|e| NetpulseError::Transport {
            message: format!("harness addr: {e}"),
            source: Some(Box::new(e)),
        })?;
        let router = netpulse_gateway::router(state);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            db,
            queue,
            lease,
            sessions,
            connections,
            server,
            _temp_dir: temp_dir,
        })
    }

    /// Register a device with the given plain secret.
    pub async fn register_device(
        &self,
        device_id: &str,
        customer_id: &str,
        secret: &str,
    ) -> Result<(), NetpulseError> {
        devices::upsert_device(
            &self.db,
            &DeviceRecord {
                id: device_id.to_string(),
                customer_id: customer_id.to_string(),
                secret_hash: hash_secret(secret),
                created_at: timestamp_now(),
                last_seen_at: None,
            },
        )
        .await
    }

    /// An agent config pointed at this hub, tuned for fast tests.
    pub fn agent_config(&self, device_id: &str, secret: &str) -> AgentConfig {
        AgentConfig {
            server_url: self.base_url.clone(),
            device_id: device_id.to_string(),
            device_secret: secret.to_string(),
            http_timeout_secs: 5,
            auth_max_attempts: 3,
            auth_base_backoff_ms: 10,
            heartbeat_interval_secs: 1,
            reconnect_base_ms: 10,
            reconnect_max_ms: 100,
            reconnect_max_attempts: 5,
            reconnect_jitter: 0.0,
            ping_interval_secs: 5,
            pong_timeout_secs: 2,
            outbound_queue_capacity: 32,
        }
    }
}

impl Drop for HubHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}
