// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Netpulse fleet service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, producing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Netpulse configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values; a bare `netpulse serve` works against a local SQLite file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetpulseConfig {
    /// Hub HTTP/WebSocket server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Command queue and lease settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Device session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Device-side agent client settings (used by `netpulse agent run`).
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Hub server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token for the operator API. `None` rejects all operator
    /// requests (fail-closed); agent auth is unaffected.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            log_level: default_log_level(),
        }
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

/// Command queue and lease configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Visibility timeout granted to each claim, in seconds.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Claim cycles before an unresolved command is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Interval between visibility reclaimer sweeps, in seconds.
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,

    /// Maximum commands handed out per heartbeat poll.
    #[serde(default = "default_max_poll_commands")]
    pub max_poll_commands: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            max_attempts: default_max_attempts(),
            reclaim_interval_secs: default_reclaim_interval_secs(),
            max_poll_commands: default_max_poll_commands(),
        }
    }
}

/// Device session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Session token lifetime, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Heartbeat interval suggested to agents at authentication.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

/// Device-side agent client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Base URL of the hub ("http://hub.example.com:8340").
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// This device's identifier.
    #[serde(default)]
    pub device_id: String,

    /// This device's secret.
    #[serde(default)]
    pub device_secret: String,

    /// Ceiling on each auth/heartbeat HTTP request, independent of
    /// retry backoff. A hung request cannot stall the loop past this.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Bounded attempts for authentication and the 401 re-auth sub-flow.
    #[serde(default = "default_auth_max_attempts")]
    pub auth_max_attempts: u32,

    /// Base backoff between auth attempts, in milliseconds.
    #[serde(default = "default_auth_base_backoff_ms")]
    pub auth_base_backoff_ms: u64,

    /// Heartbeat interval used until the server suggests one, in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Base interval between WebSocket reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Cap on the reconnect interval, in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Consecutive reconnect failures before giving up on the socket.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Multiplicative jitter applied to each reconnect delay, in [0, 1].
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,

    /// Interval between pings while the socket is up, in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// How long to wait for a pong before forcing the socket closed, in
    /// seconds. Shorter than the ping interval.
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Outbound messages queued while disconnected; oldest dropped on
    /// overflow.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            device_id: String::new(),
            device_secret: String::new(),
            http_timeout_secs: default_http_timeout_secs(),
            auth_max_attempts: default_auth_max_attempts(),
            auth_base_backoff_ms: default_auth_base_backoff_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_jitter: default_reconnect_jitter(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8340
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> String {
    "netpulse.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lease_secs() -> u64 {
    60
}

fn default_max_attempts() -> i64 {
    3
}

fn default_reclaim_interval_secs() -> u64 {
    15
}

fn default_max_poll_commands() -> usize {
    5
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_server_url() -> String {
    "http://127.0.0.1:8340".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_auth_max_attempts() -> u32 {
    5
}

fn default_auth_base_backoff_ms() -> u64 {
    500
}

fn default_reconnect_base_ms() -> u64 {
    5000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_reconnect_jitter() -> f64 {
    0.3
}

fn default_ping_interval_secs() -> u64 {
    20
}

fn default_pong_timeout_secs() -> u64 {
    5
}

fn default_outbound_queue_capacity() -> usize {
    128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = NetpulseConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8340);
        assert_eq!(config.queue.lease_secs, 60);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.session.heartbeat_interval_secs, 30);
        assert_eq!(config.agent.reconnect_base_ms, 5000);
        assert_eq!(config.agent.reconnect_max_attempts, 10);
    }

    #[test]
    fn toml_overrides_section_values() {
        let toml_str = r#"
[server]
port = 9000

[queue]
lease_secs = 120
"#;
        let config: NetpulseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.queue.lease_secs, 120);
        // Untouched sections keep defaults.
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml_str = r#"
[server]
prot = 9000
"#;
        assert!(toml::from_str::<NetpulseConfig>(toml_str).is_err());
    }

    #[test]
    fn agent_section_deserializes() {
        let toml_str = r#"
[agent]
server_url = "http://hub.internal:8340"
device_id = "pi-lab-03"
device_secret = "s3cret"
reconnect_max_attempts = 4
"#;
        let config: NetpulseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.device_id, "pi-lab-03");
        assert_eq!(config.agent.reconnect_max_attempts, 4);
        assert_eq!(config.agent.ping_interval_secs, 20);
    }
}
