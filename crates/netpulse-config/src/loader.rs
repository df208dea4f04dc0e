// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! XDG hierarchy: `./netpulse.toml` > `~/.config/netpulse/netpulse.toml` >
//! `/etc/netpulse/netpulse.toml`, with environment variable overrides via
//! the `NETPULSE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::NetpulseConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/netpulse/netpulse.toml` (system-wide)
/// 3. `~/.config/netpulse/netpulse.toml` (user XDG config)
/// 4. `./netpulse.toml` (local directory)
/// 5. `NETPULSE_*` environment variables
pub fn load_config() -> Result<NetpulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NetpulseConfig::default()))
        .merge(Toml::file("/etc/netpulse/netpulse.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("netpulse/netpulse.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("netpulse.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<NetpulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NetpulseConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<NetpulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NetpulseConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `NETPULSE_SERVER_BEARER_TOKEN` must map
/// to `server.bearer_token`, not `server.bearer.token`.
fn env_provider() -> Env {
    Env::prefixed("NETPULSE_").map(|key| {
        // `key` is the lowercased env var name with the prefix stripped.
        // Example: NETPULSE_QUEUE_LEASE_SECS -> "queue_lease_secs"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("session_", "session.", 1)
            .replacen("agent_", "agent.", 1);
        mapped.into()
    })
}
