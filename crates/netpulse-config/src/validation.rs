// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects every failure instead of stopping at the first.

use crate::diagnostic::ConfigError;
use crate::model::NetpulseConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors (does not fail fast).
pub fn validate_config(config: &NetpulseConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("server.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.queue.lease_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.lease_secs must be at least 1".to_string(),
        });
    }

    if config.queue.max_attempts < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "queue.max_attempts must be at least 1, got {}",
                config.queue.max_attempts
            ),
        });
    }

    if config.queue.reclaim_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.reclaim_interval_secs must be at least 1".to_string(),
        });
    }

    if config.session.ttl_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "session.ttl_secs must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.agent.reconnect_jitter) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.reconnect_jitter must be within [0, 1], got {}",
                config.agent.reconnect_jitter
            ),
        });
    }

    if config.agent.reconnect_base_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "agent.reconnect_base_ms must be at least 1".to_string(),
        });
    }

    if config.agent.reconnect_max_ms < config.agent.reconnect_base_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.reconnect_max_ms ({}) must not be below agent.reconnect_base_ms ({})",
                config.agent.reconnect_max_ms, config.agent.reconnect_base_ms
            ),
        });
    }

    if config.agent.pong_timeout_secs >= config.agent.ping_interval_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.pong_timeout_secs ({}) must be shorter than agent.ping_interval_secs ({})",
                config.agent.pong_timeout_secs, config.agent.ping_interval_secs
            ),
        });
    }

    if config.agent.outbound_queue_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "agent.outbound_queue_capacity must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = NetpulseConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = NetpulseConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))
        ));
    }

    #[test]
    fn zero_lease_fails_validation() {
        let mut config = NetpulseConfig::default();
        config.queue.lease_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("lease_secs"))
        ));
    }

    #[test]
    fn jitter_out_of_range_fails_validation() {
        let mut config = NetpulseConfig::default();
        config.agent.reconnect_jitter = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("reconnect_jitter"))
        ));
    }

    #[test]
    fn pong_timeout_must_undercut_ping_interval() {
        let mut config = NetpulseConfig::default();
        config.agent.pong_timeout_secs = config.agent.ping_interval_secs;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("pong_timeout_secs"))
        ));
    }

    #[test]
    fn multiple_errors_are_collected() {
        let mut config = NetpulseConfig::default();
        config.queue.lease_secs = 0;
        config.queue.max_attempts = 0;
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
    }
}
