// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Netpulse workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a command. Exactly one holds at any time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Waiting for a claimant.
    Queued,
    /// Leased to exactly one holder; `visible_until` is set.
    Claimed,
    /// Resolved with a success outcome.
    Completed,
    /// Resolved with a failure outcome reported by the executing agent.
    Failed,
    /// Dead-lettered: the retry limit was exhausted without a result.
    Expired,
}

impl CommandStatus {
    /// True once the command can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Expired
        )
    }
}

/// Outcome declared by a submitted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    Completed,
    Failed,
}

impl CommandOutcome {
    /// The terminal [`CommandStatus`] this outcome resolves a command to.
    pub fn status(self) -> CommandStatus {
        match self {
            CommandOutcome::Completed => CommandStatus::Completed,
            CommandOutcome::Failed => CommandStatus::Failed,
        }
    }
}

/// A unit of work dispatched to a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Opaque unique identifier (uuid v4).
    pub id: String,
    /// Target device.
    pub device_id: String,
    /// Origin tag ("api", "scheduler", ...).
    pub source: String,
    /// Command type ("ping", "traceroute", "dns_lookup", ...). Execution
    /// is external; the queue only carries the declared type.
    pub kind: String,
    /// Opaque structured payload handed to the executor.
    pub payload: serde_json::Value,
    /// Higher runs first; ties break FIFO by creation order.
    pub priority: i64,
    pub status: CommandStatus,
    /// Set only while `status == Claimed`.
    pub claim_token: Option<String>,
    /// RFC 3339 UTC; set only while `status == Claimed`.
    pub visible_until: Option<String>,
    /// Count of claim cycles.
    pub attempts: i64,
    pub created_at: String,
}

/// A result submitted by a claimant, over the socket or the heartbeat body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResultReport {
    pub command_id: String,
    pub claim_token: String,
    pub status: CommandOutcome,
    /// Opaque executor output.
    pub output: serde_json::Value,
    pub executed_at: String,
    pub duration_ms: u64,
}

/// An authenticated device session resolved from a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub device_id: String,
    pub customer_id: String,
    pub issued_at: String,
    pub ttl_secs: u64,
}

/// A registered device as persisted in the directory.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: String,
    pub customer_id: String,
    /// SHA-256 hex of the device secret. The secret itself is never stored.
    pub secret_hash: String,
    pub created_at: String,
    pub last_seen_at: Option<String>,
}

/// Status and metrics a device reports on each heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    /// Free-form status string ("ok", "degraded", ...).
    pub status: String,
    /// Opaque device metrics (load, uptime, link quality, ...).
    #[serde(default)]
    pub metrics: serde_json::Value,
}

/// Current UTC time as RFC 3339 with millisecond precision.
///
/// The fixed-width format ("2026-01-01T00:00:00.000Z") makes timestamps
/// lexicographically ordered, which the storage layer relies on for
/// visibility comparisons in SQL.
pub fn timestamp_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// UTC time `duration` from now, same format as [`timestamp_now`].
pub fn timestamp_after(duration: std::time::Duration) -> String {
    let at = chrono::Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default();
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn command_status_round_trips_through_strings() {
        for status in [
            CommandStatus::Queued,
            CommandStatus::Claimed,
            CommandStatus::Completed,
            CommandStatus::Failed,
            CommandStatus::Expired,
        ] {
            let s = status.to_string();
            assert_eq!(CommandStatus::from_str(&s).unwrap(), status);
        }
        assert_eq!(CommandStatus::Queued.to_string(), "queued");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CommandStatus::Queued.is_terminal());
        assert!(!CommandStatus::Claimed.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::Expired.is_terminal());
    }

    #[test]
    fn outcome_maps_to_status() {
        assert_eq!(CommandOutcome::Completed.status(), CommandStatus::Completed);
        assert_eq!(CommandOutcome::Failed.status(), CommandStatus::Failed);
    }

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = timestamp_now();
        let b = timestamp_after(std::time::Duration::from_secs(30));
        assert_eq!(a.len(), b.len());
        assert!(a < b, "later timestamp must sort after earlier: {a} vs {b}");
    }

    #[test]
    fn command_serializes_with_lowercase_status() {
        let cmd = Command {
            id: "c-1".into(),
            device_id: "dev-1".into(),
            source: "api".into(),
            kind: "ping".into(),
            payload: serde_json::json!({"target": "1.1.1.1"}),
            priority: 5,
            status: CommandStatus::Queued,
            claim_token: None,
            visible_until: None,
            attempts: 0,
            created_at: timestamp_now(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"status\":\"queued\""));
    }

    #[test]
    fn heartbeat_report_metrics_default_to_null() {
        let report: HeartbeatReport = serde_json::from_str(r#"{"status": "ok"}"#).unwrap();
        assert_eq!(report.status, "ok");
        assert!(report.metrics.is_null());
    }
}
