// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease-based command queue.
//!
//! Owns the command lifecycle: enqueue, claim (lease grant), result
//! submission (lease release), and visibility extension. The lease pattern
//! decouples "who currently owns this work" from "is this work done": a
//! crashed or disconnected agent cannot permanently strand a command, and
//! concurrent claim attempts never double-assign live work. Delivery is
//! at-least-once; consumers are expected to be idempotent.

use std::time::Duration;

use netpulse_config::model::QueueConfig;
use netpulse_core::types::{timestamp_after, timestamp_now};
use netpulse_core::{Command, CommandOutcome, CommandStatus, NetpulseError};
use netpulse_storage::queries::commands;
use netpulse_storage::{Database, GuardedOutcome};

/// Public operations over the persisted command queue.
#[derive(Clone)]
pub struct CommandQueue {
    db: Database,
    config: QueueConfig,
}

impl CommandQueue {
    pub fn new(db: Database, config: QueueConfig) -> Self {
        Self { db, config }
    }

    /// The lease duration granted when callers do not pick their own.
    pub fn default_lease(&self) -> Duration {
        Duration::from_secs(self.config.lease_secs)
    }

    /// Maximum commands handed out per heartbeat poll.
    pub fn max_poll_commands(&self) -> usize {
        self.config.max_poll_commands
    }

    /// Enqueue a command for a device. Always succeeds; the command starts
    /// queued with a fresh id.
    pub async fn enqueue(
        &self,
        device_id: &str,
        source: &str,
        kind: &str,
        payload: serde_json::Value,
        priority: i64,
    ) -> Result<Command, NetpulseError> {
        let command = Command {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            source: source.to_string(),
            kind: kind.to_string(),
            payload,
            priority,
            status: CommandStatus::Queued,
            claim_token: None,
            visible_until: None,
            attempts: 0,
            created_at: timestamp_now(),
        };
        commands::insert_command(&self.db, &command).await?;
        metrics::counter!("netpulse_commands_enqueued_total").increment(1);
        tracing::debug!(
            command_id = command.id.as_str(),
            device_id,
            kind,
            priority,
            "command enqueued"
        );
        Ok(command)
    }

    /// Claim up to `max_count` commands for `device_id` under a lease of
    /// `lease` duration. Returns an empty vec (not an error) when nothing
    /// is eligible.
    pub async fn claim(
        &self,
        device_id: &str,
        max_count: usize,
        lease: Duration,
    ) -> Result<Vec<Command>, NetpulseError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let claimed = commands::claim_commands(
            &self.db,
            device_id,
            max_count,
            &timestamp_now(),
            &timestamp_after(lease),
            self.config.max_attempts,
        )
        .await?;
        if !claimed.is_empty() {
            metrics::counter!("netpulse_commands_claimed_total").increment(claimed.len() as u64);
            tracing::debug!(device_id, count = claimed.len(), "commands claimed");
        }
        Ok(claimed)
    }

    /// Resolve a claimed command with the declared outcome.
    ///
    /// The supplied claim token must match the command's current, unexpired
    /// lease; otherwise [`NetpulseError::LeaseMismatch`] is returned and
    /// nothing is mutated — callers treat that as non-fatal (the work was
    /// already reclaimed or resolved through another path).
    pub async fn submit_result(
        &self,
        command_id: &str,
        claim_token: &str,
        outcome: CommandOutcome,
    ) -> Result<Command, NetpulseError> {
        let result = commands::submit_result(
            &self.db,
            command_id,
            claim_token,
            outcome.status(),
            &timestamp_now(),
        )
        .await?;
        match result {
            GuardedOutcome::Applied => {
                metrics::counter!("netpulse_commands_resolved_total").increment(1);
                commands::get_command(&self.db, command_id)
                    .await?
                    .ok_or_else(|| NetpulseError::NotFound(command_id.to_string()))
            }
            GuardedOutcome::Mismatch => Err(NetpulseError::LeaseMismatch {
                command_id: command_id.to_string(),
            }),
            GuardedOutcome::Missing => Err(NetpulseError::NotFound(command_id.to_string())),
        }
    }

    /// Push the lease deadline forward by `extension` from now. Same token
    /// matching rule as [`submit_result`](Self::submit_result); used by a
    /// holder doing long-running work to avoid premature reclaim.
    pub async fn extend_visibility(
        &self,
        command_id: &str,
        claim_token: &str,
        extension: Duration,
    ) -> Result<(), NetpulseError> {
        let result = commands::extend_visibility(
            &self.db,
            command_id,
            claim_token,
            &timestamp_after(extension),
            &timestamp_now(),
        )
        .await?;
        match result {
            GuardedOutcome::Applied => Ok(()),
            GuardedOutcome::Mismatch => Err(NetpulseError::LeaseMismatch {
                command_id: command_id.to_string(),
            }),
            GuardedOutcome::Missing => Err(NetpulseError::NotFound(command_id.to_string())),
        }
    }

    /// Fetch a command by id.
    pub async fn get(&self, command_id: &str) -> Result<Option<Command>, NetpulseError> {
        commands::get_command(&self.db, command_id).await
    }

    /// One reclaim sweep: lapsed leases with remaining attempts revert to
    /// queued; the rest are dead-lettered. Returns `(requeued, expired)` ids.
    pub async fn reclaim_once(&self) -> Result<(Vec<String>, Vec<String>), NetpulseError> {
        let (requeued, expired) =
            commands::reclaim_expired(&self.db, &timestamp_now(), self.config.max_attempts)
                .await?;
        if !requeued.is_empty() {
            metrics::counter!("netpulse_commands_requeued_total")
                .increment(requeued.len() as u64);
        }
        if !expired.is_empty() {
            metrics::counter!("netpulse_commands_dead_lettered_total")
                .increment(expired.len() as u64);
        }
        Ok((requeued, expired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_queue(lease_secs: u64, max_attempts: i64) -> (CommandQueue, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let config = QueueConfig {
            lease_secs,
            max_attempts,
            ..QueueConfig::default()
        };
        (CommandQueue::new(db, config), dir)
    }

    #[tokio::test]
    async fn queue_survives_absence_of_live_channel() {
        // Commands enqueued for a device that never connects are still
        // returned by that device's eventual claim.
        let (queue, _dir) = setup_queue(60, 3).await;
        queue
            .enqueue("pi-offline", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();
        queue
            .enqueue("pi-offline", "api", "traceroute", serde_json::json!({}), 0)
            .await
            .unwrap();

        let claimed = queue
            .claim("pi-offline", 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_claims_never_double_assign() {
        let (queue, _dir) = setup_queue(60, 3).await;
        queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();

        // Two claimants race; the store serializes them.
        let (a, b) = tokio::join!(
            queue.claim("pi-01", 1, Duration::from_secs(60)),
            queue.claim("pi-01", 1, Duration::from_secs(60)),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(
            a.len() + b.len(),
            1,
            "exactly one claimant may hold the lease"
        );
    }

    #[tokio::test]
    async fn expired_lease_redelivers_with_fresh_token() {
        let (queue, _dir) = setup_queue(60, 3).await;
        queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();

        // First claim with an immediately-lapsing lease.
        let first = queue.claim("pi-01", 1, Duration::ZERO).await.unwrap();
        let old_token = first[0].claim_token.clone().unwrap();

        let (requeued, expired) = queue.reclaim_once().await.unwrap();
        assert_eq!(requeued.len(), 1);
        assert!(expired.is_empty());

        let second = queue
            .claim("pi-01", 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        let new_token = second[0].claim_token.clone().unwrap();
        assert_ne!(old_token, new_token);
        assert_eq!(second[0].attempts, 2);

        // The superseded token must be rejected.
        let err = queue
            .submit_result(&second[0].id, &old_token, CommandOutcome::Completed)
            .await
            .unwrap_err();
        assert!(err.is_lease_mismatch());
    }

    #[tokio::test]
    async fn double_submit_fails_second_time() {
        let (queue, _dir) = setup_queue(60, 3).await;
        let cmd = queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();
        let claimed = queue
            .claim("pi-01", 1, Duration::from_secs(60))
            .await
            .unwrap();
        let token = claimed[0].claim_token.clone().unwrap();

        queue
            .submit_result(&cmd.id, &token, CommandOutcome::Completed)
            .await
            .unwrap();
        let err = queue
            .submit_result(&cmd.id, &token, CommandOutcome::Completed)
            .await
            .unwrap_err();
        assert!(err.is_lease_mismatch(), "no double completion");
    }

    #[tokio::test]
    async fn claim_returns_highest_priority_first() {
        let (queue, _dir) = setup_queue(60, 3).await;
        let c2 = queue
            .enqueue("pi-01", "api", "dns_lookup", serde_json::json!({}), 1)
            .await
            .unwrap();
        let c1 = queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 5)
            .await
            .unwrap();

        let claimed = queue
            .claim("pi-01", 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, c1.id);
        assert_eq!(claimed[1].id, c2.id);
    }

    #[tokio::test]
    async fn round_trip_reflects_completed_status() {
        let (queue, _dir) = setup_queue(60, 3).await;
        let cmd = queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({"target": "1.1.1.1"}), 0)
            .await
            .unwrap();

        let claimed = queue
            .claim("pi-01", 1, Duration::from_secs(60))
            .await
            .unwrap();
        let token = claimed[0].claim_token.clone().unwrap();

        let resolved = queue
            .submit_result(&cmd.id, &token, CommandOutcome::Completed)
            .await
            .unwrap();
        assert_eq!(resolved.status, CommandStatus::Completed);

        let fetched = queue.get(&cmd.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CommandStatus::Completed);
        assert!(fetched.claim_token.is_none());
        assert!(fetched.visible_until.is_none());
    }

    #[tokio::test]
    async fn failed_outcome_is_recorded() {
        let (queue, _dir) = setup_queue(60, 3).await;
        let cmd = queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();
        let claimed = queue
            .claim("pi-01", 1, Duration::from_secs(60))
            .await
            .unwrap();
        let token = claimed[0].claim_token.clone().unwrap();

        let resolved = queue
            .submit_result(&cmd.id, &token, CommandOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(resolved.status, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn extend_visibility_keeps_lease_alive_past_reclaim() {
        let (queue, _dir) = setup_queue(60, 3).await;
        let cmd = queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();
        let claimed = queue
            .claim("pi-01", 1, Duration::from_secs(60))
            .await
            .unwrap();
        let token = claimed[0].claim_token.clone().unwrap();

        queue
            .extend_visibility(&cmd.id, &token, Duration::from_secs(600))
            .await
            .unwrap();

        let (requeued, expired) = queue.reclaim_once().await.unwrap();
        assert!(requeued.is_empty());
        assert!(expired.is_empty());

        // The original token still resolves the command.
        queue
            .submit_result(&cmd.id, &token, CommandOutcome::Completed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retry_limit_dead_letters_instead_of_requeueing() {
        let (queue, _dir) = setup_queue(60, 2).await;
        let cmd = queue
            .enqueue("pi-01", "api", "ping", serde_json::json!({}), 0)
            .await
            .unwrap();

        for _ in 0..2 {
            let claimed = queue.claim("pi-01", 1, Duration::ZERO).await.unwrap();
            assert_eq!(claimed.len(), 1);
            queue.reclaim_once().await.unwrap();
        }

        let fetched = queue.get(&cmd.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CommandStatus::Expired);

        // Dead-lettered commands are no longer claimable.
        let claimed = queue
            .claim("pi-01", 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn submit_for_unknown_command_is_not_found() {
        let (queue, _dir) = setup_queue(60, 3).await;
        let err = queue
            .submit_result("ghost", "token", CommandOutcome::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, NetpulseError::NotFound(_)));
    }
}
