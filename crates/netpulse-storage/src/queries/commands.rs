// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command lifecycle queries: enqueue, claim, guarded resolution, lease
//! extension, and the visibility reclaim sweep.
//!
//! Every mutation that touches a lease runs inside a transaction on the
//! single writer connection, so concurrent claim/submit/extend calls for
//! the same command serialize at the store.

use rusqlite::params;

use netpulse_core::types::Command;
use netpulse_core::{CommandStatus, NetpulseError};

use crate::database::{map_tr_err, Database};

/// Result of a token-guarded mutation, resolved to typed errors by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedOutcome {
    /// The guard matched and the row was updated.
    Applied,
    /// The command exists but the token guard did not match (stale or
    /// already-resolved claim).
    Mismatch,
    /// No command with that id exists.
    Missing,
}

const COMMAND_COLUMNS: &str = "id, device_id, source, kind, payload, priority, status, \
     claim_token, visible_until, attempts, created_at";

fn map_command_row(row: &rusqlite::Row<'_>) -> Result<Command, rusqlite::Error> {
    let payload_text: String = row.get(4)?;
    let status_text: String = row.get(6)?;
    let status: CommandStatus = status_text.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Command {
        id: row.get(0)?,
        device_id: row.get(1)?,
        source: row.get(2)?,
        kind: row.get(3)?,
        payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
        priority: row.get(5)?,
        status,
        claim_token: row.get(7)?,
        visible_until: row.get(8)?,
        attempts: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Insert a freshly enqueued command row.
pub async fn insert_command(db: &Database, command: &Command) -> Result<(), NetpulseError> {
    let command = command.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO commands
                     (id, device_id, source, kind, payload, priority, status, attempts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    command.id,
                    command.device_id,
                    command.source,
                    command.kind,
                    command.payload.to_string(),
                    command.priority,
                    command.status.to_string(),
                    command.attempts,
                    command.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim up to `max_count` eligible commands for a device.
///
/// Eligible rows are queued commands plus claimed commands whose lease has
/// lapsed and whose attempt count leaves retries (an unexpired lease held
/// by another claimant is never returned). Highest priority first, FIFO by
/// insertion order within a priority. Each returned command is transitioned
/// to claimed with a fresh uuid claim token, `visible_until` set to the
/// caller-computed deadline, and attempts incremented.
pub async fn claim_commands(
    db: &Database,
    device_id: &str,
    max_count: usize,
    now: &str,
    visible_until: &str,
    max_attempts: i64,
) -> Result<Vec<Command>, NetpulseError> {
    let device_id = device_id.to_string();
    let now = now.to_string();
    let visible_until = visible_until.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Materialize the eligible rows before mutating them: updating
            // status mid-iteration would change the cursor's membership.
            let eligible: Vec<(i64, Command)> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT seq, {COMMAND_COLUMNS}
                     FROM commands
                     WHERE device_id = ?1
                       AND (status = 'queued'
                            OR (status = 'claimed'
                                AND visible_until <= ?2
                                AND attempts < ?3))
                     ORDER BY priority DESC, seq ASC
                     LIMIT ?4"
                ))?;
                let rows = stmt.query_map(
                    params![device_id, now, max_attempts, max_count as i64],
                    |row| {
                        let seq: i64 = row.get(0)?;
                        let payload_text: String = row.get(5)?;
                        let status_text: String = row.get(7)?;
                        let status: CommandStatus = status_text.parse().map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                7,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?;
                        let command = Command {
                            id: row.get(1)?,
                            device_id: row.get(2)?,
                            source: row.get(3)?,
                            kind: row.get(4)?,
                            payload: serde_json::from_str(&payload_text)
                                .unwrap_or(serde_json::Value::Null),
                            priority: row.get(6)?,
                            status,
                            claim_token: row.get(8)?,
                            visible_until: row.get(9)?,
                            attempts: row.get(10)?,
                            created_at: row.get(11)?,
                        };
                        Ok((seq, command))
                    },
                )?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut claimed = Vec::with_capacity(eligible.len());
            for (seq, mut command) in eligible {
                let token = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "UPDATE commands
                     SET status = 'claimed', claim_token = ?1, visible_until = ?2,
                         attempts = attempts + 1
                     WHERE seq = ?3",
                    params![token, visible_until, seq],
                )?;
                command.status = CommandStatus::Claimed;
                command.claim_token = Some(token);
                command.visible_until = Some(visible_until.clone());
                command.attempts += 1;
                claimed.push(command);
            }

            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve a claimed command to a terminal status iff the claim token
/// matches the current, unexpired lease. On mismatch nothing is mutated.
pub async fn submit_result(
    db: &Database,
    command_id: &str,
    claim_token: &str,
    new_status: CommandStatus,
    now: &str,
) -> Result<GuardedOutcome, NetpulseError> {
    let command_id = command_id.to_string();
    let claim_token = claim_token.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE commands
                 SET status = ?1, claim_token = NULL, visible_until = NULL
                 WHERE id = ?2 AND claim_token = ?3 AND status = 'claimed'
                   AND visible_until > ?4",
                params![new_status.to_string(), command_id, claim_token, now],
            )?;
            let outcome = if changed > 0 {
                GuardedOutcome::Applied
            } else {
                let exists: bool = tx
                    .query_row(
                        "SELECT 1 FROM commands WHERE id = ?1",
                        params![command_id],
                        |_| Ok(true),
                    )
                    .unwrap_or(false);
                if exists {
                    GuardedOutcome::Mismatch
                } else {
                    GuardedOutcome::Missing
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Push a live lease's `visible_until` forward under the same token guard.
pub async fn extend_visibility(
    db: &Database,
    command_id: &str,
    claim_token: &str,
    new_visible_until: &str,
    now: &str,
) -> Result<GuardedOutcome, NetpulseError> {
    let command_id = command_id.to_string();
    let claim_token = claim_token.to_string();
    let new_visible_until = new_visible_until.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE commands
                 SET visible_until = ?1
                 WHERE id = ?2 AND claim_token = ?3 AND status = 'claimed'
                   AND visible_until > ?4",
                params![new_visible_until, command_id, claim_token, now],
            )?;
            let outcome = if changed > 0 {
                GuardedOutcome::Applied
            } else {
                let exists: bool = tx
                    .query_row(
                        "SELECT 1 FROM commands WHERE id = ?1",
                        params![command_id],
                        |_| Ok(true),
                    )
                    .unwrap_or(false);
                if exists {
                    GuardedOutcome::Mismatch
                } else {
                    GuardedOutcome::Missing
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a command by id.
pub async fn get_command(db: &Database, id: &str) -> Result<Option<Command>, NetpulseError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], map_command_row);
            match result {
                Ok(command) => Ok(Some(command)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Sweep lapsed leases: revert retryable claims to queued, dead-letter the
/// rest. Returns the affected ids as `(requeued, expired)`.
pub async fn reclaim_expired(
    db: &Database,
    now: &str,
    max_attempts: i64,
) -> Result<(Vec<String>, Vec<String>), NetpulseError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let requeued = collect_ids(
                &tx,
                "SELECT id FROM commands
                 WHERE status = 'claimed' AND visible_until <= ?1 AND attempts < ?2",
                &now,
                max_attempts,
            )?;
            tx.execute(
                "UPDATE commands
                 SET status = 'queued', claim_token = NULL, visible_until = NULL
                 WHERE status = 'claimed' AND visible_until <= ?1 AND attempts < ?2",
                params![now, max_attempts],
            )?;

            let expired = collect_ids(
                &tx,
                "SELECT id FROM commands
                 WHERE status = 'claimed' AND visible_until <= ?1 AND attempts >= ?2",
                &now,
                max_attempts,
            )?;
            tx.execute(
                "UPDATE commands
                 SET status = 'expired', claim_token = NULL, visible_until = NULL
                 WHERE status = 'claimed' AND visible_until <= ?1 AND attempts >= ?2",
                params![now, max_attempts],
            )?;

            tx.commit()?;
            Ok((requeued, expired))
        })
        .await
        .map_err(map_tr_err)
}

fn collect_ids(
    tx: &rusqlite::Transaction<'_>,
    sql: &str,
    now: &str,
    max_attempts: i64,
) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt.query_map(params![now, max_attempts], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netpulse_core::types::{timestamp_after, timestamp_now};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_command(id: &str, device_id: &str, priority: i64) -> Command {
        Command {
            id: id.to_string(),
            device_id: device_id.to_string(),
            source: "api".to_string(),
            kind: "ping".to_string(),
            payload: serde_json::json!({"target": "8.8.8.8"}),
            priority,
            status: CommandStatus::Queued,
            claim_token: None,
            visible_until: None,
            attempts: 0,
            created_at: timestamp_now(),
        }
    }

    fn lease(secs: u64) -> String {
        timestamp_after(std::time::Duration::from_secs(secs))
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let (db, _dir) = setup_db().await;
        let cmd = make_command("c-1", "pi-01", 0);
        insert_command(&db, &cmd).await.unwrap();

        let fetched = get_command(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "c-1");
        assert_eq!(fetched.device_id, "pi-01");
        assert_eq!(fetched.status, CommandStatus::Queued);
        assert_eq!(fetched.payload["target"], "8.8.8.8");
        assert!(fetched.claim_token.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_command_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_command(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_orders_by_priority_then_fifo() {
        let (db, _dir) = setup_db().await;
        insert_command(&db, &make_command("low", "pi-01", 1)).await.unwrap();
        insert_command(&db, &make_command("high", "pi-01", 5)).await.unwrap();
        insert_command(&db, &make_command("low-2", "pi-01", 1)).await.unwrap();

        let claimed = claim_commands(&db, "pi-01", 10, &timestamp_now(), &lease(60), 3)
            .await
            .unwrap();
        let ids: Vec<&str> = claimed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "low-2"]);
        assert!(claimed.iter().all(|c| c.status == CommandStatus::Claimed));
        assert!(claimed.iter().all(|c| c.claim_token.is_some()));
        assert!(claimed.iter().all(|c| c.attempts == 1));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_is_scoped_to_device() {
        let (db, _dir) = setup_db().await;
        insert_command(&db, &make_command("mine", "pi-01", 0)).await.unwrap();
        insert_command(&db, &make_command("theirs", "pi-02", 0)).await.unwrap();

        let claimed = claim_commands(&db, "pi-01", 10, &timestamp_now(), &lease(60), 3)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, "mine");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unexpired_claim_is_not_reclaimable() {
        let (db, _dir) = setup_db().await;
        insert_command(&db, &make_command("c", "pi-01", 0)).await.unwrap();

        let first = claim_commands(&db, "pi-01", 1, &timestamp_now(), &lease(60), 3)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = claim_commands(&db, "pi-01", 1, &timestamp_now(), &lease(60), 3)
            .await
            .unwrap();
        assert!(second.is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn submit_result_requires_matching_token() {
        let (db, _dir) = setup_db().await;
        insert_command(&db, &make_command("c", "pi-01", 0)).await.unwrap();
        let claimed = claim_commands(&db, "pi-01", 1, &timestamp_now(), &lease(60), 3)
            .await
            .unwrap();
        let token = claimed[0].claim_token.clone().unwrap();

        let wrong = submit_result(&db, "c", "bogus-token", CommandStatus::Completed, &timestamp_now())
            .await
            .unwrap();
        assert_eq!(wrong, GuardedOutcome::Mismatch);

        let right = submit_result(&db, "c", &token, CommandStatus::Completed, &timestamp_now())
            .await
            .unwrap();
        assert_eq!(right, GuardedOutcome::Applied);

        let resolved = get_command(&db, "c").await.unwrap().unwrap();
        assert_eq!(resolved.status, CommandStatus::Completed);
        assert!(resolved.claim_token.is_none());
        assert!(resolved.visible_until.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn submit_result_on_unknown_command_is_missing() {
        let (db, _dir) = setup_db().await;
        let outcome = submit_result(&db, "ghost", "t", CommandStatus::Completed, &timestamp_now())
            .await
            .unwrap();
        assert_eq!(outcome, GuardedOutcome::Missing);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn extend_visibility_pushes_deadline() {
        let (db, _dir) = setup_db().await;
        insert_command(&db, &make_command("c", "pi-01", 0)).await.unwrap();
        let claimed = claim_commands(&db, "pi-01", 1, &timestamp_now(), &lease(60), 3)
            .await
            .unwrap();
        let token = claimed[0].claim_token.clone().unwrap();
        let old_deadline = claimed[0].visible_until.clone().unwrap();

        let new_deadline = lease(600);
        let outcome = extend_visibility(&db, "c", &token, &new_deadline, &timestamp_now())
            .await
            .unwrap();
        assert_eq!(outcome, GuardedOutcome::Applied);

        let fetched = get_command(&db, "c").await.unwrap().unwrap();
        let stored = fetched.visible_until.unwrap();
        assert!(stored > old_deadline);
        assert_eq!(stored, new_deadline);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_requeues_then_dead_letters() {
        let (db, _dir) = setup_db().await;
        insert_command(&db, &make_command("c", "pi-01", 0)).await.unwrap();

        // Claim with an already-lapsed lease so the sweep sees it at once.
        let lapsed = timestamp_after(std::time::Duration::ZERO);
        let max_attempts = 2;
        for round in 1..=max_attempts {
            let claimed =
                claim_commands(&db, "pi-01", 1, &timestamp_now(), &lapsed, max_attempts)
                    .await
                    .unwrap();
            assert_eq!(claimed.len(), 1, "round {round} should claim");
            assert_eq!(claimed[0].attempts, round);

            let (requeued, expired) = reclaim_expired(&db, &timestamp_now(), max_attempts)
                .await
                .unwrap();
            if round < max_attempts {
                assert_eq!(requeued, vec!["c".to_string()]);
                assert!(expired.is_empty());
            } else {
                assert!(requeued.is_empty());
                assert_eq!(expired, vec!["c".to_string()]);
            }
        }

        let fetched = get_command(&db, "c").await.unwrap().unwrap();
        assert_eq!(fetched.status, CommandStatus::Expired);
        assert!(fetched.claim_token.is_none());

        db.close().await.unwrap();
    }
}
