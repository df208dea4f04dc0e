// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Visibility reclaimer background task.
//!
//! Runs a sweep on a fixed interval, independent of any single request:
//! claimed commands whose lease lapsed without a result become visible to
//! other claimants again (or dead-letter once their attempts are spent).
//! This is the mechanism that gives at-least-once delivery under agent
//! crash or network partition.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command_queue::CommandQueue;

/// Spawn the reclaim loop. The returned handle completes after `cancel`
/// fires and the in-flight sweep (if any) finishes.
pub fn spawn_reclaimer(
    queue: Arc<CommandQueue>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick; the queue was just opened.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "visibility reclaimer started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match queue.reclaim_once().await {
                        Ok((requeued, expired)) => {
                            if !requeued.is_empty() || !expired.is_empty() {
                                info!(
                                    requeued = requeued.len(),
                                    dead_lettered = expired.len(),
                                    "reclaim sweep recovered lapsed leases"
                                );
                            } else {
                                debug!("reclaim sweep found nothing lapsed");
                            }
                        }
                        Err(e) => {
                            // A failed sweep retries on the next tick.
                            warn!(error = %e, "reclaim sweep failed");
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("visibility reclaimer shutting down");
                    break;
                }
            }
        }
    })
}
