//! Fixed-interval reconciliation driver
//!
//! Each tick spawns a cycle. If the previous cycle is still running the tick
//! is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::{CycleSummary, Reconciler};
use crate::error::Result;

/// Spawn the reconciliation loop as a background task
pub fn spawn_reconcile_task(reconciler: Arc<Reconciler>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Reconciliation task started");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move {
                match reconciler.try_run_cycle().await {
                    Some(outcome) => log_outcome(outcome),
                    None => warn!("Previous reconciliation still running, skipping tick"),
                }
            });
        }
    })
}

fn log_outcome(outcome: Result<CycleSummary>) {
    match outcome {
        Ok(summary) if summary.updated => {
            info!(
                cursor = summary.timestamp.unwrap_or_default(),
                emitters = summary.emissions.len(),
                planters = summary.trees.len(),
                skipped_outputs = summary.skipped_outputs,
                "Cycle updated leaderboard"
            );
        }
        Ok(summary) => {
            if !summary.failed_shards.is_empty() {
                warn!(failed = ?summary.failed_shards, "Cycle ran with failed shards");
            }
        }
        // Nothing was applied; the next tick reads the ledger afresh
        Err(e) => error!(error = %e, "Reconciliation cycle failed"),
    }
}
