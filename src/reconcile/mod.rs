//! Reconciliation engine
//!
//! One cycle:
//!
//! ```text
//! read snapshot + cursor + last history points   (one read batch)
//!        │
//! scan shards concurrently ──► decode passports ──► country totals
//!        │
//! diff against snapshot ──► nothing changed? stop, zero writes
//!        │
//! history points for moved balances
//!        │
//! atomic batch: scores, players, aggregates, history, snapshot, cursor
//! ```
//!
//! The cycle stamp is `max(now, cursor + 1)`, so the cursor strictly
//! increases across changing cycles and history timestamps never repeat.

pub mod plan;
pub mod scheduler;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LeaderboardError, Result};
use crate::ledger::{scan_shards, LedgerClient};
use crate::reference::SharedReference;
use crate::store::{keys, ReadOp, ScoredMember, SeriesPoint, SharedStore, StoreOp};

pub use plan::{CountryTotals, PassportMap};
pub use scheduler::spawn_reconcile_task;

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub updated: bool,
    /// Cycle stamp written as the new cursor, when updated
    pub timestamp: Option<u64>,
    /// Addresses with co2 > 0, highest first
    pub emissions: Vec<ScoredMember>,
    /// Addresses with trees > 0, highest first
    pub trees: Vec<ScoredMember>,
    pub co2_by_country: BTreeMap<String, u64>,
    pub trees_by_country: BTreeMap<String, u64>,
    pub failed_shards: Vec<String>,
    pub skipped_outputs: usize,
    /// Number of store ops in the applied batch
    pub ops_applied: usize,
}

/// State read before a cycle mutates anything
struct PriorState {
    snapshot: PassportMap,
    cursor: u64,
    last_points: BTreeMap<String, Option<SeriesPoint>>,
}

pub struct Reconciler {
    ledger: Arc<dyn LedgerClient>,
    store: SharedStore,
    reference: SharedReference,
    /// Held for the duration of a cycle
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: SharedStore,
        reference: SharedReference,
    ) -> Self {
        Self {
            ledger,
            store,
            reference,
            running: Mutex::new(()),
        }
    }

    /// Run a cycle stamped with the current time, waiting for any running one
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        self.run_cycle_at(unix_now()).await
    }

    /// Run a cycle stamped with `now`, waiting for any running one
    pub async fn run_cycle_at(&self, now: u64) -> Result<CycleSummary> {
        let _running = self.running.lock().await;
        self.cycle(now).await
    }

    /// Run a cycle unless one is already in flight.
    ///
    /// Returns `None` when skipped.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleSummary>> {
        let _running = self.running.try_lock().ok()?;
        Some(self.cycle(unix_now()).await)
    }

    async fn cycle(&self, now: u64) -> Result<CycleSummary> {
        let countries: Vec<String> = self.reference.country_ids().map(str::to_string).collect();

        let prior = self.load_prior(&countries).await?;

        let scans = scan_shards(self.ledger.as_ref(), &countries).await;
        let failed_shards: Vec<String> = scans
            .iter()
            .filter(|s| s.is_failed())
            .map(|s| s.country.clone())
            .collect();

        let (current, skipped_outputs) = plan::collect_passports(&scans, &self.reference);
        let totals = CountryTotals::from_passports(&current);

        let mut ops = plan::diff_passports(&prior.snapshot, &current, &self.reference);
        let updated = !ops.is_empty();

        let mut summary = CycleSummary {
            updated,
            timestamp: None,
            emissions: plan::ranking(&current, |p| p.co2),
            trees: plan::ranking(&current, |p| p.trees),
            co2_by_country: totals.co2.clone(),
            trees_by_country: totals.trees.clone(),
            failed_shards,
            skipped_outputs,
            ops_applied: 0,
        };

        if !updated {
            debug!(passports = current.len(), "Ledger unchanged, no writes");
            return Ok(summary);
        }

        let timestamp = now.max(prior.cursor.saturating_add(1));

        ops.extend(plan::aggregate_ops(&totals));
        ops.extend(plan::history_ops(
            countries.iter().map(String::as_str),
            &totals,
            &prior.last_points,
            &summary.failed_shards,
            timestamp,
        ));
        ops.push(StoreOp::SetString {
            key: keys::SNAPSHOT.to_string(),
            value: serde_json::to_string(&current)?,
        });
        ops.push(StoreOp::SetString {
            key: keys::CURSOR.to_string(),
            value: timestamp.to_string(),
        });

        let ops_applied = ops.len();
        self.store.atomic_batch(ops).await?;

        info!(
            timestamp,
            passports = current.len(),
            ops = ops_applied,
            failed_shards = summary.failed_shards.len(),
            "Reconciliation applied"
        );

        summary.timestamp = Some(timestamp);
        summary.ops_applied = ops_applied;
        Ok(summary)
    }

    async fn load_prior(&self, countries: &[String]) -> Result<PriorState> {
        let mut reads = vec![
            ReadOp::String {
                key: keys::SNAPSHOT.to_string(),
            },
            ReadOp::String {
                key: keys::CURSOR.to_string(),
            },
        ];
        reads.extend(countries.iter().map(|country| ReadOp::LastPoint {
            key: keys::history(country),
        }));

        let mut replies = self.store.read_batch(reads).await?.into_iter();
        let mut next = || {
            replies
                .next()
                .ok_or_else(|| LeaderboardError::Store("short read batch".to_string()))
        };

        let snapshot = parse_snapshot(next()?.into_string()?);
        let cursor = parse_cursor(next()?.into_string()?);

        let mut last_points = BTreeMap::new();
        for country in countries {
            last_points.insert(country.clone(), next()?.into_point()?);
        }

        Ok(PriorState {
            snapshot,
            cursor,
            last_points,
        })
    }
}

fn parse_snapshot(raw: Option<String>) -> PassportMap {
    match raw {
        None => PassportMap::new(),
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Stored snapshot unreadable, rebuilding from ledger");
            PassportMap::new()
        }),
    }
}

/// Stored cursor value, 0 when absent or unreadable
pub fn parse_cursor(raw: Option<String>) -> u64 {
    match raw {
        None => 0,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(raw = %raw, "Stored cursor unreadable, treating as 0");
            0
        }),
    }
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor(None), 0);
        assert_eq!(parse_cursor(Some("1700000000".to_string())), 1_700_000_000);
        assert_eq!(parse_cursor(Some("garbage".to_string())), 0);
    }

    #[test]
    fn test_parse_snapshot_tolerates_garbage() {
        assert!(parse_snapshot(Some("not json".to_string())).is_empty());
        let raw = r#"{"0xaa": {"address": "0xaa", "country": "1", "co2": 4, "trees": 2}}"#;
        let snapshot = parse_snapshot(Some(raw.to_string()));
        assert_eq!(snapshot["0xaa"].co2, 4);
    }
}
