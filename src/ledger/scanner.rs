//! Concurrent shard scanning
//!
//! Every country is its own ledger shard. Shards are fetched concurrently and
//! joined; a failing shard contributes no outputs and never aborts the scan.

use futures::future::join_all;
use tracing::{debug, warn};

use super::{LedgerClient, Output};
use crate::error::LeaderboardError;

/// Result of scanning one shard
#[derive(Debug, Clone)]
pub struct ShardScan {
    pub country: String,
    pub outputs: Vec<Output>,
    /// Set when the fetch failed; `outputs` is then empty
    pub error: Option<String>,
}

impl ShardScan {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Fetch all shards concurrently, returning results in `countries` order.
pub async fn scan_shards<L>(ledger: &L, countries: &[String]) -> Vec<ShardScan>
where
    L: LedgerClient + ?Sized,
{
    let fetches = countries.iter().map(|country| scan_shard(ledger, country));
    join_all(fetches).await
}

async fn scan_shard<L>(ledger: &L, country: &str) -> ShardScan
where
    L: LedgerClient + ?Sized,
{
    let result = match country.parse::<u64>() {
        Ok(color) => ledger.unspent(color).await,
        Err(_) => Err(LeaderboardError::Ledger(format!(
            "country id {:?} is not a ledger color",
            country
        ))),
    };

    match result {
        Ok(unspent) => {
            debug!(country, outputs = unspent.len(), "Shard scanned");
            ShardScan {
                country: country.to_string(),
                outputs: unspent.into_iter().map(|u| u.output).collect(),
                error: None,
            }
        }
        Err(e) => {
            warn!(country, error = %e, "Shard fetch failed, treating as empty");
            ShardScan {
                country: country.to_string(),
                outputs: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::ledger::Unspent;

    struct FlakyLedger;

    #[async_trait::async_trait]
    impl LedgerClient for FlakyLedger {
        async fn unspent(&self, color: u64) -> Result<Vec<Unspent>> {
            if color == 2 {
                return Err(LeaderboardError::Ledger("timeout".to_string()));
            }
            Ok(vec![Unspent {
                outpoint: None,
                output: Output {
                    address: format!("0x{color}"),
                    color,
                    data: None,
                },
            }])
        }
    }

    #[tokio::test]
    async fn test_failed_shard_is_contained() {
        let countries = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let scans = scan_shards(&FlakyLedger, &countries).await;

        assert_eq!(scans.len(), 3);
        assert_eq!(scans[0].outputs.len(), 1);
        assert!(scans[1].is_failed());
        assert!(scans[1].outputs.is_empty());
        assert_eq!(scans[2].outputs[0].address, "0x3");
    }

    #[tokio::test]
    async fn test_non_numeric_country_fails_only_that_shard() {
        let countries = vec!["brazil".to_string(), "1".to_string()];
        let scans = scan_shards(&FlakyLedger, &countries).await;

        assert!(scans[0].is_failed());
        assert!(!scans[1].is_failed());
    }
}
