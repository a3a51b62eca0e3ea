//! Ledger access - unspent outputs per country shard
//!
//! - `LedgerClient` is the seam between the scanner and the chain
//! - `rpc` implements it over Plasma JSON-RPC
//! - `scanner` fans out across shards with per-shard failure containment

pub mod rpc;
pub mod scanner;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use rpc::{RpcLedgerClient, RpcLedgerConfig};
pub use scanner::{scan_shards, ShardScan};

/// A transaction output as reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub address: String,
    pub color: u64,
    /// Hex encoded NST payload
    #[serde(default)]
    pub data: Option<String>,
}

/// An unspent output with its outpoint reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unspent {
    #[serde(default)]
    pub outpoint: Option<String>,
    pub output: Output,
}

/// Trait for fetching unspent outputs (allows mocking in tests)
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// All unspent outputs of one color
    async fn unspent(&self, color: u64) -> Result<Vec<Unspent>>;
}
