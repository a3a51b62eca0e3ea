//! Service configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file or
//! a partial one still yields a runnable config. CLI flags and environment
//! variables override the file (see `main.rs`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LeaderboardError, Result};
use crate::ledger::RpcLedgerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Plasma node JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl LedgerConfig {
    pub fn rpc_config(&self) -> RpcLedgerConfig {
        RpcLedgerConfig {
            rpc_url: self.rpc_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Whether this instance runs the reconciliation writer
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval(),
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Whether to serve the read API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_countries_path")]
    pub countries_path: PathBuf,

    /// Optional; a missing file means no known players
    #[serde(default = "default_players_path")]
    pub players_path: PathBuf,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            countries_path: default_countries_path(),
            players_path: default_players_path(),
        }
    }
}

// Defaults
fn default_rpc_url() -> String { "https://testnet-node.leapdao.org".to_string() }
fn default_request_timeout() -> u64 { 10_000 }
fn default_true() -> bool { true }
fn default_interval() -> u64 { 10 }
fn default_backend() -> StoreBackend { StoreBackend::Sqlite }
fn default_store_path() -> PathBuf { PathBuf::from("data/leaderboard.db") }
fn default_listen() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 8080)) }
fn default_countries_path() -> PathBuf { PathBuf::from("data/countries.json") }
fn default_players_path() -> PathBuf { PathBuf::from("data/players.json") }

impl Config {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LeaderboardError::Config(e.to_string()))
    }

    /// Load from `path`, or defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.enabled && self.reconcile.interval_secs == 0 {
            return Err(LeaderboardError::Config(
                "reconcile.interval_secs must be greater than 0".to_string(),
            ));
        }
        if !self.reconcile.enabled && !self.api.enabled {
            return Err(LeaderboardError::Config(
                "both reconcile and api are disabled, nothing to run".to_string(),
            ));
        }
        if self.reconcile.enabled && !self.api.enabled && self.store.backend == StoreBackend::Memory {
            return Err(LeaderboardError::Config(
                "memory store without the api discards every cycle".to_string(),
            ));
        }
        Ok(())
    }
}
