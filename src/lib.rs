//! passport-leaderboard - CO2 leaderboards reconciled from a Plasma ledger
//!
//! Country passports live on chain as colored outputs carrying emissions and
//! offsets counters. A periodic reconciler scans the ledger per country,
//! diffs it against the last snapshot and atomically updates a leaderboard
//! store; a small HTTP API serves the result behind a cursor cache gate.
//!
//! ## Modules
//!
//! - **reference**: static country and player directories
//! - **ledger**: JSON-RPC client and concurrent shard scanner
//! - **passport**: payload decoding
//! - **reconcile**: diff, aggregate, history and the interval driver
//! - **store**: store trait with memory and SQLite backends
//! - **api**: axum router with the `/stats` cache gate

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod passport;
pub mod reconcile;
pub mod reference;
pub mod store;

pub use config::Config;
pub use error::{LeaderboardError, Result};
pub use reconcile::{CycleSummary, Reconciler};
