//! Leaderboard store - scored sets, hashes, series and strings
//!
//! The reconciler writes through `atomic_batch` only, so readers never see a
//! half-applied cycle. Readers use `read_batch` to get one consistent view.
//!
//! ## Backends
//!
//! - **MemoryStore**: in-process, for tests and single-node development
//! - **SqliteStore**: durable, one SQLite transaction per batch

pub mod keys;
pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{LeaderboardError, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A scored set member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: String,
    pub score: u64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: u64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Descending score, then ascending member
pub fn leaderboard_order(a: &ScoredMember, b: &ScoredMember) -> Ordering {
    b.score.cmp(&a.score).then_with(|| a.member.cmp(&b.member))
}

/// A time series point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: u64,
    pub value: i64,
}

/// A write staged for `atomic_batch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    UpsertScore { set: String, member: String, score: u64 },
    RemoveScore { set: String, member: String },
    SetHash { key: String, field: String, value: String },
    /// Remove a key of any type
    Delete { key: String },
    AppendSeries { key: String, point: SeriesPoint },
    SetString { key: String, value: String },
}

/// A read issued through `read_batch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOp {
    TopN { set: String, n: usize },
    Hash { key: String },
    /// Points with timestamp >= `from`, ascending
    Series { key: String, from: u64 },
    LastPoint { key: String },
    String { key: String },
}

/// Reply to one `ReadOp`, same position as the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadReply {
    Scores(Vec<ScoredMember>),
    Hash(BTreeMap<String, String>),
    Series(Vec<SeriesPoint>),
    Point(Option<SeriesPoint>),
    String(Option<String>),
}

impl ReadReply {
    pub fn into_scores(self) -> Result<Vec<ScoredMember>> {
        match self {
            ReadReply::Scores(scores) => Ok(scores),
            other => Err(mismatch("scores", &other)),
        }
    }

    pub fn into_hash(self) -> Result<BTreeMap<String, String>> {
        match self {
            ReadReply::Hash(hash) => Ok(hash),
            other => Err(mismatch("hash", &other)),
        }
    }

    pub fn into_series(self) -> Result<Vec<SeriesPoint>> {
        match self {
            ReadReply::Series(points) => Ok(points),
            other => Err(mismatch("series", &other)),
        }
    }

    pub fn into_point(self) -> Result<Option<SeriesPoint>> {
        match self {
            ReadReply::Point(point) => Ok(point),
            other => Err(mismatch("point", &other)),
        }
    }

    pub fn into_string(self) -> Result<Option<String>> {
        match self {
            ReadReply::String(value) => Ok(value),
            other => Err(mismatch("string", &other)),
        }
    }
}

fn mismatch(expected: &str, got: &ReadReply) -> LeaderboardError {
    LeaderboardError::Store(format!("expected {} reply, got {:?}", expected, got))
}

/// Trait for the shared leaderboard store (allows different backends)
#[async_trait::async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Run several reads against one consistent view
    async fn read_batch(&self, reads: Vec<ReadOp>) -> Result<Vec<ReadReply>>;

    /// Apply all ops or none
    async fn atomic_batch(&self, ops: Vec<StoreOp>) -> Result<()>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;

    async fn top_n(&self, set: &str, n: usize) -> Result<Vec<ScoredMember>> {
        self.read_one(ReadOp::TopN {
            set: set.to_string(),
            n,
        })
        .await?
        .into_scores()
    }

    async fn get_hash(&self, key: &str) -> Result<BTreeMap<String, String>> {
        self.read_one(ReadOp::Hash {
            key: key.to_string(),
        })
        .await?
        .into_hash()
    }

    async fn range_series(&self, key: &str, from: u64) -> Result<Vec<SeriesPoint>> {
        self.read_one(ReadOp::Series {
            key: key.to_string(),
            from,
        })
        .await?
        .into_series()
    }

    async fn last_point(&self, key: &str) -> Result<Option<SeriesPoint>> {
        self.read_one(ReadOp::LastPoint {
            key: key.to_string(),
        })
        .await?
        .into_point()
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.read_one(ReadOp::String {
            key: key.to_string(),
        })
        .await?
        .into_string()
    }

    async fn upsert_score(&self, set: &str, member: &str, score: u64) -> Result<()> {
        self.atomic_batch(vec![StoreOp::UpsertScore {
            set: set.to_string(),
            member: member.to_string(),
            score,
        }])
        .await
    }

    async fn set_hash(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.atomic_batch(vec![StoreOp::SetHash {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }])
        .await
    }

    async fn append_series(&self, key: &str, timestamp: u64, value: i64) -> Result<()> {
        self.atomic_batch(vec![StoreOp::AppendSeries {
            key: key.to_string(),
            point: SeriesPoint { timestamp, value },
        }])
        .await
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.atomic_batch(vec![StoreOp::SetString {
            key: key.to_string(),
            value: value.to_string(),
        }])
        .await
    }

    async fn read_one(&self, read: ReadOp) -> Result<ReadReply> {
        self.read_batch(vec![read])
            .await?
            .pop()
            .ok_or_else(|| LeaderboardError::Store("empty read reply".to_string()))
    }
}

pub type SharedStore = Arc<dyn LeaderboardStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaderboard_order_ties_by_member() {
        let mut members = vec![
            ScoredMember::new("a", 5),
            ScoredMember::new("c", 9),
            ScoredMember::new("b", 9),
            ScoredMember::new("d", 1),
        ];
        members.sort_by(leaderboard_order);
        let order: Vec<&str> = members.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_reply_mismatch_is_an_error() {
        let reply = ReadReply::String(None);
        assert!(matches!(reply.into_scores(), Err(LeaderboardError::Store(_))));
    }
}
