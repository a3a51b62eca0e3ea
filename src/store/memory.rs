//! In-memory leaderboard store (for testing/local development)
//!
//! All state sits behind one `RwLock`: a batch holds the write lock for its
//! whole application, a read batch holds the read lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{
    leaderboard_order, LeaderboardStore, ReadOp, ReadReply, ScoredMember, SeriesPoint, StoreOp,
};
use crate::error::{LeaderboardError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    sets: HashMap<String, BTreeMap<String, u64>>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    series: HashMap<String, BTreeMap<u64, i64>>,
    strings: HashMap<String, String>,
}

impl MemoryState {
    fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::UpsertScore { set, member, score } => {
                self.sets.entry(set).or_default().insert(member, score);
            }
            StoreOp::RemoveScore { set, member } => {
                if let Some(members) = self.sets.get_mut(&set) {
                    members.remove(&member);
                    if members.is_empty() {
                        self.sets.remove(&set);
                    }
                }
            }
            StoreOp::SetHash { key, field, value } => {
                self.hashes.entry(key).or_default().insert(field, value);
            }
            StoreOp::Delete { key } => {
                self.sets.remove(&key);
                self.hashes.remove(&key);
                self.series.remove(&key);
                self.strings.remove(&key);
            }
            StoreOp::AppendSeries { key, point } => {
                self.series
                    .entry(key)
                    .or_default()
                    .insert(point.timestamp, point.value);
            }
            StoreOp::SetString { key, value } => {
                self.strings.insert(key, value);
            }
        }
    }

    fn read(&self, read: ReadOp) -> ReadReply {
        match read {
            ReadOp::TopN { set, n } => {
                let mut members: Vec<ScoredMember> = self
                    .sets
                    .get(&set)
                    .map(|m| {
                        m.iter()
                            .map(|(member, score)| ScoredMember::new(member.clone(), *score))
                            .collect()
                    })
                    .unwrap_or_default();
                members.sort_by(leaderboard_order);
                members.truncate(n);
                ReadReply::Scores(members)
            }
            ReadOp::Hash { key } => {
                ReadReply::Hash(self.hashes.get(&key).cloned().unwrap_or_default())
            }
            ReadOp::Series { key, from } => ReadReply::Series(
                self.series
                    .get(&key)
                    .map(|points| {
                        points
                            .range(from..)
                            .map(|(timestamp, value)| SeriesPoint {
                                timestamp: *timestamp,
                                value: *value,
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            ReadOp::LastPoint { key } => ReadReply::Point(
                self.series
                    .get(&key)
                    .and_then(|points| points.iter().next_back())
                    .map(|(timestamp, value)| SeriesPoint {
                        timestamp: *timestamp,
                        value: *value,
                    }),
            ),
            ReadOp::String { key } => ReadReply::String(self.strings.get(&key).cloned()),
        }
    }
}

/// Simple in-memory store with fault injection for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
    batches_applied: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of non-empty batches applied so far
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LeaderboardError::Store("memory store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LeaderboardStore for MemoryStore {
    async fn read_batch(&self, reads: Vec<ReadOp>) -> Result<Vec<ReadReply>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(reads.into_iter().map(|read| state.read(read)).collect())
    }

    async fn atomic_batch(&self, ops: Vec<StoreOp>) -> Result<()> {
        self.check_available()?;
        if ops.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        for op in ops {
            state.apply(op);
        }
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_top_n_ordering_and_tie_break() {
        let store = MemoryStore::new();
        for (member, score) in [("a", 5), ("b", 9), ("c", 9), ("d", 1)] {
            store.upsert_score("set", member, score).await.unwrap();
        }

        let top = store.top_n("set", 3).await.unwrap();
        assert_eq!(
            top,
            vec![
                ScoredMember::new("b", 9),
                ScoredMember::new("c", 9),
                ScoredMember::new("a", 5),
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert_score("set", "a", 3).await.unwrap();
        store.upsert_score("set", "a", 3).await.unwrap();
        assert_eq!(store.top_n("set", 10).await.unwrap(), vec![ScoredMember::new("a", 3)]);
    }

    #[tokio::test]
    async fn test_range_series_from_timestamp() {
        let store = MemoryStore::new();
        for (ts, value) in [(10, 1), (20, -2), (30, 3)] {
            store.append_series("history:1", ts, value).await.unwrap();
        }

        let points = store.range_series("history:1", 20).await.unwrap();
        assert_eq!(
            points,
            vec![
                SeriesPoint { timestamp: 20, value: -2 },
                SeriesPoint { timestamp: 30, value: 3 },
            ]
        );
        assert_eq!(
            store.last_point("history:1").await.unwrap(),
            Some(SeriesPoint { timestamp: 30, value: 3 })
        );
        assert_eq!(store.last_point("history:2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_clears_hash() {
        let store = MemoryStore::new();
        store.set_hash("h", "f", "v").await.unwrap();
        store
            .atomic_batch(vec![StoreOp::Delete { key: "h".to_string() }])
            .await
            .unwrap();
        assert!(store.get_hash("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_batch() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result = store.set_string("k", "v").await;
        assert!(matches!(result, Err(LeaderboardError::Store(_))));

        store.set_unavailable(false);
        assert_eq!(store.get_string("k").await.unwrap(), None);
        assert_eq!(store.batches_applied(), 0);
    }
}
