//! SQLite-backed leaderboard store
//!
//! One table per value type. A batch runs inside a single transaction, so a
//! failing op rolls back everything staged before it.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

use super::{LeaderboardStore, ReadOp, ReadReply, ScoredMember, SeriesPoint, StoreOp};
use crate::error::{LeaderboardError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scores (
    set_key TEXT NOT NULL,
    member TEXT NOT NULL,
    score INTEGER NOT NULL,
    PRIMARY KEY (set_key, member)
);
CREATE INDEX IF NOT EXISTS scores_by_rank ON scores (set_key, score DESC, member ASC);
CREATE TABLE IF NOT EXISTS hashes (
    hash_key TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (hash_key, field)
);
CREATE TABLE IF NOT EXISTS series (
    series_key TEXT NOT NULL,
    ts INTEGER NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (series_key, ts)
);
CREATE TABLE IF NOT EXISTS strings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)?;

        // WAL keeps readers off the writer's lock
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        db.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "SQLite store initialized");
        Ok(Self { db: Mutex::new(db) })
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }
}

fn to_sql_int(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| LeaderboardError::Store(format!("{} {} out of range", what, value)))
}

fn from_sql_int(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| LeaderboardError::Store(format!("negative {} {} in store", what, value)))
}

fn apply(tx: &Transaction<'_>, op: &StoreOp) -> Result<()> {
    match op {
        StoreOp::UpsertScore { set, member, score } => {
            tx.execute(
                "INSERT INTO scores (set_key, member, score) VALUES (?1, ?2, ?3)
                 ON CONFLICT(set_key, member) DO UPDATE SET score = ?3",
                params![set, member, to_sql_int(*score, "score")?],
            )?;
        }
        StoreOp::RemoveScore { set, member } => {
            tx.execute(
                "DELETE FROM scores WHERE set_key = ?1 AND member = ?2",
                params![set, member],
            )?;
        }
        StoreOp::SetHash { key, field, value } => {
            tx.execute(
                "INSERT INTO hashes (hash_key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash_key, field) DO UPDATE SET value = ?3",
                params![key, field, value],
            )?;
        }
        StoreOp::Delete { key } => {
            tx.execute("DELETE FROM scores WHERE set_key = ?1", [key])?;
            tx.execute("DELETE FROM hashes WHERE hash_key = ?1", [key])?;
            tx.execute("DELETE FROM series WHERE series_key = ?1", [key])?;
            tx.execute("DELETE FROM strings WHERE key = ?1", [key])?;
        }
        StoreOp::AppendSeries { key, point } => {
            tx.execute(
                "INSERT INTO series (series_key, ts, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(series_key, ts) DO UPDATE SET value = ?3",
                params![key, to_sql_int(point.timestamp, "timestamp")?, point.value],
            )?;
        }
        StoreOp::SetString { key, value } => {
            tx.execute(
                "INSERT INTO strings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }
    }
    Ok(())
}

fn read(db: &Connection, op: ReadOp) -> Result<ReadReply> {
    match op {
        ReadOp::TopN { set, n } => {
            let limit = i64::try_from(n).unwrap_or(i64::MAX);
            let mut stmt = db.prepare_cached(
                "SELECT member, score FROM scores WHERE set_key = ?1
                 ORDER BY score DESC, member ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![set, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut members = Vec::new();
            for row in rows {
                let (member, score) = row?;
                members.push(ScoredMember::new(member, from_sql_int(score, "score")?));
            }
            Ok(ReadReply::Scores(members))
        }
        ReadOp::Hash { key } => {
            let mut stmt =
                db.prepare_cached("SELECT field, value FROM hashes WHERE hash_key = ?1")?;
            let rows = stmt.query_map([key], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let hash = rows.collect::<rusqlite::Result<BTreeMap<String, String>>>()?;
            Ok(ReadReply::Hash(hash))
        }
        ReadOp::Series { key, from } => {
            let mut stmt = db.prepare_cached(
                "SELECT ts, value FROM series WHERE series_key = ?1 AND ts >= ?2 ORDER BY ts ASC",
            )?;
            let rows = stmt.query_map(params![key, to_sql_int(from, "timestamp")?], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut points = Vec::new();
            for row in rows {
                let (ts, value) = row?;
                points.push(SeriesPoint {
                    timestamp: from_sql_int(ts, "timestamp")?,
                    value,
                });
            }
            Ok(ReadReply::Series(points))
        }
        ReadOp::LastPoint { key } => {
            let row = db
                .prepare_cached(
                    "SELECT ts, value FROM series WHERE series_key = ?1 ORDER BY ts DESC LIMIT 1",
                )?
                .query_row([key], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
                .optional()?;
            let point = match row {
                Some((ts, value)) => Some(SeriesPoint {
                    timestamp: from_sql_int(ts, "timestamp")?,
                    value,
                }),
                None => None,
            };
            Ok(ReadReply::Point(point))
        }
        ReadOp::String { key } => {
            let value = db
                .prepare_cached("SELECT value FROM strings WHERE key = ?1")?
                .query_row([key], |row| row.get(0))
                .optional()?;
            Ok(ReadReply::String(value))
        }
    }
}

#[async_trait::async_trait]
impl LeaderboardStore for SqliteStore {
    async fn read_batch(&self, reads: Vec<ReadOp>) -> Result<Vec<ReadReply>> {
        let db = self.db.lock().await;
        reads.into_iter().map(|op| read(&db, op)).collect()
    }

    async fn atomic_batch(&self, ops: Vec<StoreOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        for op in &ops {
            // Dropping `tx` on error rolls the batch back
            apply(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_top_n_matches_memory_semantics() {
        let store = SqliteStore::in_memory().unwrap();
        for (member, score) in [("a", 5), ("b", 9), ("c", 9), ("d", 1)] {
            store.upsert_score("set", member, score).await.unwrap();
        }

        let top: Vec<String> = store
            .top_n("set", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.member)
            .collect();
        assert_eq!(top, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store
            .atomic_batch(vec![
                StoreOp::SetString {
                    key: "cursor".to_string(),
                    value: "42".to_string(),
                },
                StoreOp::UpsertScore {
                    set: "set".to_string(),
                    member: "a".to_string(),
                    score: u64::MAX,
                },
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(store.get_string("cursor").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_negative_series_values() {
        let store = SqliteStore::in_memory().unwrap();
        store.append_series("history:1", 100, -90).await.unwrap();
        store.append_series("history:1", 200, 75).await.unwrap();

        let points = store.range_series("history:1", 0).await.unwrap();
        assert_eq!(points[0].value, -90);
        assert_eq!(
            store.last_point("history:1").await.unwrap(),
            Some(SeriesPoint { timestamp: 200, value: 75 })
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/leaderboard.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set_hash("player:0xaa", "name", "alice").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let hash = store.get_hash("player:0xaa").await.unwrap();
        assert_eq!(hash.get("name").map(String::as_str), Some("alice"));
        store.ping().await.unwrap();
    }
}
