//! `/stats` - cursor-gated leaderboard snapshot
//!
//! Clients poll with the `lastUpdate` of their previous response as `from`.
//! When nothing changed since then the server answers 304 after a single
//! cursor read; otherwise it issues one batched read and composes the payload.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::AppState;
use crate::error::{LeaderboardError, Result};
use crate::reconcile::parse_cursor;
use crate::reference::{Player, ReferenceData};
use crate::store::{keys, LeaderboardStore, ReadOp, ReadReply, ScoredMember};

/// Entries per leaderboard in a response
pub const TOP_N: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub last_update: u64,
    pub players: BTreeMap<String, Player>,
    /// `[address, co2]`, highest first
    pub emissions: Vec<(String, u64)>,
    /// `[address, trees]`, highest first
    pub trees: Vec<(String, u64)>,
    /// Per country `[timestamp, net]`, oldest first
    #[serde(rename = "netCO2History")]
    pub net_co2_history: BTreeMap<String, Vec<(u64, i64)>>,
    pub co2_by_country: BTreeMap<String, u64>,
    pub trees_by_country: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsOutcome {
    NotModified,
    Fresh(StatsResponse),
}

/// Leading decimal digits of `raw`, 0 when there are none
pub fn parse_from(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else { return 0 };
    let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// GET /stats
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Response> {
    let from = parse_from(query.from.as_deref());

    match read_stats(state.store.as_ref(), &state.reference, from).await? {
        StatsOutcome::NotModified => {
            debug!(from, "Not modified");
            Ok(StatusCode::NOT_MODIFIED.into_response())
        }
        StatsOutcome::Fresh(response) => Ok(Json(response).into_response()),
    }
}

/// Apply the cache gate and, past it, compose the snapshot.
pub async fn read_stats<S>(store: &S, reference: &ReferenceData, from: u64) -> Result<StatsOutcome>
where
    S: LeaderboardStore + ?Sized,
{
    let cursor = parse_cursor(store.get_string(keys::CURSOR).await?);
    if from >= cursor {
        return Ok(StatsOutcome::NotModified);
    }

    let countries: Vec<&str> = reference.country_ids().collect();

    let mut reads = vec![
        ReadOp::String {
            key: keys::CURSOR.to_string(),
        },
        ReadOp::TopN {
            set: keys::LEADERBOARD_CO2.to_string(),
            n: TOP_N,
        },
        ReadOp::TopN {
            set: keys::LEADERBOARD_TREES.to_string(),
            n: TOP_N,
        },
        ReadOp::Hash {
            key: keys::AGGREGATE_CO2.to_string(),
        },
        ReadOp::Hash {
            key: keys::AGGREGATE_TREES.to_string(),
        },
    ];
    reads.extend(countries.iter().map(|country| ReadOp::Series {
        key: keys::history(country),
        from,
    }));

    let mut replies = store.read_batch(reads).await?.into_iter();
    let mut next = || {
        replies
            .next()
            .ok_or_else(|| LeaderboardError::Store("short read batch".to_string()))
    };

    // The batch's own cursor matches the data it returned
    let last_update = parse_cursor(next()?.into_string()?);
    let emissions = next()?.into_scores()?;
    let trees = next()?.into_scores()?;
    let co2_by_country = parse_aggregate(keys::AGGREGATE_CO2, next()?.into_hash()?);
    let trees_by_country = parse_aggregate(keys::AGGREGATE_TREES, next()?.into_hash()?);

    let mut net_co2_history = BTreeMap::new();
    for country in &countries {
        let points = next()?.into_series()?;
        net_co2_history.insert(
            country.to_string(),
            points.into_iter().map(|p| (p.timestamp, p.value)).collect(),
        );
    }

    let players = resolve_players(store, reference, &emissions, &trees).await?;

    Ok(StatsOutcome::Fresh(StatsResponse {
        last_update,
        players,
        emissions: pairs(emissions),
        trees: pairs(trees),
        net_co2_history,
        co2_by_country,
        trees_by_country,
    }))
}

/// Player records for the listed addresses, in one batched read
async fn resolve_players<S>(
    store: &S,
    reference: &ReferenceData,
    emissions: &[ScoredMember],
    trees: &[ScoredMember],
) -> Result<BTreeMap<String, Player>>
where
    S: LeaderboardStore + ?Sized,
{
    let mut addresses: Vec<&str> = emissions
        .iter()
        .chain(trees)
        .map(|m| m.member.as_str())
        .collect();
    addresses.sort_unstable();
    addresses.dedup();

    if addresses.is_empty() {
        return Ok(BTreeMap::new());
    }

    let reads = addresses
        .iter()
        .map(|address| ReadOp::Hash {
            key: keys::player(address),
        })
        .collect();
    let replies = store.read_batch(reads).await?;

    let mut players = BTreeMap::new();
    for (address, reply) in addresses.into_iter().zip(replies) {
        let player = match reply {
            ReadReply::Hash(fields) => Player::from_fields(&fields),
            other => {
                return Err(LeaderboardError::Store(format!(
                    "unexpected player reply {:?}",
                    other
                )))
            }
        };
        let player = player.unwrap_or_else(|| reference.player_or_placeholder(address));
        players.insert(address.to_string(), player);
    }

    Ok(players)
}

fn parse_aggregate(key: &str, hash: BTreeMap<String, String>) -> BTreeMap<String, u64> {
    hash.into_iter()
        .filter_map(|(country, raw)| match raw.parse() {
            Ok(value) => Some((country, value)),
            Err(_) => {
                warn!(key, country = %country, raw = %raw, "Unreadable aggregate value");
                None
            }
        })
        .collect()
}

fn pairs(members: Vec<ScoredMember>) -> Vec<(String, u64)> {
    members.into_iter().map(|m| (m.member, m.score)).collect()
}
