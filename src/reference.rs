//! Static reference data: the country directory and the player directory.
//!
//! Both are loaded once at startup from JSON and shared read-only behind an
//! `Arc`. Country ids double as ledger colors, so each id is also the shard
//! the scanner queries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{LeaderboardError, Result};
use crate::passport::normalize_address;

/// Display name used when an address has no directory entry
pub const PLACEHOLDER_NAME: &str = "unknown";

/// A country entry from `countries.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub event: String,
}

/// A player entry from `players.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(rename = "countryId", default, skip_serializing_if = "Option::is_none")]
    pub country_id: Option<String>,
}

impl Player {
    /// Default record for addresses missing from the directory
    pub fn placeholder() -> Self {
        Self {
            name: PLACEHOLDER_NAME.to_string(),
            avatar: None,
            country_id: None,
        }
    }

    /// Rebuild a player from a `player:<address>` hash
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Option<Self> {
        let name = fields.get("name")?.clone();
        Some(Self {
            name,
            avatar: fields.get("avatar").cloned(),
            country_id: fields.get("countryId").cloned(),
        })
    }

    /// Flatten into hash fields for the store
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("name".to_string(), self.name.clone())];
        if let Some(avatar) = &self.avatar {
            fields.push(("avatar".to_string(), avatar.clone()));
        }
        if let Some(country_id) = &self.country_id {
            fields.push(("countryId".to_string(), country_id.clone()));
        }
        fields
    }
}

/// Immutable country and player directories
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    countries: BTreeMap<String, Country>,
    /// Shard order: integer ids ascending, then any others lexically
    country_order: Vec<String>,
    players: BTreeMap<String, Player>,
}

pub type SharedReference = Arc<ReferenceData>;

impl ReferenceData {
    pub fn new(countries: BTreeMap<String, Country>, players: BTreeMap<String, Player>) -> Self {
        let players = players
            .into_iter()
            .map(|(address, player)| (normalize_address(&address), player))
            .collect();

        let mut country_order: Vec<String> = countries.keys().cloned().collect();
        country_order.sort_by_key(|id| {
            let numeric = id.parse::<u64>().ok();
            (numeric.is_none(), numeric)
        });

        Self {
            countries,
            country_order,
            players,
        }
    }

    /// Load both directories from JSON files
    pub fn load(countries_path: &Path, players_path: &Path) -> Result<Self> {
        let countries: BTreeMap<String, Country> = read_json(countries_path)?;
        let players: BTreeMap<String, Player> = if players_path.exists() {
            read_json(players_path)?
        } else {
            BTreeMap::new()
        };

        if countries.is_empty() {
            return Err(LeaderboardError::Reference(format!(
                "no countries defined in {}",
                countries_path.display()
            )));
        }

        info!(
            countries = countries.len(),
            players = players.len(),
            "Reference data loaded"
        );

        Ok(Self::new(countries, players))
    }

    pub fn is_country(&self, id: &str) -> bool {
        self.countries.contains_key(id)
    }

    /// Country ids in shard order
    pub fn country_ids(&self) -> impl Iterator<Item = &str> {
        self.country_order.iter().map(String::as_str)
    }

    pub fn player(&self, address: &str) -> Option<&Player> {
        self.players.get(address)
    }

    /// Directory entry for `address`, or the placeholder
    pub fn player_or_placeholder(&self, address: &str) -> Player {
        self.player(address).cloned().unwrap_or_else(Player::placeholder)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LeaderboardError::Reference(format!("reading {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&content)?)
}
