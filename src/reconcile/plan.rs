//! Cycle planning - pure diff of ledger state against the last snapshot
//!
//! Nothing here touches the store. The reconciler feeds in the snapshot and
//! the last history points it read, and gets back the ops to apply.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::ledger::ShardScan;
use crate::passport::{parse_output, to_signed, Passport};
use crate::reference::{Player, ReferenceData};
use crate::store::{keys, leaderboard_order, ScoredMember, SeriesPoint, StoreOp};

/// Passports keyed by normalized address
pub type PassportMap = BTreeMap<String, Passport>;

/// Decode every fetched output into the cycle's passport set.
///
/// Shards are taken in order and outputs in ledger order, so a later output
/// for the same address wins. Returns the set and the count of outputs that
/// failed to decode.
pub fn collect_passports(scans: &[ShardScan], reference: &ReferenceData) -> (PassportMap, usize) {
    let mut passports = PassportMap::new();
    let mut skipped = 0;

    for scan in scans {
        for output in &scan.outputs {
            match parse_output(output, reference) {
                Ok(Some(passport)) => {
                    passports.insert(passport.address.clone(), passport);
                }
                Ok(None) => {}
                Err(e) => {
                    skipped += 1;
                    warn!(country = %scan.country, error = %e, "Skipping malformed output");
                }
            }
        }
    }

    (passports, skipped)
}

/// Per-country sums over one passport set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryTotals {
    pub co2: BTreeMap<String, u64>,
    pub trees: BTreeMap<String, u64>,
}

impl CountryTotals {
    pub fn from_passports(passports: &PassportMap) -> Self {
        let mut totals = Self::default();
        for passport in passports.values() {
            let co2 = totals.co2.entry(passport.country.clone()).or_insert(0);
            *co2 = co2.saturating_add(passport.co2);
            let trees = totals.trees.entry(passport.country.clone()).or_insert(0);
            *trees = trees.saturating_add(passport.trees);
        }
        totals
    }

    pub fn has_country(&self, country: &str) -> bool {
        self.co2.contains_key(country)
    }

    /// Emissions minus offsets; negative when offsets exceed emissions
    pub fn net(&self, country: &str) -> i64 {
        let co2 = self.co2.get(country).copied().unwrap_or(0);
        let trees = self.trees.get(country).copied().unwrap_or(0);
        to_signed(co2).saturating_sub(to_signed(trees))
    }
}

/// Leaderboard and player-record ops for the passports that changed.
///
/// Addresses missing from `current` are removed from both leaderboards.
pub fn diff_passports(
    previous: &PassportMap,
    current: &PassportMap,
    reference: &ReferenceData,
) -> Vec<StoreOp> {
    let mut ops = Vec::new();

    for (address, passport) in current {
        let last = previous.get(address);

        if last.map(|p| p.co2) != Some(passport.co2) {
            ops.push(StoreOp::UpsertScore {
                set: keys::LEADERBOARD_CO2.to_string(),
                member: address.clone(),
                score: passport.co2,
            });
        }

        if last.map(|p| p.trees) != Some(passport.trees) {
            ops.push(StoreOp::UpsertScore {
                set: keys::LEADERBOARD_TREES.to_string(),
                member: address.clone(),
                score: passport.trees,
            });
        }

        if last.map(|p| p.country.as_str()) != Some(passport.country.as_str()) {
            ops.extend(player_ops(address, &passport.country, reference));
        }
    }

    for address in previous.keys().filter(|a| !current.contains_key(*a)) {
        debug!(address = %address, "Address left the snapshot");
        for set in [keys::LEADERBOARD_CO2, keys::LEADERBOARD_TREES] {
            ops.push(StoreOp::RemoveScore {
                set: set.to_string(),
                member: address.clone(),
            });
        }
    }

    ops
}

fn player_ops(address: &str, country: &str, reference: &ReferenceData) -> Vec<StoreOp> {
    let key = keys::player(address);
    let player = Player {
        country_id: Some(country.to_string()),
        ..reference.player_or_placeholder(address)
    };

    player
        .to_fields()
        .into_iter()
        .map(|(field, value)| StoreOp::SetHash {
            key: key.clone(),
            field,
            value,
        })
        .collect()
}

/// Replace both aggregate hashes with `totals`
pub fn aggregate_ops(totals: &CountryTotals) -> Vec<StoreOp> {
    let mut ops = vec![
        StoreOp::Delete {
            key: keys::AGGREGATE_CO2.to_string(),
        },
        StoreOp::Delete {
            key: keys::AGGREGATE_TREES.to_string(),
        },
    ];

    for (key, sums) in [(keys::AGGREGATE_CO2, &totals.co2), (keys::AGGREGATE_TREES, &totals.trees)] {
        ops.extend(sums.iter().map(|(country, sum)| StoreOp::SetHash {
            key: key.to_string(),
            field: country.clone(),
            value: sum.to_string(),
        }));
    }

    ops
}

/// History points for countries whose net balance moved.
///
/// `last_points` holds each country's latest recorded point, read before the
/// cycle wrote anything. A country with no passports and no history is left
/// alone; one that lost all passports records a zero balance. Countries in
/// `failed` were not read this cycle and get no point.
pub fn history_ops<'a>(
    countries: impl IntoIterator<Item = &'a str>,
    totals: &CountryTotals,
    last_points: &BTreeMap<String, Option<SeriesPoint>>,
    failed: &[String],
    timestamp: u64,
) -> Vec<StoreOp> {
    let mut ops = Vec::new();

    for country in countries {
        if failed.iter().any(|f| f == country) {
            continue;
        }

        let net = totals.net(country);
        let last = last_points.get(country).copied().flatten();

        let append = match last {
            Some(point) => point.value != net,
            None => totals.has_country(country),
        };

        if append {
            ops.push(StoreOp::AppendSeries {
                key: keys::history(country),
                point: SeriesPoint {
                    timestamp,
                    value: net,
                },
            });
        }
    }

    ops
}

/// Addresses with a positive value, highest first, ties by address
pub fn ranking(passports: &PassportMap, value: impl Fn(&Passport) -> u64) -> Vec<ScoredMember> {
    let mut ranked: Vec<ScoredMember> = passports
        .values()
        .map(|p| ScoredMember::new(p.address.clone(), value(p)))
        .filter(|m| m.score > 0)
        .collect();
    ranked.sort_by(leaderboard_order);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Output;
    use crate::passport::tests::{payload, reference};

    fn passport(address: &str, country: &str, co2: u64, trees: u64) -> Passport {
        Passport {
            address: address.to_string(),
            country: country.to_string(),
            co2,
            trees,
        }
    }

    fn map(passports: Vec<Passport>) -> PassportMap {
        passports.into_iter().map(|p| (p.address.clone(), p)).collect()
    }

    fn scan(country: &str, outputs: Vec<(&str, u32, u32)>) -> ShardScan {
        ShardScan {
            country: country.to_string(),
            outputs: outputs
                .into_iter()
                .map(|(address, trees, co2)| Output {
                    address: address.to_string(),
                    color: country.parse().unwrap(),
                    data: Some(payload(trees, co2)),
                })
                .collect(),
            error: None,
        }
    }

    #[test]
    fn test_collect_last_write_wins() {
        let reference = reference(&["1", "2"]);
        let scans = vec![
            scan("1", vec![("0xAA", 1, 10)]),
            scan("2", vec![("0xaa", 2, 20)]),
        ];

        let (passports, skipped) = collect_passports(&scans, &reference);
        assert_eq!(skipped, 0);
        assert_eq!(passports.len(), 1);
        assert_eq!(passports["0xaa"], passport("0xaa", "2", 20, 2));
    }

    #[test]
    fn test_collect_skips_malformed_output_only() {
        let reference = reference(&["1"]);
        let mut shard = scan("1", vec![("0xaa", 1, 10), ("0xbb", 2, 20)]);
        shard.outputs[0].data = Some("0xdead".to_string());

        let (passports, skipped) = collect_passports(&[shard], &reference);
        assert_eq!(skipped, 1);
        assert!(passports.contains_key("0xbb"));
        assert!(!passports.contains_key("0xaa"));
    }

    #[test]
    fn test_totals_and_signed_net() {
        let totals = CountryTotals::from_passports(&map(vec![
            passport("0x1", "A", 100, 20),
            passport("0x2", "A", 20, 25),
            passport("0x3", "B", 40, 130),
        ]));

        assert_eq!(totals.co2["A"], 120);
        assert_eq!(totals.trees["A"], 45);
        assert_eq!(totals.net("A"), 75);
        assert_eq!(totals.net("B"), -90);
        assert_eq!(totals.net("C"), 0);
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let reference = reference(&["1"]);
        let state = map(vec![passport("0x1", "1", 5, 3)]);
        assert!(diff_passports(&state, &state.clone(), &reference).is_empty());
    }

    #[test]
    fn test_diff_new_address_stages_everything() {
        let reference = reference(&["1"]);
        let current = map(vec![passport("0x1", "1", 5, 3)]);

        let ops = diff_passports(&PassportMap::new(), &current, &reference);
        assert!(ops.contains(&StoreOp::UpsertScore {
            set: keys::LEADERBOARD_CO2.to_string(),
            member: "0x1".to_string(),
            score: 5,
        }));
        assert!(ops.contains(&StoreOp::UpsertScore {
            set: keys::LEADERBOARD_TREES.to_string(),
            member: "0x1".to_string(),
            score: 3,
        }));
        assert!(ops.contains(&StoreOp::SetHash {
            key: "player:0x1".to_string(),
            field: "name".to_string(),
            value: "unknown".to_string(),
        }));
        assert!(ops.contains(&StoreOp::SetHash {
            key: "player:0x1".to_string(),
            field: "countryId".to_string(),
            value: "1".to_string(),
        }));
    }

    #[test]
    fn test_diff_only_changed_metric() {
        let reference = reference(&["1"]);
        let previous = map(vec![passport("0x1", "1", 5, 3)]);
        let current = map(vec![passport("0x1", "1", 5, 4)]);

        let ops = diff_passports(&previous, &current, &reference);
        assert_eq!(
            ops,
            vec![StoreOp::UpsertScore {
                set: keys::LEADERBOARD_TREES.to_string(),
                member: "0x1".to_string(),
                score: 4,
            }]
        );
    }

    #[test]
    fn test_diff_removes_departed_addresses() {
        let reference = reference(&["1"]);
        let previous = map(vec![passport("0x1", "1", 5, 3)]);

        let ops = diff_passports(&previous, &PassportMap::new(), &reference);
        assert_eq!(ops.len(), 2);
        assert!(ops
            .iter()
            .all(|op| matches!(op, StoreOp::RemoveScore { member, .. } if member == "0x1")));
    }

    #[test]
    fn test_history_skips_unchanged_net() {
        let totals = CountryTotals::from_passports(&map(vec![
            passport("0x1", "A", 120, 45),
            passport("0x2", "B", 10, 0),
        ]));
        let mut last = BTreeMap::new();
        last.insert("A".to_string(), Some(SeriesPoint { timestamp: 5, value: 75 }));
        last.insert("B".to_string(), Some(SeriesPoint { timestamp: 5, value: 7 }));

        let ops = history_ops(["A", "B"], &totals, &last, &[], 10);
        assert_eq!(
            ops,
            vec![StoreOp::AppendSeries {
                key: "history:B".to_string(),
                point: SeriesPoint { timestamp: 10, value: 10 },
            }]
        );
    }

    #[test]
    fn test_history_empty_country_behaviour() {
        let totals = CountryTotals::default();
        let mut last = BTreeMap::new();
        last.insert("A".to_string(), Some(SeriesPoint { timestamp: 5, value: 3 }));
        last.insert("B".to_string(), None);

        let ops = history_ops(["A", "B"], &totals, &last, &[], 10);
        assert_eq!(
            ops,
            vec![StoreOp::AppendSeries {
                key: "history:A".to_string(),
                point: SeriesPoint { timestamp: 10, value: 0 },
            }]
        );
    }

    #[test]
    fn test_history_skips_failed_shard() {
        let totals = CountryTotals::from_passports(&map(vec![passport("0x1", "B", 10, 0)]));
        let mut last = BTreeMap::new();
        last.insert("A".to_string(), Some(SeriesPoint { timestamp: 5, value: 3 }));
        last.insert("B".to_string(), Some(SeriesPoint { timestamp: 5, value: 7 }));

        let ops = history_ops(["A", "B"], &totals, &last, &["A".to_string()], 10);
        assert_eq!(
            ops,
            vec![StoreOp::AppendSeries {
                key: "history:B".to_string(),
                point: SeriesPoint { timestamp: 10, value: 10 },
            }]
        );
    }

    #[test]
    fn test_aggregate_ops_replace_hashes() {
        let totals = CountryTotals::from_passports(&map(vec![passport("0x1", "A", 3, 1)]));
        let ops = aggregate_ops(&totals);

        assert!(matches!(&ops[0], StoreOp::Delete { key } if key == keys::AGGREGATE_CO2));
        assert!(ops.contains(&StoreOp::SetHash {
            key: keys::AGGREGATE_TREES.to_string(),
            field: "A".to_string(),
            value: "1".to_string(),
        }));
    }

    #[test]
    fn test_ranking_filters_and_orders() {
        let passports = map(vec![
            passport("0xb", "A", 9, 0),
            passport("0xa", "A", 9, 2),
            passport("0xc", "A", 0, 1),
        ]);

        let emissions: Vec<String> = ranking(&passports, |p| p.co2)
            .into_iter()
            .map(|m| m.member)
            .collect();
        assert_eq!(emissions, vec!["0xa", "0xb"]);
        assert_eq!(ranking(&passports, |p| p.trees)[0].member, "0xa");
    }
}
