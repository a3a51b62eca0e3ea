//! Store key layout
//!
//! ```text
//! snapshot                   JSON map address -> passport
//! cursor                     unix seconds of the last changing cycle
//! leaderboard:co2            scored set, member = address
//! leaderboard:trees          scored set, member = address
//! player:<address>           hash {name, countryId, avatar}
//! country-aggregate:co2      hash country -> sum
//! country-aggregate:trees    hash country -> sum
//! history:<country>          series timestamp -> net co2
//! ```

pub const SNAPSHOT: &str = "snapshot";
pub const CURSOR: &str = "cursor";

pub const LEADERBOARD_CO2: &str = "leaderboard:co2";
pub const LEADERBOARD_TREES: &str = "leaderboard:trees";

pub const AGGREGATE_CO2: &str = "country-aggregate:co2";
pub const AGGREGATE_TREES: &str = "country-aggregate:trees";

pub fn player(address: &str) -> String {
    format!("player:{}", address)
}

pub fn history(country: &str) -> String {
    format!("history:{}", country)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(player("0xabc"), "player:0xabc");
        assert_eq!(history("49155"), "history:49155");
    }
}
