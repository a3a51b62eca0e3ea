//! Passport decoding from ledger outputs
//!
//! A passport is an NST output whose color is a country id. Its payload is a
//! hex string; the offsets and emissions counters sit at fixed character
//! positions (counted from the `0x` prefix):
//!
//! ```text
//! 0x ....................................... TTTTTTTT CCCCCCCC
//!    ^2                                      ^50      ^58     ^66
//! ```
//!
//! `T` is the offsets (trees) counter and `C` the emissions (co2) counter,
//! both big-endian base-16.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

use crate::ledger::Output;
use crate::reference::ReferenceData;

/// Character range of the trees counter in the payload
pub const TREES_RANGE: Range<usize> = 50..58;

/// Character range of the co2 counter in the payload
pub const CO2_RANGE: Range<usize> = 58..66;

/// Decoded per-address emissions/offsets record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passport {
    pub address: String,
    pub country: String,
    pub co2: u64,
    pub trees: u64,
}

/// Why a single output could not be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PassportError {
    #[error("output {address} has no payload")]
    MissingPayload { address: String },

    #[error("output {address} payload too short: {len} chars, need {needed}")]
    ShortPayload {
        address: String,
        len: usize,
        needed: usize,
    },

    #[error("output {address} has non-hex field {field}: {raw:?}")]
    InvalidField {
        address: String,
        field: &'static str,
        raw: String,
    },
}

/// Canonical form of an address: trimmed and lowercase
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Decode a passport from one output.
///
/// Returns `Ok(None)` when the output's color is not a known country. A
/// malformed payload is an error for this output only.
pub fn parse_output(
    output: &Output,
    reference: &ReferenceData,
) -> Result<Option<Passport>, PassportError> {
    let country = output.color.to_string();
    if !reference.is_country(&country) {
        return Ok(None);
    }

    let address = normalize_address(&output.address);
    let data = output
        .data
        .as_deref()
        .ok_or_else(|| PassportError::MissingPayload {
            address: address.clone(),
        })?;

    let trees = decode_field(data, TREES_RANGE, "trees", &address)?;
    let co2 = decode_field(data, CO2_RANGE, "co2", &address)?;

    Ok(Some(Passport {
        address,
        country,
        co2,
        trees,
    }))
}

fn decode_field(
    data: &str,
    range: Range<usize>,
    field: &'static str,
    address: &str,
) -> Result<u64, PassportError> {
    let raw = data.get(range.clone()).ok_or_else(|| PassportError::ShortPayload {
        address: address.to_string(),
        len: data.len(),
        needed: range.end,
    })?;

    // from_str_radix tolerates a leading '+', the ledger never emits one
    if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PassportError::InvalidField {
            address: address.to_string(),
            field,
            raw: raw.to_string(),
        });
    }

    u32::from_str_radix(raw, 16)
        .map(u64::from)
        .map_err(|_| PassportError::InvalidField {
            address: address.to_string(),
            field,
            raw: raw.to_string(),
        })
}

pub(crate) fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reference::Country;
    use std::collections::BTreeMap;

    /// Build a payload with the given counters at their offsets
    pub fn payload(trees: u32, co2: u32) -> String {
        format!("0x{}{:08x}{:08x}", "0".repeat(48), trees, co2)
    }

    pub fn reference(ids: &[&str]) -> ReferenceData {
        let countries = ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    Country {
                        name: format!("Country {id}"),
                        color: id.to_string(),
                        event: String::new(),
                    },
                )
            })
            .collect();
        ReferenceData::new(countries, BTreeMap::new())
    }

    fn output(address: &str, color: u64, data: Option<String>) -> Output {
        Output {
            address: address.to_string(),
            color,
            data,
        }
    }

    #[test]
    fn test_parse_known_country() {
        let reference = reference(&["49155"]);
        let out = output("0xAbC", 49155, Some(payload(45, 120)));

        let passport = parse_output(&out, &reference).unwrap().unwrap();
        assert_eq!(passport.address, "0xabc");
        assert_eq!(passport.country, "49155");
        assert_eq!(passport.trees, 45);
        assert_eq!(passport.co2, 120);
    }

    #[test]
    fn test_unknown_color_is_filtered() {
        let reference = reference(&["49155"]);
        let out = output("0xabc", 0, Some(payload(1, 1)));
        assert_eq!(parse_output(&out, &reference), Ok(None));
    }

    #[test]
    fn test_missing_payload() {
        let reference = reference(&["49155"]);
        let out = output("0xabc", 49155, None);
        assert!(matches!(
            parse_output(&out, &reference),
            Err(PassportError::MissingPayload { .. })
        ));
    }

    #[test]
    fn test_short_payload() {
        let reference = reference(&["49155"]);
        let out = output("0xabc", 49155, Some("0x1234".to_string()));
        assert!(matches!(
            parse_output(&out, &reference),
            Err(PassportError::ShortPayload { needed: 58, .. })
        ));
    }

    #[test]
    fn test_non_hex_field() {
        let reference = reference(&["49155"]);
        let mut data = payload(0, 0);
        data.replace_range(60..62, "zz");
        let out = output("0xabc", 49155, Some(data));
        assert!(matches!(
            parse_output(&out, &reference),
            Err(PassportError::InvalidField { field: "co2", .. })
        ));
    }

    #[test]
    fn test_max_counter_values() {
        let reference = reference(&["1"]);
        let out = output("0xabc", 1, Some(payload(u32::MAX, u32::MAX)));
        let passport = parse_output(&out, &reference).unwrap().unwrap();
        assert_eq!(passport.co2, u64::from(u32::MAX));
        assert_eq!(passport.trees, u64::from(u32::MAX));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("  0xDEADbeef "), "0xdeadbeef");
    }
}
