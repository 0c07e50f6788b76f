//! Core types used throughout RarityScope
//!
//! Defines the rarity records, marketplace data and ranked opportunities.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Number of base units in one ETH (18 decimals)
pub const WEI_PER_ETH: f64 = 1e18;

/// Default rank cut-off for opportunity ranking
pub const DEFAULT_RANK_THRESHOLD: u32 = 1000;

/// One entry of the static rarity dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub token_id: String,
    pub official_rank: u32,
    #[serde(default)]
    pub rarity_score: f64,
    #[serde(default)]
    pub image_url: String,
}

/// Latest known collection statistics.
///
/// All-zero means "unknown", never "this collection has zero volume".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub floor_price: f64,
    pub volume: f64,
    pub sales_count: f64,
    pub owner_count: f64,
    pub average_price: f64,
    pub market_cap: f64,
}

impl CollectionStats {
    /// Build from the marketplace stats payload (`{"total": {...}}`).
    /// Missing or non-numeric fields become 0.
    pub fn from_payload(payload: &Value) -> Self {
        let total = payload.get("total").unwrap_or(&Value::Null);
        Self {
            floor_price: number_field(total, "floor_price"),
            volume: number_field(total, "volume"),
            sales_count: number_field(total, "sales"),
            owner_count: number_field(total, "num_owners"),
            average_price: number_field(total, "average_price"),
            market_cap: number_field(total, "market_cap"),
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}

/// Active sale listing, reduced to what ranking needs.
///
/// Either field may be absent in the feed; ranking skips such records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub token_id: Option<String>,
    pub price_wei: Option<u128>,
}

impl Listing {
    pub fn new(token_id: impl Into<String>, price_wei: u128) -> Self {
        Self {
            token_id: Some(token_id.into()),
            price_wei: Some(price_wei),
        }
    }

    /// Extract a listing from a raw marketplace record.
    ///
    /// Reads `protocol_data.parameters` first; the flattened
    /// `price.current.value` shape is only consulted for the price when the
    /// consideration amount is missing.
    pub fn from_payload(raw: &Value) -> Self {
        let params = raw.pointer("/protocol_data/parameters");

        let token_id = params
            .and_then(|p| p.pointer("/offer/0/identifierOrCriteria"))
            .and_then(scalar_to_string)
            .filter(|id| !id.is_empty());

        let price_wei = params
            .and_then(|p| p.pointer("/consideration/0/startAmount"))
            .and_then(parse_wei)
            .or_else(|| raw.pointer("/price/current/value").and_then(parse_wei));

        Self {
            token_id,
            price_wei,
        }
    }

    /// Listed price in ETH; `None` when the feed carried no price.
    pub fn price_eth(&self) -> Option<f64> {
        self.price_wei.map(|wei| wei as f64 / WEI_PER_ETH)
    }
}

/// A ranked bargain candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub token_id: String,
    pub image_url: String,
    pub official_rank: u32,
    pub rarity_score: f64,
    /// Listed price in ETH
    pub current_price: f64,
    /// Rarity-adjusted fair value in ETH
    pub expected_price: f64,
    /// current_price - expected_price
    pub price_diff: f64,
    /// Always within [0, 100]
    pub bargain_score: f64,
    /// Live floor at ranking time (0 when unknown)
    pub floor_price: f64,
}

fn number_field(obj: &Value, key: &str) -> f64 {
    obj.get(key).map(value_as_f64).unwrap_or(0.0)
}

/// Numeric JSON value or numeric string as f64, 0 otherwise.
pub(crate) fn value_as_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_wei(value: &Value) -> Option<u128> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<u128>().ok().or_else(|| {
                // Some payloads carry amounts in exponent notation
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(|v| v as u128)
            })
        }
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u128)),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom("tokenId must be a string or number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_default_to_zero_for_missing_and_garbage_fields() {
        let stats = CollectionStats::from_payload(&json!({
            "total": {
                "floor_price": 0.42,
                "volume": "120.5",
                "sales": null,
                "num_owners": "many",
                "market_cap": 9
            }
        }));

        assert_eq!(stats.floor_price, 0.42);
        assert_eq!(stats.volume, 120.5);
        assert_eq!(stats.sales_count, 0.0);
        assert_eq!(stats.owner_count, 0.0);
        assert_eq!(stats.average_price, 0.0);
        assert_eq!(stats.market_cap, 9.0);
    }

    #[test]
    fn stats_without_total_are_unknown() {
        assert!(CollectionStats::from_payload(&json!({})).is_unknown());
    }

    #[test]
    fn listing_reads_protocol_data_shape() {
        let listing = Listing::from_payload(&json!({
            "protocol_data": {
                "parameters": {
                    "offer": [{ "identifierOrCriteria": "1234" }],
                    "consideration": [{ "startAmount": "1500000000000000000" }]
                }
            }
        }));

        assert_eq!(listing.token_id.as_deref(), Some("1234"));
        assert_eq!(listing.price_wei, Some(1_500_000_000_000_000_000));
        assert_eq!(listing.price_eth(), Some(1.5));
    }

    #[test]
    fn listing_falls_back_to_legacy_price_shape() {
        let listing = Listing::from_payload(&json!({
            "protocol_data": { "parameters": { "offer": [{ "identifierOrCriteria": "7" }] } },
            "price": { "current": { "value": "250000000000000000" } }
        }));

        assert_eq!(listing.token_id.as_deref(), Some("7"));
        assert_eq!(listing.price_eth(), Some(0.25));
    }

    #[test]
    fn missing_price_is_none_but_zero_is_some() {
        let missing = Listing::from_payload(&json!({
            "protocol_data": { "parameters": { "offer": [{ "identifierOrCriteria": "1" }] } }
        }));
        assert_eq!(missing.price_eth(), None);

        let zero = Listing::from_payload(&json!({
            "protocol_data": {
                "parameters": {
                    "offer": [{ "identifierOrCriteria": "1" }],
                    "consideration": [{ "startAmount": "0" }]
                }
            }
        }));
        assert_eq!(zero.price_eth(), Some(0.0));
    }

    #[test]
    fn rarity_record_accepts_numeric_token_id() {
        let record: RarityRecord = serde_json::from_value(json!({
            "tokenId": 42,
            "officialRank": 3,
            "rarityScore": 88.5,
            "imageUrl": "https://img/42.png"
        }))
        .unwrap();

        assert_eq!(record.token_id, "42");
        assert_eq!(record.official_rank, 3);
    }
}
