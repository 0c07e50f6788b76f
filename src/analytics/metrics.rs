//! Cached collection metrics and their row mappings
//!
//! Each metric has a cache key, a TTL, a validity predicate (an all-zero or
//! empty result is never cached) and a zero default.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::types::value_as_f64;

pub const MARKET_METRICS_KEY: &str = "marketMetrics";
pub const DAILY_VOLUME_KEY: &str = "dailyVolume";
pub const HOLDER_METRICS_KEY: &str = "holderMetrics";
pub const HOLDING_DISTRIBUTION_KEY: &str = "holdingDistribution";

/// Saved query ids on the analytics engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQueries {
    pub avg_price_by_date: u64,
    pub daily_volume: u64,
    pub unique_holders: u64,
    pub holding_time_distribution: u64,
}

impl Default for MetricQueries {
    fn default() -> Self {
        Self {
            avg_price_by_date: 4157304,
            daily_volume: 4157383,
            unique_holders: 4158634,
            holding_time_distribution: 4158612,
        }
    }
}

/// Per-metric cache lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricTtls {
    pub market_metrics: Duration,
    pub daily_volume: Duration,
    pub holder_metrics: Duration,
    pub holding_distribution: Duration,
}

impl Default for MetricTtls {
    fn default() -> Self {
        Self {
            market_metrics: Duration::from_secs(60 * 60),
            daily_volume: Duration::from_secs(15 * 60),
            holder_metrics: Duration::from_secs(6 * 60 * 60),
            holding_distribution: Duration::from_secs(3 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMetrics {
    pub volume_24h: f64,
    pub total_volume: f64,
    pub average_price: f64,
}

impl MarketMetrics {
    /// Latest (last) row of each query
    pub fn from_rows(avg_price_rows: &[Value], volume_rows: &[Value]) -> Self {
        let latest_volume = volume_rows.last();
        let latest_price = avg_price_rows.last();
        Self {
            volume_24h: round_to(row_f64(latest_volume, "volume_usd"), 3),
            total_volume: round_to(row_f64(latest_volume, "total_volume_usd"), 3),
            average_price: round_to(row_f64(latest_price, "avg_price_eth"), 3),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.volume_24h != 0.0 || self.total_volume != 0.0 || self.average_price != 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyVolumePoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub volume: f64,
}

/// Rows with a date and a non-zero volume, oldest first
pub fn daily_volume_from_rows(rows: &[Value]) -> Vec<DailyVolumePoint> {
    let mut points: Vec<DailyVolumePoint> = rows
        .iter()
        .filter_map(|row| {
            let date = row.get("date")?.as_str()?.trim();
            if date.is_empty() {
                return None;
            }
            let volume = row.get("volume_usd").map(value_as_f64).unwrap_or(0.0);
            if volume == 0.0 {
                return None;
            }
            Some(DailyVolumePoint {
                date: date.chars().take(10).collect(),
                volume,
            })
        })
        .collect();

    // ISO dates sort lexically
    points.sort_by(|a, b| a.date.cmp(&b.date));
    points
}

pub fn daily_volume_is_valid(points: &Vec<DailyVolumePoint>) -> bool {
    points.iter().any(|p| p.volume != 0.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderMetrics {
    pub unique_holders: u64,
}

impl HolderMetrics {
    pub fn from_rows(rows: &[Value]) -> Self {
        let holders = row_f64(rows.first(), "total_unique_holders");
        Self {
            unique_holders: if holders > 0.0 { holders.round() as u64 } else { 0 },
        }
    }

    pub fn is_valid(&self) -> bool {
        self.unique_holders != 0
    }
}

/// Share of holders per holding-time bucket, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingDistribution {
    #[serde(rename = "0-30d")]
    pub days_0_30: f64,
    #[serde(rename = "30-90d")]
    pub days_30_90: f64,
    #[serde(rename = "90-180d")]
    pub days_90_180: f64,
    #[serde(rename = "180d+")]
    pub days_180_plus: f64,
}

impl HoldingDistribution {
    pub fn from_rows(rows: &[Value]) -> Self {
        let percentage = |category: &str| -> f64 {
            rows.iter()
                .find(|row| row.get("holding_category").and_then(Value::as_str) == Some(category))
                .and_then(|row| row.get("percentage"))
                .and_then(Value::as_f64)
                .map(|pct| round_to(pct, 1))
                .unwrap_or(0.0)
        };

        Self {
            days_0_30: percentage("Sold this week"),
            days_30_90: percentage("Held for < 1 month"),
            days_90_180: percentage("Held for 1-3 months"),
            days_180_plus: percentage("Held for 3-6 months"),
        }
    }

    pub fn is_valid(&self) -> bool {
        [
            self.days_0_30,
            self.days_30_90,
            self.days_90_180,
            self.days_180_plus,
        ]
        .iter()
        .any(|v| *v != 0.0)
    }
}

fn row_f64(row: Option<&Value>, key: &str) -> f64 {
    row.and_then(|r| r.get(key)).map(value_as_f64).unwrap_or(0.0)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn market_metrics_use_latest_rows_and_round() {
        let avg = vec![json!({ "avg_price_eth": 0.1 }), json!({ "avg_price_eth": 0.23456 })];
        let vol = vec![
            json!({ "volume_usd": 1.0, "total_volume_usd": 2.0 }),
            json!({ "volume_usd": 1234.56789, "total_volume_usd": 98765.4321 }),
        ];

        let m = MarketMetrics::from_rows(&avg, &vol);
        assert_eq!(m.volume_24h, 1234.568);
        assert_eq!(m.total_volume, 98765.432);
        assert_eq!(m.average_price, 0.235);
        assert!(m.is_valid());
        assert!(!MarketMetrics::from_rows(&[], &[]).is_valid());
    }

    #[test]
    fn daily_volume_drops_incomplete_rows_and_sorts() {
        let rows = vec![
            json!({ "date": "2024-11-03 00:00:00.000 UTC", "volume_usd": 30.0 }),
            json!({ "date": "2024-11-01 00:00:00.000 UTC", "volume_usd": "10.5" }),
            json!({ "date": "2024-11-02 00:00:00.000 UTC", "volume_usd": 0 }),
            json!({ "volume_usd": 99.0 }),
        ];

        let points = daily_volume_from_rows(&rows);
        assert_eq!(
            points,
            vec![
                DailyVolumePoint { date: "2024-11-01".to_string(), volume: 10.5 },
                DailyVolumePoint { date: "2024-11-03".to_string(), volume: 30.0 },
            ]
        );
        assert!(daily_volume_is_valid(&points));
        assert!(!daily_volume_is_valid(&Vec::new()));
    }

    #[test]
    fn holder_metrics_read_first_row() {
        let m = HolderMetrics::from_rows(&[json!({ "total_unique_holders": 2345 })]);
        assert_eq!(m.unique_holders, 2345);
        assert!(!HolderMetrics::from_rows(&[]).is_valid());
    }

    #[test]
    fn holding_distribution_maps_categories() {
        let rows = vec![
            json!({ "holding_category": "Sold this week", "percentage": 12.345 }),
            json!({ "holding_category": "Held for 1-3 months", "percentage": 40.06 }),
            json!({ "holding_category": "Held for 3-6 months", "percentage": "n/a" }),
        ];

        let d = HoldingDistribution::from_rows(&rows);
        assert_eq!(d.days_0_30, 12.3);
        assert_eq!(d.days_30_90, 0.0);
        assert_eq!(d.days_90_180, 40.1);
        assert_eq!(d.days_180_plus, 0.0);
        assert!(d.is_valid());
        assert!(!HoldingDistribution::default().is_valid());
    }

    #[test]
    fn holding_distribution_serializes_bucket_names() {
        let json = serde_json::to_value(HoldingDistribution::default()).unwrap();
        assert!(json.get("0-30d").is_some());
        assert!(json.get("180d+").is_some());
    }
}
