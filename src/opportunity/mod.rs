//! Opportunity ranking
//!
//! Joins live listings with the rarity catalog and orders them by bargain
//! score. Malformed or out-of-range listings are skipped, never reported.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::market::{parse_price, MarketDataClient};
use crate::pricing::quote_bargain;
use crate::rarity::RarityCatalog;
use crate::types::{CollectionStats, Listing, Opportunity};

/// Rank listings by bargain score, best first.
///
/// Only the first listing per token counts. Ties keep feed order.
pub fn rank(
    listings: &[Listing],
    stats: &CollectionStats,
    catalog: &RarityCatalog,
    rank_threshold: u32,
) -> Vec<Opportunity> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut opportunities = Vec::new();

    for listing in listings {
        let Some(token_id) = listing.token_id.as_deref() else {
            continue;
        };
        if !seen.insert(token_id) {
            continue;
        }

        let Some(record) = catalog.get(token_id) else {
            continue;
        };
        if record.official_rank > rank_threshold {
            continue;
        }

        let current_price = match parse_price(listing) {
            Some(price) if price > 0.0 => price,
            _ => continue,
        };

        let quote = quote_bargain(
            record.official_rank,
            current_price,
            stats.floor_price,
            stats.volume,
            rank_threshold,
        );

        debug!(
            token_id,
            rank = record.official_rank,
            current = current_price,
            expected = %format!("{:.3}", quote.expected_price),
            diff = %format!("{:.3}", quote.price_diff),
            score = %format!("{:.2}", quote.bargain_score),
            "Scored listing"
        );

        opportunities.push(Opportunity {
            token_id: token_id.to_string(),
            image_url: record.image_url.clone(),
            official_rank: record.official_rank,
            rarity_score: record.rarity_score,
            current_price,
            expected_price: quote.expected_price,
            price_diff: quote.price_diff,
            bargain_score: quote.bargain_score,
            floor_price: stats.floor_price,
        });
    }

    // sort_by is stable
    opportunities.sort_by(|a, b| b.bargain_score.total_cmp(&a.bargain_score));
    opportunities
}

/// Result of one ranking pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityScan {
    pub stats: CollectionStats,
    pub listings_seen: usize,
    pub opportunities: Vec<Opportunity>,
}

/// Fetches market data and ranks it against the catalog
#[derive(Clone)]
pub struct OpportunityService {
    market: MarketDataClient,
    catalog: Arc<RarityCatalog>,
    rank_threshold: u32,
}

impl OpportunityService {
    pub fn new(market: MarketDataClient, catalog: Arc<RarityCatalog>, rank_threshold: u32) -> Self {
        Self {
            market,
            catalog,
            rank_threshold,
        }
    }

    /// Fetch stats and listings concurrently, then rank.
    pub async fn scan(&self, cancel: &CancellationToken) -> OpportunityScan {
        let slug = self.market.slug().to_string();
        let (stats, listings) = tokio::join!(
            self.market.get_collection_stats(&slug),
            self.market.get_collection_listings(cancel),
        );

        let opportunities = rank(&listings, &stats, &self.catalog, self.rank_threshold);

        info!(
            slug = %slug,
            listings = listings.len(),
            opportunities = opportunities.len(),
            floor = stats.floor_price,
            "🔎 Opportunity scan complete"
        );

        OpportunityScan {
            stats,
            listings_seen: listings.len(),
            opportunities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RarityRecord, DEFAULT_RANK_THRESHOLD};

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn record(token_id: &str, rank: u32) -> RarityRecord {
        RarityRecord {
            token_id: token_id.to_string(),
            official_rank: rank,
            rarity_score: 100.0,
            image_url: format!("https://img/{token_id}.png"),
        }
    }

    fn stats(floor: f64) -> CollectionStats {
        CollectionStats {
            floor_price: floor,
            ..CollectionStats::default()
        }
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let catalog = RarityCatalog::from_records(vec![record("1", 1)]);
        assert!(rank(&[], &stats(1.0), &catalog, DEFAULT_RANK_THRESHOLD).is_empty());
    }

    #[test]
    fn first_listing_per_token_wins() {
        let catalog = RarityCatalog::from_records(vec![record("1", 10)]);
        let listings = vec![Listing::new("1", ETH), Listing::new("1", ETH / 10)];

        let ranked = rank(&listings, &stats(1.0), &catalog, DEFAULT_RANK_THRESHOLD);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].current_price, 1.0);
    }

    #[test]
    fn listings_without_price_or_token_are_skipped() {
        let catalog = RarityCatalog::from_records(vec![record("1", 10), record("2", 20)]);
        let listings = vec![
            Listing {
                token_id: None,
                price_wei: Some(ETH),
            },
            Listing {
                token_id: Some("1".to_string()),
                price_wei: None,
            },
            Listing::new("2", 0),
        ];

        assert!(rank(&listings, &stats(1.0), &catalog, DEFAULT_RANK_THRESHOLD).is_empty());
    }

    #[test]
    fn carries_floor_and_catalog_fields() {
        let catalog = RarityCatalog::from_records(vec![record("9", 500)]);
        let ranked = rank(&[Listing::new("9", ETH)], &stats(1.0), &catalog, 1000);

        let opp = &ranked[0];
        assert_eq!(opp.image_url, "https://img/9.png");
        assert_eq!(opp.official_rank, 500);
        assert_eq!(opp.floor_price, 1.0);
        assert!((opp.bargain_score - 83.77).abs() < 0.05);
    }
}
