//! Marketplace data
//!
//! Collection stats and the full active listing set, degrading to defaults
//! instead of failing: zero stats on error, partial listings when
//! pagination breaks part way.

mod opensea;

pub use opensea::{OpenSeaClient, OPENSEA_API_URL};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{CollectionStats, Listing};

/// One page of the listings feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingsPage {
    #[serde(default)]
    pub listings: Vec<Value>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Raw marketplace transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Stats payload for a collection
    async fn collection_stats(&self, slug: &str) -> Result<Value>;

    /// One listings page; `cursor` is the previous page's `next`
    async fn listings_page(&self, slug: &str, cursor: Option<String>) -> Result<ListingsPage>;
}

/// Listed price in ETH, `None` when the listing carried no price.
pub fn parse_price(listing: &Listing) -> Option<f64> {
    listing.price_eth()
}

/// Stats and listings for one collection
#[derive(Clone)]
pub struct MarketDataClient {
    api: Arc<dyn MarketplaceApi>,
    slug: String,
    page_delay: Duration,
}

impl MarketDataClient {
    pub fn new(api: Arc<dyn MarketplaceApi>, slug: &str, page_delay: Duration) -> Self {
        Self {
            api,
            slug: slug.to_string(),
            page_delay,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Current stats for `slug`; all zeros when the request fails.
    pub async fn get_collection_stats(&self, slug: &str) -> CollectionStats {
        match self.api.collection_stats(slug).await {
            Ok(payload) => {
                let stats = CollectionStats::from_payload(&payload);
                debug!(slug, floor = stats.floor_price, volume = stats.volume, "Collection stats");
                stats
            }
            Err(e) => {
                warn!(slug, error = %e, "Failed to fetch collection stats, using zeros");
                CollectionStats::default()
            }
        }
    }

    /// Walk the listings feed until the server stops returning a cursor.
    ///
    /// Any failure or cancellation returns the listings gathered so far.
    pub async fn get_collection_listings(&self, cancel: &CancellationToken) -> Vec<Listing> {
        let mut listings = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                warn!(pages, collected = listings.len(), "Listing pagination cancelled");
                break;
            }

            let page = match self.api.listings_page(&self.slug, cursor.take()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        pages,
                        collected = listings.len(),
                        error = %e,
                        "Listing pagination failed, returning partial result"
                    );
                    break;
                }
            };

            pages += 1;
            listings.extend(page.listings.iter().map(Listing::from_payload));
            debug!(
                page = pages,
                fetched = page.listings.len(),
                next = ?page.next,
                "Fetched listings page"
            );

            cursor = page.next.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }

            // Rate-limit courtesy between pages
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(pages, collected = listings.len(), "Listing pagination cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.page_delay) => {}
            }
        }

        info!(
            slug = %self.slug,
            pages,
            listings = listings.len(),
            "Collection listings fetched"
        );
        listings
    }
}
