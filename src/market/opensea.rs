//! OpenSea REST API Client
//!
//! Collection stats and paginated listings for one collection.
//! Endpoints documented at: https://docs.opensea.io/reference/api-overview

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client,
};
use serde_json::Value;
use std::time::Duration;

use super::{ListingsPage, MarketplaceApi};

pub const OPENSEA_API_URL: &str = "https://api.opensea.io/api/v2";

/// REST client for the OpenSea v2 API
pub struct OpenSeaClient {
    client: Client,
    base_url: String,
    page_limit: usize,
}

impl OpenSeaClient {
    /// Create a new client. `api_key` is sent as `X-API-KEY` when present.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        page_limit: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "X-API-KEY",
                HeaderValue::from_str(key).context("Invalid X-API-KEY header value")?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_limit: page_limit.max(1),
        })
    }
}

#[async_trait]
impl MarketplaceApi for OpenSeaClient {
    async fn collection_stats(&self, slug: &str) -> Result<Value> {
        let url = format!("{}/collections/{}/stats", self.base_url, slug);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch collection stats")?;

        if !response.status().is_success() {
            bail!("Stats error: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse collection stats response")
    }

    async fn listings_page(&self, slug: &str, cursor: Option<String>) -> Result<ListingsPage> {
        let url = format!("{}/listings/collection/{}/all", self.base_url, slug);

        let mut params = vec![("limit", self.page_limit.to_string())];
        if let Some(next) = cursor {
            params.push(("next", next));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to fetch listings page")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Listings error: {} [{}]", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse listings response")
    }
}
