//! RarityScope CLI
//!
//! Builds one dashboard snapshot and prints it as JSON on stdout.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rarityscope::analytics::{
    AnalysisService, AnalyticsCache, CacheStore, DuneClient, FileCacheStore, MemoryCacheStore,
};
use rarityscope::config::{api_key, AppConfig, DUNE_API_KEY_ENV, OPENSEA_API_KEY_ENV};
use rarityscope::dashboard::Dashboard;
use rarityscope::market::{MarketDataClient, OpenSeaClient};
use rarityscope::opportunity::OpportunityService;
use rarityscope::rarity::RarityCatalog;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    config.logging.init();

    info!("🚀 RarityScope starting: {}", config);
    if let Err(e) = config.validate_env() {
        warn!("{e}, requests may be rejected");
    }

    let catalog = Arc::new(RarityCatalog::load(&config.collection.rarity_data_path)?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, cancelling in-flight requests");
                cancel.cancel();
            }
        });
    }

    let opensea = OpenSeaClient::new(
        &config.marketplace.base_url,
        api_key(OPENSEA_API_KEY_ENV).as_deref(),
        config.marketplace.page_limit,
        config.marketplace.request_timeout(),
    )?;
    let market = MarketDataClient::new(
        Arc::new(opensea),
        &config.collection.slug,
        config.marketplace.page_delay(),
    );

    let dune = DuneClient::new(
        &config.analytics.base_url,
        api_key(DUNE_API_KEY_ENV).as_deref(),
        config.analytics.retry_policy(),
        config.analytics.request_timeout(),
    )?;
    let store: Arc<dyn CacheStore> = if config.cache.persistent {
        Arc::new(FileCacheStore::open(&config.cache.path)?)
    } else {
        Arc::new(MemoryCacheStore::new())
    };
    let analysis = AnalysisService::new(
        Arc::new(dune),
        AnalyticsCache::new(store),
        config.analytics.metric_queries(),
        config.analytics.metric_ttls(),
        config.analytics.poll_policy(),
        cancel.clone(),
    );

    let dashboard = Dashboard::new(
        &config.collection.slug,
        OpportunityService::new(market, catalog, config.collection.rank_threshold),
        analysis,
    );

    let snapshot = dashboard.snapshot(&cancel).await;
    let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
    println!("{json}");

    Ok(())
}
