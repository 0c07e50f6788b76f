//! Configuration management for RarityScope
//!
//! Loads from config files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use crate::analytics::{MetricQueries, MetricTtls, PollPolicy, RetryPolicy};

/// Environment variable holding the marketplace API key
pub const OPENSEA_API_KEY_ENV: &str = "OPENSEA_API_KEY";
/// Environment variable holding the analytics engine API key
pub const DUNE_API_KEY_ENV: &str = "DUNE_API_KEY";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub collection: CollectionConfig,
    pub marketplace: MarketplaceConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    /// Marketplace collection slug
    pub slug: String,
    /// Static rarity dataset (`{"nfts": [...]}`)
    pub rarity_data_path: String,
    /// Worst rank still considered for opportunities
    pub rank_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    /// Marketplace API endpoint
    pub base_url: String,
    /// Listings per page
    pub page_limit: usize,
    /// Delay between listing pages in milliseconds
    pub page_delay_ms: u64,
    /// HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Query engine endpoint
    pub base_url: String,
    /// Seconds between execution status polls
    pub poll_interval_secs: u64,
    /// Polls before giving up on an execution
    pub max_polls: usize,
    /// Retries on rate-limit responses
    pub max_retries: usize,
    /// Backoff base, multiplied by 3^attempt
    pub backoff_base_ms: u64,
    /// Maximum random jitter added to each backoff
    pub backoff_jitter_ms: u64,
    /// HTTP timeout in seconds
    pub request_timeout_secs: u64,
    pub queries: QueryIdsConfig,
    pub ttl: TtlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryIdsConfig {
    pub avg_price_by_date: u64,
    pub daily_volume: u64,
    pub unique_holders: u64,
    pub holding_time_distribution: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtlConfig {
    pub market_metrics_secs: u64,
    pub daily_volume_secs: u64,
    pub holder_metrics_secs: u64,
    pub holding_distribution_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Persist the analytics cache to `path` (in-memory otherwise)
    pub persistent: bool,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// JSON log lines instead of human-readable output
    pub json: bool,
}

impl LoggingConfig {
    /// Install the global tracing subscriber (logs go to stderr)
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        if self.json {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        } else {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();
        Self::build(
            Config::builder()
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name("config/local").required(false))
                // Override with environment variables (RARITYSCOPE__*)
                .add_source(Environment::with_prefix("RARITYSCOPE").separator("__")),
        )
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        Self::build(Config::builder())
    }

    fn build(
        sources: config::builder::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = sources
            // Collection defaults
            .set_default("collection.slug", "hungrybera")?
            .set_default("collection.rarity_data_path", "data/nft-data.json")?
            .set_default("collection.rank_threshold", 1000)?
            // Marketplace defaults
            .set_default("marketplace.base_url", crate::market::OPENSEA_API_URL)?
            .set_default("marketplace.page_limit", 50)?
            .set_default("marketplace.page_delay_ms", 500)?
            .set_default("marketplace.request_timeout_secs", 30)?
            // Analytics defaults
            .set_default("analytics.base_url", crate::analytics::DUNE_API_URL)?
            .set_default("analytics.poll_interval_secs", 60)?
            .set_default("analytics.max_polls", 30)?
            .set_default("analytics.max_retries", 6)?
            .set_default("analytics.backoff_base_ms", 2000)?
            .set_default("analytics.backoff_jitter_ms", 2000)?
            .set_default("analytics.request_timeout_secs", 30)?
            .set_default("analytics.queries.avg_price_by_date", 4157304)?
            .set_default("analytics.queries.daily_volume", 4157383)?
            .set_default("analytics.queries.unique_holders", 4158634)?
            .set_default("analytics.queries.holding_time_distribution", 4158612)?
            .set_default("analytics.ttl.market_metrics_secs", 3600)?
            .set_default("analytics.ttl.daily_volume_secs", 900)?
            .set_default("analytics.ttl.holder_metrics_secs", 21600)?
            .set_default("analytics.ttl.holding_distribution_secs", 10800)?
            // Cache defaults
            .set_default("cache.persistent", true)?
            .set_default("cache.path", "./data/analytics_cache.json")?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "collection={} rank_threshold={} page_delay_ms={} poll_secs={} max_polls={} cache={}",
            self.collection.slug,
            self.collection.rank_threshold,
            self.marketplace.page_delay_ms,
            self.analytics.poll_interval_secs,
            self.analytics.max_polls,
            if self.cache.persistent {
                self.cache.path.as_str()
            } else {
                "memory"
            }
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self) -> Result<()> {
        for var in [OPENSEA_API_KEY_ENV, DUNE_API_KEY_ENV] {
            if api_key(var).is_none() {
                bail!("Required environment variable {} is not set", var);
            }
        }
        Ok(())
    }
}

impl MarketplaceConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AnalyticsConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_polls: self.max_polls,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_jitter: Duration::from_millis(self.backoff_jitter_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn metric_queries(&self) -> MetricQueries {
        MetricQueries {
            avg_price_by_date: self.queries.avg_price_by_date,
            daily_volume: self.queries.daily_volume,
            unique_holders: self.queries.unique_holders,
            holding_time_distribution: self.queries.holding_time_distribution,
        }
    }

    pub fn metric_ttls(&self) -> MetricTtls {
        MetricTtls {
            market_metrics: Duration::from_secs(self.ttl.market_metrics_secs),
            daily_volume: Duration::from_secs(self.ttl.daily_volume_secs),
            holder_metrics: Duration::from_secs(self.ttl.holder_metrics_secs),
            holding_distribution: Duration::from_secs(self.ttl.holding_distribution_secs),
        }
    }
}

/// Non-empty API key from the environment
pub fn api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_metric_constants() {
        let config = AppConfig::defaults().unwrap();

        assert_eq!(config.collection.slug, "hungrybera");
        assert_eq!(config.collection.rank_threshold, 1000);
        assert_eq!(config.marketplace.page_delay(), Duration::from_millis(500));
        assert_eq!(config.analytics.metric_queries(), MetricQueries::default());
        assert_eq!(config.analytics.metric_ttls(), MetricTtls::default());
        assert_eq!(config.analytics.retry_policy().max_retries, 6);
        assert_eq!(config.analytics.poll_policy().interval, Duration::from_secs(60));
    }

    #[test]
    fn digest_has_no_secrets() {
        let config = AppConfig::defaults().unwrap();
        let digest = config.digest();
        assert!(digest.contains("collection=hungrybera"));
        assert!(!digest.to_lowercase().contains("key"));
    }
}
