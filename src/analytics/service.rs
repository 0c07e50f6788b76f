//! Analysis views built from the cached metrics.
//!
//! Every method returns a value; failures degrade to cached or zero data.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::cache::AnalyticsCache;
use super::metrics::{
    daily_volume_from_rows, daily_volume_is_valid, DailyVolumePoint, HolderMetrics,
    HoldingDistribution, MarketMetrics, MetricQueries, MetricTtls, DAILY_VOLUME_KEY,
    HOLDER_METRICS_KEY, HOLDING_DISTRIBUTION_KEY, MARKET_METRICS_KEY,
};
use super::{run_query, PollPolicy, QueryEngine};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub volume_24h: f64,
    pub total_volume: f64,
    pub average_price: f64,
    pub holder_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedAnalysis {
    pub daily_volume: Vec<DailyVolumePoint>,
    pub holding_times: HoldingDistribution,
    pub holder_total: u64,
}

#[derive(Clone)]
pub struct AnalysisService {
    engine: Arc<dyn QueryEngine>,
    cache: AnalyticsCache,
    queries: MetricQueries,
    ttls: MetricTtls,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl AnalysisService {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        cache: AnalyticsCache,
        queries: MetricQueries,
        ttls: MetricTtls,
        poll: PollPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            cache,
            queries,
            ttls,
            poll,
            cancel,
        }
    }

    pub async fn get_market_metrics(&self) -> MarketMetrics {
        self.cache
            .get(
                MARKET_METRICS_KEY,
                self.ttls.market_metrics,
                MarketMetrics::is_valid,
                || self.fetch_market_metrics(),
            )
            .await
    }

    pub async fn get_daily_volume(&self) -> Vec<DailyVolumePoint> {
        self.cache
            .get(
                DAILY_VOLUME_KEY,
                self.ttls.daily_volume,
                daily_volume_is_valid,
                || self.fetch_daily_volume(),
            )
            .await
    }

    pub async fn get_holder_metrics(&self) -> HolderMetrics {
        self.cache
            .get(
                HOLDER_METRICS_KEY,
                self.ttls.holder_metrics,
                HolderMetrics::is_valid,
                || self.fetch_holder_metrics(),
            )
            .await
    }

    pub async fn get_holding_distribution(&self) -> HoldingDistribution {
        self.cache
            .get(
                HOLDING_DISTRIBUTION_KEY,
                self.ttls.holding_distribution,
                HoldingDistribution::is_valid,
                || self.fetch_holding_distribution(),
            )
            .await
    }

    /// Headline numbers: market metrics and holder count
    pub async fn fetch_basic_stats(&self) -> BasicStats {
        let (market, holders) = tokio::join!(self.get_market_metrics(), self.get_holder_metrics());
        BasicStats {
            volume_24h: market.volume_24h,
            total_volume: market.total_volume,
            average_price: market.average_price,
            holder_count: holders.unique_holders,
        }
    }

    /// Chart data: daily volume, holding-time buckets and holder total
    pub async fn fetch_detailed_analysis(&self) -> DetailedAnalysis {
        let (daily_volume, holding_times, holders) = tokio::join!(
            self.get_daily_volume(),
            self.get_holding_distribution(),
            self.get_holder_metrics(),
        );
        DetailedAnalysis {
            daily_volume,
            holding_times,
            holder_total: holders.unique_holders,
        }
    }

    async fn fetch_market_metrics(&self) -> Result<MarketMetrics> {
        let (avg_price_rows, volume_rows) = tokio::try_join!(
            self.run(self.queries.avg_price_by_date),
            self.run(self.queries.daily_volume),
        )?;
        Ok(MarketMetrics::from_rows(&avg_price_rows, &volume_rows))
    }

    async fn fetch_daily_volume(&self) -> Result<Vec<DailyVolumePoint>> {
        let rows = self.run(self.queries.daily_volume).await?;
        Ok(daily_volume_from_rows(&rows))
    }

    async fn fetch_holder_metrics(&self) -> Result<HolderMetrics> {
        let rows = self.run(self.queries.unique_holders).await?;
        Ok(HolderMetrics::from_rows(&rows))
    }

    async fn fetch_holding_distribution(&self) -> Result<HoldingDistribution> {
        let rows = self.run(self.queries.holding_time_distribution).await?;
        Ok(HoldingDistribution::from_rows(&rows))
    }

    async fn run(&self, query_id: u64) -> Result<Vec<serde_json::Value>, super::AnalyticsError> {
        run_query(self.engine.as_ref(), query_id, self.poll, &self.cancel).await
    }
}
