//! Dashboard Module
//!
//! Assembles everything the collection dashboard shows into one snapshot:
//! live stats, ranked opportunities and the cached analytics views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analytics::{AnalysisService, BasicStats, DetailedAnalysis};
use crate::opportunity::OpportunityService;
use crate::types::{CollectionStats, Opportunity};

/// Complete dashboard state handed to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub collection: String,
    pub stats: CollectionStats,
    pub listings_seen: usize,
    pub opportunities: Vec<Opportunity>,
    pub basic_stats: BasicStats,
    pub detailed_analysis: DetailedAnalysis,
}

pub struct Dashboard {
    collection: String,
    opportunities: OpportunityService,
    analysis: AnalysisService,
}

impl Dashboard {
    pub fn new(collection: &str, opportunities: OpportunityService, analysis: AnalysisService) -> Self {
        Self {
            collection: collection.to_string(),
            opportunities,
            analysis,
        }
    }

    /// Build a snapshot, running the scan and both analysis views concurrently
    pub async fn snapshot(&self, cancel: &CancellationToken) -> DashboardSnapshot {
        let (scan, basic_stats, detailed_analysis) = tokio::join!(
            self.opportunities.scan(cancel),
            self.analysis.fetch_basic_stats(),
            self.analysis.fetch_detailed_analysis(),
        );

        info!(
            collection = %self.collection,
            opportunities = scan.opportunities.len(),
            holders = basic_stats.holder_count,
            volume_points = detailed_analysis.daily_volume.len(),
            "📊 Dashboard snapshot ready"
        );

        DashboardSnapshot {
            generated_at: Utc::now(),
            collection: self.collection.clone(),
            stats: scan.stats,
            listings_seen: scan.listings_seen,
            opportunities: scan.opportunities,
            basic_stats,
            detailed_analysis,
        }
    }
}
