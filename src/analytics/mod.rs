//! Analytics module - cached metrics from a slow query engine
//!
//! Queries are submitted, polled until they reach a terminal state, then
//! their rows are fetched. Results go through a TTL read-through cache so the
//! engine is only hit when a metric is missing, stale or degenerate.

mod cache;
mod dune;
mod metrics;
mod retry;
mod service;

pub use cache::{AnalyticsCache, CacheEntry, CacheStore, Clock, FileCacheStore, MemoryCacheStore, SystemClock};
pub use dune::{DuneClient, DUNE_API_URL};
pub use metrics::{
    DailyVolumePoint, HolderMetrics, HoldingDistribution, MarketMetrics, MetricQueries, MetricTtls,
    DAILY_VOLUME_KEY, HOLDER_METRICS_KEY, HOLDING_DISTRIBUTION_KEY, MARKET_METRICS_KEY,
};
pub use retry::{with_rate_limit_retry, RetryPolicy};
pub use service::{AnalysisService, BasicStats, DetailedAnalysis};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failures talking to the query engine
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("rate limited by query engine")]
    RateLimited,

    #[error("query engine returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request failed after {0} retries")]
    RetriesExhausted(usize),

    #[error("query execution {execution_id} ended in {state}")]
    QueryFailed { execution_id: String, state: String },

    #[error("query execution {execution_id} still pending after {polls} polls")]
    PollTimeout { execution_id: String, polls: usize },

    #[error("cancelled")]
    Cancelled,
}

impl AnalyticsError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AnalyticsError::RateLimited)
    }
}

/// Execution state reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Completed,
    Failed(String),
    Pending(String),
}

impl ExecutionState {
    /// Classify a raw state such as `QUERY_STATE_COMPLETED`
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper.ends_with("COMPLETED") {
            ExecutionState::Completed
        } else if upper.ends_with("FAILED")
            || upper.ends_with("CANCELLED")
            || upper.ends_with("EXPIRED")
        {
            ExecutionState::Failed(raw.to_string())
        } else {
            ExecutionState::Pending(raw.to_string())
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Pending(_))
    }
}

/// Submit/poll/fetch interface of the external query engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Start an execution of a saved query, returning its execution id
    async fn execute_query(&self, query_id: u64) -> Result<String, AnalyticsError>;

    async fn execution_status(&self, execution_id: &str) -> Result<ExecutionState, AnalyticsError>;

    async fn execution_results(&self, execution_id: &str) -> Result<Vec<Value>, AnalyticsError>;
}

/// How often and how long to wait on an execution
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_polls: 30,
        }
    }
}

/// Run a saved query to completion and return its rows.
pub async fn run_query(
    engine: &dyn QueryEngine,
    query_id: u64,
    poll: PollPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<Value>, AnalyticsError> {
    let execution_id = engine.execute_query(query_id).await?;
    debug!(query_id, execution_id = %execution_id, "Query submitted");

    let mut state = engine.execution_status(&execution_id).await?;
    let mut polls = 0usize;

    while !state.is_terminal() {
        if polls >= poll.max_polls {
            warn!(query_id, execution_id = %execution_id, polls, "Query polling gave up");
            return Err(AnalyticsError::PollTimeout { execution_id, polls });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(AnalyticsError::Cancelled),
            _ = tokio::time::sleep(poll.interval) => {}
        }

        polls += 1;
        state = engine.execution_status(&execution_id).await?;
        debug!(query_id, polls, state = ?state, "Polled execution");
    }

    if let ExecutionState::Failed(state) = state {
        return Err(AnalyticsError::QueryFailed {
            execution_id,
            state,
        });
    }

    let rows = engine.execution_results(&execution_id).await?;
    info!(query_id, rows = rows.len(), polls, "Query results fetched");
    Ok(rows)
}
