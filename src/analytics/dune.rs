//! Dune Analytics REST client
//!
//! Every call is wrapped in the rate-limit retry policy.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::error;

use super::retry::{with_rate_limit_retry, RetryPolicy};
use super::{AnalyticsError, ExecutionState, QueryEngine};

pub const DUNE_API_URL: &str = "https://api.dune.com/api/v1";

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    execution_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: String,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    result: ResultsBody,
}

#[derive(Debug, Deserialize)]
struct ResultsBody {
    #[serde(default)]
    rows: Vec<Value>,
}

pub struct DuneClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DuneClient {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "x-dune-api-key",
                HeaderValue::from_str(key).context("Invalid x-dune-api-key header value")?,
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
            retry,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, AnalyticsError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalyticsError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(what, status = status.as_u16(), body = %body, "Dune API error");
            return Err(AnalyticsError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AnalyticsError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait]
impl QueryEngine for DuneClient {
    async fn execute_query(&self, query_id: u64) -> Result<String, AnalyticsError> {
        let url = format!("{}/query/{}/execute", self.base_url, query_id);
        let client = &self.client;
        let url = url.as_str();
        with_rate_limit_retry(&self.retry, "execute", move || async move {
            let response = client.post(url).body("{}").send().await?;
            let body: ExecuteResponse = Self::decode(response, "execute").await?;
            Ok(body.execution_id)
        })
        .await
    }

    async fn execution_status(&self, execution_id: &str) -> Result<ExecutionState, AnalyticsError> {
        let url = format!("{}/execution/{}/status", self.base_url, execution_id);
        let client = &self.client;
        let url = url.as_str();
        with_rate_limit_retry(&self.retry, "status", move || async move {
            let response = client.get(url).send().await?;
            let body: StatusResponse = Self::decode(response, "status").await?;
            Ok(ExecutionState::parse(&body.state))
        })
        .await
    }

    async fn execution_results(&self, execution_id: &str) -> Result<Vec<Value>, AnalyticsError> {
        let url = format!("{}/execution/{}/results", self.base_url, execution_id);
        let client = &self.client;
        let url = url.as_str();
        with_rate_limit_retry(&self.retry, "results", move || async move {
            let response = client.get(url).send().await?;
            let body: ResultsResponse = Self::decode(response, "results").await?;
            Ok(body.result.rows)
        })
        .await
    }
}
