//! Web-search provider seam.

use std::time::Duration;

use async_trait::async_trait;
use registerscout_shared::{Result, ScoutError};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// Default Serper endpoint.
pub const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

const SEARCH_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("RegisterScout/", env!("CARGO_PKG_VERSION"));

/// One organic search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Anything that can answer a free-text web query.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Serper (Google Search)
// ---------------------------------------------------------------------------

pub struct SerperSearcher {
    api_key: String,
    endpoint: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerperSearcher {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(api_key, SERPER_ENDPOINT)
    }

    /// Point the searcher at a different endpoint (mock servers, proxies).
    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl WebSearcher for SerperSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!(query, max_results, "serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScoutError::Search(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScoutError::Search(format!("provider answered HTTP {status}")));
        }

        let data: SerperResponse = resp
            .json()
            .await
            .map_err(|e| ScoutError::Search(format!("invalid response: {e}")))?;

        let results: Vec<SearchResult> = data
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(max_results)
            .map(|r| SearchResult {
                url: r.link,
                title: r.title,
                snippet: r.snippet,
            })
            .collect();

        info!(query, count = results.len(), "serper search complete");
        Ok(results)
    }

    fn name(&self) -> &str {
        "serper"
    }
}

// ---------------------------------------------------------------------------
// Noop
// ---------------------------------------------------------------------------

/// Used when no API key is configured: every query returns nothing.
pub struct NoopSearcher;

#[async_trait]
impl WebSearcher for NoopSearcher {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}
