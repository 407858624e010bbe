//! Search Gateway.
//!
//! Contract: returns up to `top_k` deduplicated-by-URL snippets, each
//! truncated to a bounded content length; never panics on zero results.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

const MAX_SNIPPET_CHARS: usize = 600;

/// A single web search result snippet, attached inside an `ExtensionContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    /// 1-based position in the provider's (deduplicated) response order.
    pub rank: usize,
}

/// A completed search call: its deduplicated, ranked results plus how long
/// the provider took to answer.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub latency_ms: u64,
}

/// Uniform request interface to a web search provider.
#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse>;
}

/// HTTP-backed gateway to a JSON search API.
#[derive(Debug)]
pub struct HttpSearchGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct RawSearchResponse {
    results: Vec<RawSearchResult>,
}

#[derive(Deserialize)]
struct RawSearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

impl HttpSearchGateway {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchGateway for HttpSearchGateway {
    async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        let started = Instant::now();
        let mut request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("top_k", &top_k.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if response.status().as_u16() == 429 {
            return Err(EngineError::RateLimit {
                retry_after_ms: 1000,
            });
        }
        if !response.status().is_success() {
            return Err(EngineError::Backend(format!(
                "search provider returned status {}",
                response.status()
            )));
        }

        let parsed: RawSearchResponse = response.json().await.map_err(EngineError::from)?;
        let results = dedup_and_cap(
            parsed
                .results
                .into_iter()
                .map(|r| SearchResult {
                    url: r.url,
                    title: r.title,
                    content: truncate(&r.content, MAX_SNIPPET_CHARS),
                    rank: 0,
                })
                .collect(),
            top_k,
        );
        Ok(SearchResponse {
            results,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

fn dedup_and_cap(results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for result in results {
        if seen.insert(result.url.clone()) {
            deduped.push(result);
        }
        if deduped.len() >= top_k {
            break;
        }
    }
    for (i, result) in deduped.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    deduped
}

/// Deterministic in-memory gateway for tests. Results are keyed by an
/// exact-substring-of-query lookup table with an empty default, matching
/// `StubLlmGateway`'s shape.
#[derive(Debug, Default)]
pub struct StubSearchGateway {
    results: HashMap<String, Vec<SearchResult>>,
    calls: Mutex<Vec<String>>,
}

impl StubSearchGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_results(mut self, query_contains: impl Into<String>, results: Vec<SearchResult>) -> Self {
        self.results.insert(query_contains.into(), results);
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchGateway for StubSearchGateway {
    async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        self.calls.lock().unwrap().push(query.to_string());
        debug!(query, top_k, "stub search call");
        for (needle, results) in &self.results {
            if query.contains(needle.as_str()) {
                return Ok(SearchResponse {
                    results: dedup_and_cap(results.clone(), top_k),
                    latency_ms: 0,
                });
            }
        }
        Ok(SearchResponse {
            results: Vec::new(),
            latency_ms: 0,
        })
    }
}
