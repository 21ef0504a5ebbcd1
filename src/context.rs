// src/context.rs - Best-effort web context enrichment
// Fetches a short search-snippet blob for the query. Strictly optional:
// any failure, missing key or timeout degrades to an empty string and the
// request proceeds without context.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Context seam for the verifier. `fetch` is infallible by contract.
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    async fn fetch(&self, query: &str) -> String;
}

/// Disabled context source. Used when no search key is configured.
pub struct NoContext;

#[async_trait]
impl ContextFetcher for NoContext {
    async fn fetch(&self, _query: &str) -> String {
        String::new()
    }
}

/// Serper search-API context source.
pub struct SerperContext {
    client: reqwest::Client,
    api_key: String,
    max_results: usize,
}

impl SerperContext {
    const ENDPOINT: &'static str = "https://google.serper.dev/search";

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: api_key.into(),
            max_results: 5,
        }
    }

    async fn search(&self, query: &str) -> Result<String, reqwest::Error> {
        let payload = serde_json::json!({
            "q": query,
            "num": self.max_results,
            "gl": "us",
            "hl": "en",
        });

        let response = self
            .client
            .post(Self::ENDPOINT)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let data: serde_json::Value = response.json().await?;

        let snippets: Vec<&str> = data["organic"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| r["snippet"].as_str())
                    .filter(|s| !s.is_empty())
                    .take(self.max_results)
                    .collect()
            })
            .unwrap_or_default();

        if snippets.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(
                "Web context (Serper search):\n{}",
                snippets.join("\n")
            ))
        }
    }
}

#[async_trait]
impl ContextFetcher for SerperContext {
    async fn fetch(&self, query: &str) -> String {
        match self.search(query).await {
            Ok(context) => {
                debug!(chars = context.len(), "web context fetched");
                context
            }
            Err(e) => {
                warn!("web context fetch failed, proceeding without: {}", e);
                String::new()
            }
        }
    }
}
