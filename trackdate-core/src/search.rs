//! Web search collaborator.
//!
//! The pipeline consumes search through the [`SearchProvider`] trait; the
//! bundled [`DuckDuckGoSearch`] implementation uses the DuckDuckGo instant
//! answer API (no API key required). Zero results is a valid, non-error
//! outcome everywhere.

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// External web search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query. Must return `Ok(vec![])` rather than an error when the
    /// provider simply finds nothing.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}

/// DuckDuckGo instant answer search.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(user_agent: &str) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| SearchError::Request {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_results: 10,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SearchError::Request {
                message: format!("Search request failed: {e}"),
            })?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| SearchError::ResponseParse {
                message: format!("Failed to parse search response: {e}"),
            })?;

        let mut hits = Vec::new();

        // Main abstract answer, when present.
        if let Some(abstract_url) = body.get("AbstractURL").and_then(|v| v.as_str()) {
            if !abstract_url.is_empty() {
                hits.push(SearchHit {
                    url: abstract_url.to_string(),
                    title: body
                        .get("Heading")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    snippet: body
                        .get("AbstractText")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                });
            }
        }

        // Direct results.
        if let Some(results) = body.get("Results").and_then(|v| v.as_array()) {
            for result in results {
                if hits.len() >= self.max_results {
                    break;
                }
                push_topic_hit(&mut hits, result);
            }
        }

        // Related topics (may be nested one level under "Topics").
        if let Some(topics) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            for topic in topics {
                if hits.len() >= self.max_results {
                    break;
                }
                if let Some(nested) = topic.get("Topics").and_then(|v| v.as_array()) {
                    for inner in nested {
                        if hits.len() >= self.max_results {
                            break;
                        }
                        push_topic_hit(&mut hits, inner);
                    }
                } else {
                    push_topic_hit(&mut hits, topic);
                }
            }
        }

        Ok(hits)
    }
}

fn push_topic_hit(hits: &mut Vec<SearchHit>, topic: &serde_json::Value) {
    let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
    if url.is_empty() {
        return;
    }
    let text = topic.get("Text").and_then(|v| v.as_str()).unwrap_or("");
    hits.push(SearchHit {
        url: url.to_string(),
        title: text.chars().take(80).collect(),
        snippet: text.to_string(),
    });
}
