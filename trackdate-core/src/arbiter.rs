//! LLM arbitration of ambiguous evidence.
//!
//! When consensus resolution flags a high-dispersion, low-confidence split,
//! the controller serializes the evidence into a structured prompt and asks
//! an external language model to break the tie using music-domain rules. The
//! arbiter is invoked once; its output is parsed defensively, and any parse
//! failure degrades to a zero-confidence verdict so the pipeline falls back
//! to the plurality result instead of crashing.

use crate::config::ArbiterConfig;
use crate::error::ArbiterError;
use crate::score::ScoredEvidence;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// External language-model collaborator.
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Send one prompt and return the raw model output.
    async fn invoke(&self, prompt: &str) -> Result<String, ArbiterError>;
}

/// Parsed arbiter output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArbiterVerdict {
    pub year: i32,
    pub confidence: f64,
    pub reasoning: String,
}

impl ArbiterVerdict {
    /// The verdict used when the arbiter fails or returns garbage.
    pub fn zero() -> Self {
        Self {
            year: 0,
            confidence: 0.0,
            reasoning: String::new(),
        }
    }

    /// Whether this verdict should override the plurality result.
    pub fn usable(&self) -> bool {
        self.year != 0 && self.confidence > 0.0
    }
}

/// Serialize evidence and domain tie-break rules into the arbitration prompt.
pub fn build_arbitration_prompt(
    artist: &str,
    title: &str,
    evidence: &[ScoredEvidence],
) -> String {
    let mut prompt = format!(
        "Determine the original release year of the song \"{title}\" by {artist}.\n\n\
         Conflicting evidence was collected from the web:\n"
    );
    for s in evidence {
        let snippet: String = s.item.snippet.chars().take(100).collect();
        prompt.push_str(&format!(
            "- [{}] year {} (weight {:.2}): \"{}\"\n",
            s.item.source_type, s.item.year, s.weighted_confidence, snippet
        ));
    }
    prompt.push_str(
        "\nApply these rules when the evidence disagrees:\n\
         1. For classical compositions, answer the composition year, not a recording year.\n\
         2. For TV or film theme songs, answer the show's first-air year, not a soundtrack \
         release year.\n\
         3. Prefer the original release over any reissue, remaster, or anniversary edition.\n\
         4. Prefer the earliest worldwide release over later regional variants.\n\n\
         Respond with only a JSON object: \
         {\"year\": <integer>, \"confidence\": <0.0-1.0>, \"reasoning\": \"<one sentence>\"}",
    );
    prompt
}

/// Parse arbiter output into a verdict.
///
/// Accepts a bare JSON object, a fenced code block, or JSON embedded in
/// surrounding prose. Anything unparseable, and any implausible year, yields
/// the zero verdict — never an error.
pub fn parse_verdict(output: &str) -> ArbiterVerdict {
    let embedded = extract_json_object(output).unwrap_or_default();
    let candidates = [output.trim(), embedded.as_str()];

    for candidate in candidates {
        if candidate.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            let year = value.get("year").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            let confidence = value
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            let reasoning = value
                .get("reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let now_year = Utc::now().year();
            if !(1900..=now_year).contains(&year) {
                return ArbiterVerdict::zero();
            }
            return ArbiterVerdict {
                year,
                confidence,
                reasoning,
            };
        }
    }

    ArbiterVerdict::zero()
}

/// Pull the first balanced-looking `{...}` span out of prose or a fence.
fn extract_json_object(output: &str) -> Option<String> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    (end > start).then(|| output[start..=end].to_string())
}

/// Arbiter speaking the OpenAI-compatible chat-completions wire shape.
pub struct HttpArbiter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpArbiter {
    /// Build from config, resolving the API key from the configured
    /// environment variable.
    pub fn from_config(config: &ArbiterConfig) -> Result<Self, ArbiterError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| ArbiterError::AuthFailed {
            message: format!("env var '{}' not set", config.api_key_env),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ArbiterError::Request {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Arbiter for HttpArbiter {
    async fn invoke(&self, prompt: &str) -> Result<String, ArbiterError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a music metadata expert. Answer with only the requested JSON."
                },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ArbiterError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    ArbiterError::Request {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ArbiterError::AuthFailed {
                message: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(ArbiterError::Request {
                message: format!("HTTP {status}"),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| ArbiterError::ResponseParse {
                message: e.to_string(),
            })?;

        value
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ArbiterError::ResponseParse {
                message: "response has no message content".into(),
            })
    }
}

/// Arbiter used when no endpoint is configured. Always errors, which the
/// controller converts into the zero verdict.
pub struct DisabledArbiter;

#[async_trait]
impl Arbiter for DisabledArbiter {
    async fn invoke(&self, _prompt: &str) -> Result<String, ArbiterError> {
        Err(ArbiterError::Request {
            message: "no arbiter configured".into(),
        })
    }
}

/// Scripted arbiter for tests: returns a fixed response and counts calls.
pub struct MockArbiter {
    response: String,
    calls: AtomicUsize,
}

impl MockArbiter {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `invoke` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Arbiter for MockArbiter {
    async fn invoke(&self, _prompt: &str) -> Result<String, ArbiterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}
