//! Configuration for the trackdate research pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment variables -> explicit overrides.
//!
//! Every hand-tuned pipeline constant (confidence thresholds, variance
//! threshold, retry bound, volume tiers, fetch caps) lives here with the
//! shipped value as its serde default, so deployments can adjust behavior
//! without a rebuild.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the trackdate agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackdateConfig {
    /// Consensus, retry, and arbitration thresholds.
    #[serde(default)]
    pub research: ResearchConfig,
    /// Fetch-stage transport limits.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Session cookie persistence.
    #[serde(default)]
    pub cookies: CookieConfig,
    /// LLM arbiter endpoint.
    #[serde(default)]
    pub arbiter: ArbiterConfig,
}

/// Thresholds governing consensus resolution and the retry state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Below this overall confidence a retry is considered (default: 0.6).
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Below this confidence a high-variance result is ambiguous (default: 0.7).
    #[serde(default = "default_ambiguity_confidence")]
    pub ambiguity_confidence: f64,
    /// Population variance of candidate years above which the result is
    /// considered dispersed (default: 10.0).
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,
    /// Minimum evidence items before dispersion can trigger arbitration,
    /// and the evidence volume below which a retry is considered (default: 3).
    #[serde(default = "default_min_evidence")]
    pub min_evidence: usize,
    /// Maximum structured retries per research call (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Minimum delay between the starts of consecutive research calls,
    /// in milliseconds (default: 2000). Self-imposed bot-detection hygiene.
    #[serde(default = "default_min_call_interval_ms")]
    pub min_call_interval_ms: u64,
}

fn default_min_confidence() -> f64 {
    0.6
}
fn default_ambiguity_confidence() -> f64 {
    0.7
}
fn default_variance_threshold() -> f64 {
    10.0
}
fn default_min_evidence() -> usize {
    3
}
fn default_max_retries() -> u32 {
    2
}
fn default_min_call_interval_ms() -> u64 {
    2000
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            ambiguity_confidence: default_ambiguity_confidence(),
            variance_threshold: default_variance_threshold(),
            min_evidence: default_min_evidence(),
            max_retries: default_max_retries(),
            min_call_interval_ms: default_min_call_interval_ms(),
        }
    }
}

/// Limits for the page-fetch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum candidate URLs fetched per cycle (default: 10).
    #[serde(default = "default_max_urls_per_cycle")]
    pub max_urls_per_cycle: usize,
    /// Concurrent in-flight fetches within the stage (default: 3).
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Wall-clock budget for the whole fetch stage, in seconds (default: 20).
    /// On expiry the pages fetched so far are kept; nothing fails.
    #[serde(default = "default_fetch_stage_timeout_secs")]
    pub fetch_stage_timeout_secs: u64,
    /// Per-request timeout, in seconds (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// User agent sent with fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_urls_per_cycle() -> usize {
    10
}
fn default_fetch_concurrency() -> usize {
    3
}
fn default_fetch_stage_timeout_secs() -> u64 {
    20
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_urls_per_cycle: default_max_urls_per_cycle(),
            fetch_concurrency: default_fetch_concurrency(),
            fetch_stage_timeout_secs: default_fetch_stage_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Session cookie persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Whether cookies are persisted across runs (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cookie time-to-live, in seconds (default: 7200).
    #[serde(default = "default_cookie_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_cookie_ttl_secs() -> u64 {
    7200
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cookie_ttl_secs(),
        }
    }
}

/// LLM arbiter endpoint settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Base URL of the chat-completions endpoint.
    #[serde(default = "default_arbiter_base_url")]
    pub base_url: String,
    /// Model identifier.
    #[serde(default = "default_arbiter_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_arbiter_api_key_env")]
    pub api_key_env: String,
    /// Request timeout, in seconds (default: 30).
    #[serde(default = "default_arbiter_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_arbiter_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_arbiter_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_arbiter_api_key_env() -> String {
    "TRACKDATE_ARBITER_API_KEY".to_string()
}
fn default_arbiter_timeout_secs() -> u64 {
    30
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            base_url: default_arbiter_base_url(),
            model: default_arbiter_model(),
            api_key_env: default_arbiter_api_key_env(),
            timeout_secs: default_arbiter_timeout_secs(),
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TRACKDATE_`)
/// 3. Workspace-local config (`.trackdate/config.toml`)
/// 4. User config (`~/.config/trackdate/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&TrackdateConfig>,
) -> Result<TrackdateConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(TrackdateConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "trackdate", "trackdate") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".trackdate").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (TRACKDATE_RESEARCH__MAX_RETRIES, etc.)
    figment = figment.merge(Env::prefixed("TRACKDATE_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_defaults_match_tuned_constants() {
        let c = ResearchConfig::default();
        assert_eq!(c.min_confidence, 0.6);
        assert_eq!(c.ambiguity_confidence, 0.7);
        assert_eq!(c.variance_threshold, 10.0);
        assert_eq!(c.min_evidence, 3);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.min_call_interval_ms, 2000);
    }

    #[test]
    fn test_fetch_defaults() {
        let c = FetchConfig::default();
        assert_eq!(c.max_urls_per_cycle, 10);
        assert_eq!(c.fetch_concurrency, 3);
        assert_eq!(c.fetch_stage_timeout_secs, 20);
    }

    #[test]
    fn test_cookie_defaults() {
        let c = CookieConfig::default();
        assert!(c.enabled);
        assert_eq!(c.ttl_secs, 7200);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: TrackdateConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.research.max_retries, 2);
        assert_eq!(config.fetch.fetch_concurrency, 3);
    }

    #[test]
    fn test_partial_toml_overrides_single_field() {
        let config: ResearchConfig =
            toml::from_str("max_retries = 5\n").expect("partial config parses");
        assert_eq!(config.max_retries, 5);
        // Untouched fields keep defaults
        assert_eq!(config.min_confidence, 0.6);
    }

    #[test]
    fn test_load_config_workspace_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".trackdate");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[research]\nmax_retries = 1\n[fetch]\nfetch_concurrency = 5\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.max_retries, 1);
        assert_eq!(config.fetch.fetch_concurrency, 5);
        // Unset fields come from defaults
        assert_eq!(config.research.variance_threshold, 10.0);
    }

    #[test]
    fn test_load_config_explicit_overrides_win() {
        let mut overrides = TrackdateConfig::default();
        overrides.research.max_retries = 0;
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.research.max_retries, 0);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = TrackdateConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TrackdateConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.research.variance_threshold, 10.0);
        assert_eq!(back.arbiter.api_key_env, "TRACKDATE_ARBITER_API_KEY");
    }
}
