//! Error types for the trackdate research core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering search, fetch, challenge handling, arbitration, and configuration.
//!
//! Most pipeline failures are deliberately *not* surfaced through these types:
//! transport problems are logged into `ResearchState::errors` and the run
//! continues with whatever succeeded. These enums exist for the places where a
//! caller genuinely needs a structured error (collaborator implementations,
//! config loading, cookie persistence).

use std::path::PathBuf;

/// Top-level error type for the trackdate core library.
#[derive(Debug, thiserror::Error)]
pub enum TrackdateError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("Arbiter error: {0}")]
    Arbiter(#[from] ArbiterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the web search collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Search timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the page fetch collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Fetch of {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Fetch of {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
}

/// Errors from challenge detection and solving.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("No solver configured for {kind} challenge at {url}")]
    SolverUnavailable { kind: String, url: String },

    #[error("Challenge at {url} has no extractable site key")]
    MissingSiteKey { url: String },

    #[error("Solver rejected {kind} challenge at {url}: {message}")]
    SolveFailed {
        kind: String,
        url: String,
        message: String,
    },
}

/// Errors from the LLM arbiter collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("Arbiter request failed: {message}")]
    Request { message: String },

    #[error("Arbiter authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Arbiter returned unparseable output: {message}")]
    ResponseParse { message: String },

    #[error("Arbiter timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `TrackdateError`.
pub type Result<T> = std::result::Result<T, TrackdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_search() {
        let err = TrackdateError::Search(SearchError::Request {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "Search error: Search request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_fetch() {
        let err = TrackdateError::Fetch(FetchError::Status {
            url: "https://example.com/a".into(),
            status: 403,
        });
        assert_eq!(err.to_string(), "Fetch error: HTTP 403 for https://example.com/a");
    }

    #[test]
    fn test_error_display_challenge() {
        let err = TrackdateError::Challenge(ChallengeError::MissingSiteKey {
            url: "https://example.com".into(),
        });
        assert_eq!(
            err.to_string(),
            "Challenge error: Challenge at https://example.com has no extractable site key"
        );
    }

    #[test]
    fn test_error_display_arbiter() {
        let err = TrackdateError::Arbiter(ArbiterError::ResponseParse {
            message: "expected JSON object".into(),
        });
        assert_eq!(
            err.to_string(),
            "Arbiter error: Arbiter returned unparseable output: expected JSON object"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = TrackdateError::Config(ConfigError::EnvVarMissing {
            var: "TRACKDATE_ARBITER_API_KEY".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Environment variable not set: TRACKDATE_ARBITER_API_KEY"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrackdateError = io_err.into();
        assert!(matches!(err, TrackdateError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TrackdateError = serde_err.into();
        assert!(matches!(err, TrackdateError::Serialization(_)));
    }

    #[test]
    fn test_fetch_error_timeout_display() {
        let err = FetchError::Timeout {
            url: "https://slow.example".into(),
            timeout_secs: 20,
        };
        assert_eq!(
            err.to_string(),
            "Fetch of https://slow.example timed out after 20s"
        );
    }
}
