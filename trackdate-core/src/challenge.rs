//! Bot-challenge detection and the solver collaborator boundary.
//!
//! [`BotChallengeDetector::detect`] is a prioritized classifier, not a single
//! regex: provider phrases tied to the fetch domain are checked first, then
//! structured widget markers for the four known challenge families, then a
//! generic human-verification phrase fallback. The generic fallback is
//! suppressed when the page also carries genuine article-content markers —
//! an encyclopedia page that mentions edit protection is not a challenge
//! interstitial.
//!
//! Pages whose challenge cannot be solved are dropped from the run, never
//! escalated into a pipeline failure.

use crate::error::ChallengeError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

/// Family of a detected challenge widget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Site-key-based checkbox/image widget.
    RecaptchaV2,
    /// Script-invoked token flow, no user interaction.
    RecaptchaV3,
    /// Interactive puzzle widget.
    HCaptcha,
    /// Managed-challenge widget.
    Turnstile,
    /// Phrase-only detection with no recognizable widget.
    Generic,
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChallengeKind::RecaptchaV2 => "recaptcha_v2",
            ChallengeKind::RecaptchaV3 => "recaptcha_v3",
            ChallengeKind::HCaptcha => "hcaptcha",
            ChallengeKind::Turnstile => "turnstile",
            ChallengeKind::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

/// A challenge found in fetched content.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeDetection {
    pub kind: ChallengeKind,
    /// Extracted site key, when the widget embeds one.
    pub site_key: Option<String>,
}

static SITE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-sitekey=["']([0-9A-Za-z_-]{10,})["']"#).expect("sitekey regex compiles")
});

static RECAPTCHA_RENDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"recaptcha/api\.js\?render=([0-9A-Za-z_-]{10,})").expect("render regex compiles")
});

static GRECAPTCHA_EXECUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"grecaptcha\.execute\(\s*["']([0-9A-Za-z_-]{10,})["']"#)
        .expect("execute regex compiles")
});

/// Challenge phrases known to appear on specific fetch domains, checked
/// before any widget scan.
const DOMAIN_PHRASES: &[(&str, &str, ChallengeKind)] = &[
    ("discogs.com", "you have been blocked", ChallengeKind::Turnstile),
    ("discogs.com", "checking your browser", ChallengeKind::Turnstile),
    ("genius.com", "detected unusual activity", ChallengeKind::RecaptchaV2),
    ("allmusic.com", "pardon our interruption", ChallengeKind::RecaptchaV2),
    (
        "rateyourmusic.com",
        "enable javascript and cookies to continue",
        ChallengeKind::Turnstile,
    ),
];

/// Phrases that indicate a verification interstitial when nothing more
/// specific matched.
const GENERIC_PHRASES: &[&str] = &[
    "verify you are human",
    "verify that you are human",
    "are you a robot",
    "human verification",
    "unusual traffic from your",
];

/// Markers of genuine article content. A page showing any of these is a real
/// page that merely mentions verification, not a challenge interstitial.
const CONTENT_MARKERS: &[&str] = &[
    "tracklist",
    "discography",
    "release date",
    "lyrics",
    "references",
    "from wikipedia",
];

/// Classifies fetched content as challenged or clean.
pub struct BotChallengeDetector;

impl BotChallengeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Inspect fetched content for a bot challenge.
    ///
    /// Returns `None` when the page looks like genuine content.
    pub fn detect(&self, content: &str, url: &str) -> Option<ChallengeDetection> {
        let lower = content.to_lowercase();
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();

        // (a) provider phrases tied to the fetch domain
        for (domain, phrase, kind) in DOMAIN_PHRASES {
            let domain_match = host == *domain || host.ends_with(&format!(".{domain}"));
            if domain_match && lower.contains(phrase) {
                return Some(ChallengeDetection {
                    kind: *kind,
                    site_key: extract_site_key(content, *kind),
                });
            }
        }

        // (b) structured widget markers, most specific family first
        if lower.contains("cf-turnstile") || lower.contains("challenges.cloudflare.com/turnstile") {
            return Some(ChallengeDetection {
                kind: ChallengeKind::Turnstile,
                site_key: extract_site_key(content, ChallengeKind::Turnstile),
            });
        }
        if lower.contains("h-captcha") || lower.contains("hcaptcha.com/1/api.js") {
            return Some(ChallengeDetection {
                kind: ChallengeKind::HCaptcha,
                site_key: extract_site_key(content, ChallengeKind::HCaptcha),
            });
        }
        if RECAPTCHA_RENDER_RE.is_match(content) || GRECAPTCHA_EXECUTE_RE.is_match(content) {
            return Some(ChallengeDetection {
                kind: ChallengeKind::RecaptchaV3,
                site_key: extract_site_key(content, ChallengeKind::RecaptchaV3),
            });
        }
        if lower.contains("g-recaptcha") || lower.contains("google.com/recaptcha/api.js") {
            return Some(ChallengeDetection {
                kind: ChallengeKind::RecaptchaV2,
                site_key: extract_site_key(content, ChallengeKind::RecaptchaV2),
            });
        }

        // (c) generic phrase fallback, suppressed on pages with real content
        let has_content = CONTENT_MARKERS.iter().any(|m| lower.contains(m));
        if !has_content && GENERIC_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(ChallengeDetection {
                kind: ChallengeKind::Generic,
                site_key: None,
            });
        }

        None
    }
}

impl Default for BotChallengeDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_site_key(content: &str, kind: ChallengeKind) -> Option<String> {
    if kind == ChallengeKind::RecaptchaV3 {
        if let Some(caps) = RECAPTCHA_RENDER_RE
            .captures(content)
            .or_else(|| GRECAPTCHA_EXECUTE_RE.captures(content))
        {
            return Some(caps[1].to_string());
        }
    }
    SITE_KEY_RE.captures(content).map(|caps| caps[1].to_string())
}

/// Result of a solve attempt.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub success: bool,
    /// Clearance token to re-submit into the page context.
    pub token: Option<String>,
}

/// External CAPTCHA-solving collaborator.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Attempt to solve a challenge. Implementations own their retry and
    /// timeout semantics; the pipeline calls this once per challenged page.
    async fn solve(
        &self,
        url: &str,
        kind: ChallengeKind,
        site_key: &str,
    ) -> Result<SolveOutcome, ChallengeError>;
}

/// Solver used when no solving service is configured. Always fails, which
/// the pipeline treats as "drop the page."
pub struct UnconfiguredSolver;

#[async_trait]
impl CaptchaSolver for UnconfiguredSolver {
    async fn solve(
        &self,
        url: &str,
        kind: ChallengeKind,
        _site_key: &str,
    ) -> Result<SolveOutcome, ChallengeError> {
        Err(ChallengeError::SolverUnavailable {
            kind: kind.to_string(),
            url: url.to_string(),
        })
    }
}
