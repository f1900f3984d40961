//! Year extraction from fetched page content.
//!
//! Each provenance category exposes release-date information in a structurally
//! different place, so extraction is source-specific: encyclopedia pages get a
//! structured-field scan with a paragraph fallback, database pages get labeled
//! field scans, and unclassified pages get a frequency vote over every
//! plausible year in the visible text.
//!
//! The extractor never returns a year outside [1900, current year]; a page
//! with no plausible year yields `year = 0, confidence = 0.0` and the caller
//! filters those out before scoring.

use crate::evidence::SourceType;
use chrono::{Datelike, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Earliest release year the pipeline considers plausible.
pub const MIN_PLAUSIBLE_YEAR: i32 = 1900;

/// How much visible text the generic frequency vote inspects.
const GENERIC_SCAN_LIMIT: usize = 5000;

/// How much of an encyclopedia page the paragraph fallback inspects —
/// roughly the lead section, before reissue/anniversary chatter appears.
const LEAD_SECTION_LIMIT: usize = 1500;

static FOUR_DIGIT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("year regex compiles"));

// Label/value pairs may be split across lines by HTML-to-text reduction and
// may carry a day-of-month between label and year, so the gap is a short lazy
// any-character window rather than a same-line non-digit run.
static RELEASED_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\breleased\b.{0,60}?\b(19\d{2}|20\d{2})\b")
        .expect("released regex compiles")
});

static RELEASE_DATE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\brelease\s*date\b.{0,60}?\b(19\d{2}|20\d{2})\b")
        .expect("release date regex compiles")
});

static YEAR_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\byear\b.{0,25}?\b(19\d{2}|20\d{2})\b").expect("year field regex compiles")
});

/// Result of one extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Extracted year, or 0 when no plausible year was found.
    pub year: i32,
    /// Extraction-local confidence in [0, 1].
    pub confidence: f64,
    /// Excerpt around the match supporting the claim.
    pub snippet: String,
}

impl Extraction {
    fn none() -> Self {
        Self {
            year: 0,
            confidence: 0.0,
            snippet: String::new(),
        }
    }

    /// Whether this extraction carries a real claim.
    pub fn found(&self) -> bool {
        self.year != 0
    }
}

/// Source-aware year extractor.
pub struct YearExtractor;

impl YearExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract a release-year claim from page content.
    pub fn extract(&self, content: &str, source_type: SourceType) -> Extraction {
        let now_year = Utc::now().year();
        match source_type {
            SourceType::Encyclopedia => self.extract_encyclopedia(content, now_year),
            SourceType::DiscographyDb => {
                self.extract_labeled(content, now_year, &YEAR_FIELD_RE, 0.8)
            }
            SourceType::CriticDb => {
                self.extract_labeled(content, now_year, &RELEASE_DATE_FIELD_RE, 0.85)
            }
            SourceType::LyricsSite => {
                self.extract_labeled(content, now_year, &RELEASE_DATE_FIELD_RE, 0.7)
            }
            SourceType::ReviewAggregator
            | SourceType::ReviewSite
            | SourceType::StreamingMetadata => {
                self.extract_labeled(content, now_year, &RELEASE_DATE_FIELD_RE, 0.8)
            }
            SourceType::Unclassified => self.extract_generic(content, now_year),
        }
    }

    /// Encyclopedia pages: structured "Released" field first, then the
    /// earliest plausible year in the lead section. The original release is
    /// assumed to predate any reissue or anniversary mention.
    fn extract_encyclopedia(&self, content: &str, now_year: i32) -> Extraction {
        if let Some(caps) = RELEASED_FIELD_RE.captures(content) {
            if let Some(year) = parse_plausible(&caps[1], now_year) {
                let m = caps.get(0).expect("whole match");
                return Extraction {
                    year,
                    confidence: 0.9,
                    snippet: snippet_around(content, m.start(), m.end()),
                };
            }
        }

        let lead = truncate_chars(content, LEAD_SECTION_LIMIT);
        let mut earliest: Option<(i32, usize, usize)> = None;
        for caps in FOUR_DIGIT_YEAR_RE.captures_iter(lead) {
            let m = caps.get(0).expect("whole match");
            if let Some(year) = parse_plausible(m.as_str(), now_year) {
                if earliest.is_none_or(|(y, _, _)| year < y) {
                    earliest = Some((year, m.start(), m.end()));
                }
            }
        }
        match earliest {
            Some((year, start, end)) => Extraction {
                year,
                confidence: 0.7,
                snippet: snippet_around(lead, start, end),
            },
            None => Extraction::none(),
        }
    }

    /// Database-style pages: read the first labeled field match.
    fn extract_labeled(
        &self,
        content: &str,
        now_year: i32,
        pattern: &Regex,
        confidence: f64,
    ) -> Extraction {
        for caps in pattern.captures_iter(content) {
            if let Some(year) = parse_plausible(&caps[1], now_year) {
                let m = caps.get(0).expect("whole match");
                return Extraction {
                    year,
                    confidence,
                    snippet: snippet_around(content, m.start(), m.end()),
                };
            }
        }
        Extraction::none()
    }

    /// Unclassified pages: tally every plausible 4-digit year in the first
    /// few thousand characters and take the most frequent. A weak
    /// majority-vote-over-noise signal, fixed at 0.4 confidence.
    fn extract_generic(&self, content: &str, now_year: i32) -> Extraction {
        let scan = truncate_chars(content, GENERIC_SCAN_LIMIT);
        let mut tally: BTreeMap<i32, (usize, usize, usize)> = BTreeMap::new();
        for caps in FOUR_DIGIT_YEAR_RE.captures_iter(scan) {
            let m = caps.get(0).expect("whole match");
            if let Some(year) = parse_plausible(m.as_str(), now_year) {
                let entry = tally.entry(year).or_insert((0, m.start(), m.end()));
                entry.0 += 1;
            }
        }

        // BTreeMap iteration makes the tie-break deterministic: on equal
        // counts the earliest year wins.
        let winner = tally
            .iter()
            .max_by_key(|(_, (count, _, _))| *count)
            .map(|(year, (_, start, end))| (*year, *start, *end));

        match winner {
            Some((year, start, end)) => Extraction {
                year,
                confidence: 0.4,
                snippet: snippet_around(scan, start, end),
            },
            None => Extraction::none(),
        }
    }
}

impl Default for YearExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a 4-digit match and keep it only when inside [1900, now_year].
fn parse_plausible(text: &str, now_year: i32) -> Option<i32> {
    let year: i32 = text.parse().ok()?;
    (MIN_PLAUSIBLE_YEAR..=now_year).contains(&year).then_some(year)
}

/// Truncate to at most `limit` bytes without splitting a UTF-8 character.
fn truncate_chars(content: &str, limit: usize) -> &str {
    if content.len() <= limit {
        return content;
    }
    let mut end = limit;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// Build a short excerpt around a byte range, clamped to char boundaries
/// and collapsed to single-space whitespace.
fn snippet_around(content: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(30);
    while from > 0 && !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + 30).min(content.len());
    while to < content.len() && !content.is_char_boundary(to) {
        to += 1;
    }
    content[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}
