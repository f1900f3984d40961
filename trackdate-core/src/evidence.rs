//! Evidence records and source provenance.
//!
//! An [`EvidenceItem`] is one claim about a release year together with where
//! it came from. [`SourceType`] classifies the provenance of a fetched page
//! and carries the static reliability table used by the scorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Provenance category of a fetched page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Encyclopedia-style page with a structured info panel (e.g. Wikipedia).
    Encyclopedia,
    /// Discography database with dedicated year fields (Discogs, MusicBrainz, 45cat).
    DiscographyDb,
    /// Critic/metadata database with labeled release dates (AllMusic).
    CriticDb,
    /// Community review aggregator (Rate Your Music, BestEverAlbums).
    ReviewAggregator,
    /// Editorial review site (Pitchfork, Rolling Stone).
    ReviewSite,
    /// Lyrics/annotation site with a metadata block (Genius, Songfacts).
    LyricsSite,
    /// Streaming service metadata page (Spotify, Apple Music).
    StreamingMetadata,
    /// Anything else.
    Unclassified,
}

impl SourceType {
    /// Trust weight applied to this category's evidence before consensus.
    ///
    /// These are tuned constants, not derived values. Keep in sync with the
    /// table in the project documentation when adjusting.
    pub fn reliability_weight(self) -> f64 {
        match self {
            SourceType::Encyclopedia => 0.9,
            SourceType::DiscographyDb => 0.85,
            SourceType::CriticDb => 0.85,
            SourceType::ReviewAggregator => 0.8,
            SourceType::ReviewSite => 0.75,
            SourceType::LyricsSite => 0.5,
            SourceType::StreamingMetadata => 0.6,
            SourceType::Unclassified => 0.4,
        }
    }

    /// Classify a page URL into a provenance category by its host.
    ///
    /// Unparseable URLs and unknown hosts land in `Unclassified`.
    pub fn classify(url: &str) -> SourceType {
        let host = match Url::parse(url) {
            Ok(u) => u.host_str().unwrap_or("").to_lowercase(),
            Err(_) => return SourceType::Unclassified,
        };

        let matches_domain = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if matches_domain("wikipedia.org") {
            SourceType::Encyclopedia
        } else if matches_domain("discogs.com")
            || matches_domain("musicbrainz.org")
            || matches_domain("45cat.com")
            || matches_domain("45worlds.com")
        {
            SourceType::DiscographyDb
        } else if matches_domain("allmusic.com") {
            SourceType::CriticDb
        } else if matches_domain("rateyourmusic.com") || matches_domain("besteveralbums.com") {
            SourceType::ReviewAggregator
        } else if matches_domain("pitchfork.com") || matches_domain("rollingstone.com") {
            SourceType::ReviewSite
        } else if matches_domain("genius.com") || matches_domain("songfacts.com") {
            SourceType::LyricsSite
        } else if matches_domain("spotify.com") || matches_domain("music.apple.com") {
            SourceType::StreamingMetadata
        } else {
            SourceType::Unclassified
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceType::Encyclopedia => "encyclopedia",
            SourceType::DiscographyDb => "discography_db",
            SourceType::CriticDb => "critic_db",
            SourceType::ReviewAggregator => "review_aggregator",
            SourceType::ReviewSite => "review_site",
            SourceType::LyricsSite => "lyrics_site",
            SourceType::StreamingMetadata => "streaming_metadata",
            SourceType::Unclassified => "unclassified",
        };
        write!(f, "{name}")
    }
}

/// One claim about a release year, with provenance.
///
/// `year` is never 0 for a real claim; 0 is reserved by the extractor for
/// "no year found" and such items are filtered out before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Page URL the claim came from.
    pub source: String,
    /// Provenance category of the page.
    pub source_type: SourceType,
    /// Claimed release year.
    pub year: i32,
    /// Extraction-local confidence in [0, 1], before reliability weighting.
    pub confidence: f64,
    /// Short excerpt supporting the claim.
    pub snippet: String,
    /// When the page was retrieved.
    pub fetched_at: DateTime<Utc>,
}

impl EvidenceItem {
    /// Build an evidence item for a page fetched just now.
    pub fn new(
        source: impl Into<String>,
        source_type: SourceType,
        year: i32,
        confidence: f64,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_type,
            year,
            confidence,
            snippet: snippet.into(),
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_hosts() {
        assert_eq!(
            SourceType::classify("https://en.wikipedia.org/wiki/Song"),
            SourceType::Encyclopedia
        );
        assert_eq!(
            SourceType::classify("https://www.discogs.com/release/12345"),
            SourceType::DiscographyDb
        );
        assert_eq!(
            SourceType::classify("https://musicbrainz.org/recording/abc"),
            SourceType::DiscographyDb
        );
        assert_eq!(
            SourceType::classify("https://www.allmusic.com/song/x"),
            SourceType::CriticDb
        );
        assert_eq!(
            SourceType::classify("https://rateyourmusic.com/release/single/a/b"),
            SourceType::ReviewAggregator
        );
        assert_eq!(
            SourceType::classify("https://pitchfork.com/reviews/albums/x"),
            SourceType::ReviewSite
        );
        assert_eq!(
            SourceType::classify("https://genius.com/Artist-song-lyrics"),
            SourceType::LyricsSite
        );
        assert_eq!(
            SourceType::classify("https://open.spotify.com/track/abc"),
            SourceType::StreamingMetadata
        );
    }

    #[test]
    fn test_classify_unknown_host() {
        assert_eq!(
            SourceType::classify("https://random-blog.example.net/post"),
            SourceType::Unclassified
        );
    }

    #[test]
    fn test_classify_invalid_url() {
        assert_eq!(SourceType::classify("not a url"), SourceType::Unclassified);
    }

    #[test]
    fn test_classify_does_not_match_substring_hosts() {
        // A lookalike host must not inherit the real site's trust weight.
        assert_eq!(
            SourceType::classify("https://fakewikipedia.org/wiki/Song"),
            SourceType::Unclassified
        );
    }

    #[test]
    fn test_reliability_table_ordering() {
        // Encyclopedia is the most trusted category; unclassified the least.
        assert!(
            SourceType::Encyclopedia.reliability_weight()
                > SourceType::LyricsSite.reliability_weight()
        );
        assert!(
            SourceType::LyricsSite.reliability_weight()
                > SourceType::Unclassified.reliability_weight()
        );
        assert_eq!(SourceType::Unclassified.reliability_weight(), 0.4);
    }

    #[test]
    fn test_evidence_serde_roundtrip() {
        let item = EvidenceItem::new(
            "https://en.wikipedia.org/wiki/Song",
            SourceType::Encyclopedia,
            1985,
            0.9,
            "Released: 1985",
        );
        let json = serde_json::to_string(&item).unwrap();
        let back: EvidenceItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.year, 1985);
        assert_eq!(back.source_type, SourceType::Encyclopedia);
        assert!(json.contains("\"encyclopedia\""));
    }
}
