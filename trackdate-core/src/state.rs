//! Research working memory and the pipeline stage machine.
//!
//! A [`ResearchState`] is created fresh per `research()` call, threaded
//! through every stage, and discarded once the terminal stage emits its
//! result. Stages return a [`StateDelta`]; [`ResearchState::merge`] applies
//! it with field-specific rules — append for sequences, union for sets and
//! maps, replace for the per-cycle aggregates. Multi-valued fields are never
//! overwritten, so a retry can only grow the evidence base.

use crate::evidence::EvidenceItem;
use crate::score::ScoredEvidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Stage of the research pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStage {
    /// Generating and executing search queries.
    Searching,
    /// Retrieving candidate pages.
    Fetching,
    /// Extracting year claims from fetched pages.
    Extracting,
    /// Applying the reliability table.
    Scoring,
    /// Aggregating claims and deciding retry vs. finalize.
    Resolving,
    /// Broadening queries for another pass.
    Retrying,
    /// Producing the final answer.
    Answering,
    /// Run complete.
    Done,
}

impl std::fmt::Display for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResearchStage::Searching => "searching",
            ResearchStage::Fetching => "fetching",
            ResearchStage::Extracting => "extracting",
            ResearchStage::Scoring => "scoring",
            ResearchStage::Resolving => "resolving",
            ResearchStage::Retrying => "retrying",
            ResearchStage::Answering => "answering",
            ResearchStage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Working memory for one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Query input, immutable for the run.
    pub artist: String,
    /// Query input, immutable for the run.
    pub title: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Ordered search queries issued so far; grows each retry.
    pub search_queries: Vec<String>,
    /// Deduplicated candidate URLs discovered so far.
    pub urls_to_fetch: BTreeSet<String>,
    /// Raw content per fetched URL.
    pub fetched_pages: BTreeMap<String, String>,
    /// Raw year claims, in extraction order.
    pub evidence: Vec<EvidenceItem>,
    /// Most recent reliability-weighted evidence, sorted by weight.
    pub scored_evidence: Vec<ScoredEvidence>,
    /// Most recent aggregate score per candidate year.
    pub candidate_years: BTreeMap<i32, f64>,
    /// Terminal answer; 0 until the answering stage.
    pub final_year: i32,
    /// Terminal confidence; 0.0 until the answering stage.
    pub confidence: f64,
    /// Terminal human-readable reasoning.
    pub reasoning: String,
    /// Structured retries taken so far.
    pub retry_count: u32,
    /// Non-fatal diagnostics accumulated across stages.
    pub errors: Vec<String>,
}

impl ResearchState {
    /// Create fresh working memory for one artist/title run.
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            artist: artist.into(),
            title: title.into(),
            started_at: Utc::now(),
            search_queries: Vec::new(),
            urls_to_fetch: BTreeSet::new(),
            fetched_pages: BTreeMap::new(),
            evidence: Vec::new(),
            scored_evidence: Vec::new(),
            candidate_years: BTreeMap::new(),
            final_year: 0,
            confidence: 0.0,
            reasoning: String::new(),
            retry_count: 0,
            errors: Vec::new(),
        }
    }

    /// Apply a stage's output.
    ///
    /// Sequences append, sets and maps union, per-cycle aggregates replace
    /// when present. Nothing here can shrink a multi-valued field.
    pub fn merge(&mut self, delta: StateDelta) {
        self.search_queries.extend(delta.search_queries);
        self.urls_to_fetch.extend(delta.urls_to_fetch);
        self.fetched_pages.extend(delta.fetched_pages);
        self.evidence.extend(delta.evidence);
        if let Some(scored) = delta.scored_evidence {
            self.scored_evidence = scored;
        }
        if let Some(years) = delta.candidate_years {
            self.candidate_years = years;
        }
        if let Some(year) = delta.final_year {
            self.final_year = year;
        }
        if let Some(confidence) = delta.confidence {
            self.confidence = confidence;
        }
        if let Some(reasoning) = delta.reasoning {
            self.reasoning = reasoning;
        }
        self.retry_count += delta.retry_increment;
        self.errors.extend(delta.errors);
    }

    /// URLs discovered but not yet fetched.
    pub fn unfetched_urls(&self) -> Vec<String> {
        self.urls_to_fetch
            .iter()
            .filter(|u| !self.fetched_pages.contains_key(*u))
            .cloned()
            .collect()
    }
}

/// Partial state produced by one stage.
#[derive(Debug, Default)]
pub struct StateDelta {
    pub search_queries: Vec<String>,
    pub urls_to_fetch: Vec<String>,
    pub fetched_pages: BTreeMap<String, String>,
    pub evidence: Vec<EvidenceItem>,
    pub scored_evidence: Option<Vec<ScoredEvidence>>,
    pub candidate_years: Option<BTreeMap<i32, f64>>,
    pub final_year: Option<i32>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub retry_increment: u32,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::SourceType;

    fn evidence_item(year: i32) -> EvidenceItem {
        EvidenceItem::new(
            "https://example.com",
            SourceType::Unclassified,
            year,
            0.4,
            "snippet",
        )
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = ResearchState::new("Artist", "Title");
        assert_eq!(state.artist, "Artist");
        assert_eq!(state.final_year, 0);
        assert_eq!(state.confidence, 0.0);
        assert_eq!(state.retry_count, 0);
        assert!(state.evidence.is_empty());
    }

    #[test]
    fn test_merge_appends_sequences() {
        let mut state = ResearchState::new("A", "T");
        state.merge(StateDelta {
            search_queries: vec!["q1".into()],
            evidence: vec![evidence_item(1985)],
            ..Default::default()
        });
        state.merge(StateDelta {
            search_queries: vec!["q2".into()],
            evidence: vec![evidence_item(1986)],
            ..Default::default()
        });
        assert_eq!(state.search_queries, vec!["q1", "q2"]);
        assert_eq!(state.evidence.len(), 2);
    }

    #[test]
    fn test_merge_unions_urls_and_pages() {
        let mut state = ResearchState::new("A", "T");
        state.merge(StateDelta {
            urls_to_fetch: vec!["https://a".into(), "https://b".into()],
            fetched_pages: BTreeMap::from([("https://a".into(), "page a".into())]),
            ..Default::default()
        });
        state.merge(StateDelta {
            urls_to_fetch: vec!["https://b".into(), "https://c".into()],
            fetched_pages: BTreeMap::from([("https://b".into(), "page b".into())]),
            ..Default::default()
        });
        assert_eq!(state.urls_to_fetch.len(), 3);
        assert_eq!(state.fetched_pages.len(), 2);
        assert_eq!(state.fetched_pages["https://a"], "page a");
    }

    #[test]
    fn test_merge_replaces_cycle_aggregates() {
        let mut state = ResearchState::new("A", "T");
        state.merge(StateDelta {
            candidate_years: Some(BTreeMap::from([(1985, 0.8)])),
            ..Default::default()
        });
        state.merge(StateDelta {
            candidate_years: Some(BTreeMap::from([(1985, 1.6), (1987, 0.3)])),
            ..Default::default()
        });
        assert_eq!(state.candidate_years.len(), 2);
        assert_eq!(state.candidate_years[&1985], 1.6);
    }

    #[test]
    fn test_merge_without_aggregate_keeps_previous() {
        let mut state = ResearchState::new("A", "T");
        state.merge(StateDelta {
            candidate_years: Some(BTreeMap::from([(1985, 0.8)])),
            ..Default::default()
        });
        state.merge(StateDelta::default());
        assert_eq!(state.candidate_years[&1985], 0.8);
    }

    #[test]
    fn test_merge_never_shrinks_evidence() {
        let mut state = ResearchState::new("A", "T");
        state.merge(StateDelta {
            evidence: vec![evidence_item(1985), evidence_item(1986)],
            ..Default::default()
        });
        let before = state.evidence.len();
        state.merge(StateDelta {
            retry_increment: 1,
            ..Default::default()
        });
        assert_eq!(state.evidence.len(), before);
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn test_unfetched_urls() {
        let mut state = ResearchState::new("A", "T");
        state.merge(StateDelta {
            urls_to_fetch: vec!["https://a".into(), "https://b".into()],
            fetched_pages: BTreeMap::from([("https://a".into(), "page".into())]),
            ..Default::default()
        });
        assert_eq!(state.unfetched_urls(), vec!["https://b".to_string()]);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ResearchStage::Searching.to_string(), "searching");
        assert_eq!(ResearchStage::Answering.to_string(), "answering");
    }
}
