//! Reliability-weighted scoring and consensus resolution.
//!
//! Both functions here are pure: for a fixed evidence list they always
//! produce the same scored list, candidate table, and confidence. All
//! randomness-free, all I/O-free.

use crate::config::ResearchConfig;
use crate::evidence::EvidenceItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An evidence item with its reliability-weighted confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEvidence {
    pub item: EvidenceItem,
    /// Extraction confidence × source reliability weight.
    pub weighted_confidence: f64,
}

/// Apply the source reliability table to raw evidence.
///
/// Items with `year == 0` (extractor found nothing) are dropped. Output is
/// sorted descending by weighted confidence; the ordering feeds reasoning
/// generation, not the consensus math.
pub fn score_evidence(evidence: &[EvidenceItem]) -> Vec<ScoredEvidence> {
    let mut scored: Vec<ScoredEvidence> = evidence
        .iter()
        .filter(|e| e.year != 0)
        .map(|e| ScoredEvidence {
            item: e.clone(),
            weighted_confidence: e.confidence * e.source_type.reliability_weight(),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.weighted_confidence
            .partial_cmp(&a.weighted_confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Aggregated view of the scored evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    /// Aggregate weighted score per candidate year.
    pub candidate_years: BTreeMap<i32, f64>,
    /// Plurality share: leading year's score over the total score. A share
    /// of evidential weight, not a probability.
    pub confidence: f64,
    /// Population variance of the distinct candidate years, unweighted —
    /// spread of claims, not spread weighted by trust.
    pub year_variance: f64,
    /// Whether the spread calls for arbitration before the result is
    /// accepted.
    pub ambiguous: bool,
}

impl Consensus {
    /// The leading year, or 0 when there is no evidence.
    pub fn leading_year(&self) -> i32 {
        self.candidate_years
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(year, _)| *year)
            .unwrap_or(0)
    }
}

/// Group weighted confidences by year and compute the consensus metrics.
///
/// The result is ambiguous iff the candidate years are dispersed
/// (variance above threshold), enough evidence exists to call that
/// dispersion real, and no year holds a clear plurality.
pub fn resolve_consensus(scored: &[ScoredEvidence], config: &ResearchConfig) -> Consensus {
    let mut candidate_years: BTreeMap<i32, f64> = BTreeMap::new();
    for s in scored {
        *candidate_years.entry(s.item.year).or_insert(0.0) += s.weighted_confidence;
    }

    let total: f64 = candidate_years.values().sum();
    let max: f64 = candidate_years.values().copied().fold(0.0, f64::max);
    let confidence = if total > 0.0 { max / total } else { 0.0 };

    let year_variance = population_variance(candidate_years.keys().copied());

    let ambiguous = year_variance > config.variance_threshold
        && scored.len() >= config.min_evidence
        && confidence < config.ambiguity_confidence;

    Consensus {
        candidate_years,
        confidence,
        year_variance,
        ambiguous,
    }
}

/// Population variance over a set of years.
fn population_variance(years: impl Iterator<Item = i32>) -> f64 {
    let values: Vec<f64> = years.map(f64::from).collect();
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::SourceType;

    fn item(source_type: SourceType, year: i32, confidence: f64) -> EvidenceItem {
        EvidenceItem::new("https://example.com/page", source_type, year, confidence, "snippet")
    }

    #[test]
    fn test_weighting_applies_reliability_table() {
        let scored = score_evidence(&[item(SourceType::Encyclopedia, 1985, 0.9)]);
        assert_eq!(scored.len(), 1);
        assert!((scored[0].weighted_confidence - 0.81).abs() < 1e-9);
    }

    #[test]
    fn test_zero_year_items_dropped() {
        let scored = score_evidence(&[
            item(SourceType::Encyclopedia, 0, 0.0),
            item(SourceType::CriticDb, 1998, 0.85),
        ]);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].item.year, 1998);
    }

    #[test]
    fn test_sorted_descending_by_weight() {
        let scored = score_evidence(&[
            item(SourceType::LyricsSite, 1990, 0.7),     // 0.35
            item(SourceType::Encyclopedia, 1990, 0.9),   // 0.81
            item(SourceType::Unclassified, 1990, 0.4),   // 0.16
        ]);
        let weights: Vec<f64> = scored.iter().map(|s| s.weighted_confidence).collect();
        assert!(weights.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(scored[0].item.source_type, SourceType::Encyclopedia);
    }

    #[test]
    fn test_unanimous_consensus() {
        let evidence: Vec<EvidenceItem> = (0..4)
            .map(|_| item(SourceType::Encyclopedia, 1985, 0.9))
            .collect();
        let scored = score_evidence(&evidence);
        let consensus = resolve_consensus(&scored, &ResearchConfig::default());

        assert_eq!(consensus.leading_year(), 1985);
        assert!((consensus.confidence - 1.0).abs() < 1e-9);
        assert_eq!(consensus.year_variance, 0.0);
        assert!(!consensus.ambiguous);
        // Aggregate is the sum of the per-item weights.
        assert!((consensus.candidate_years[&1985] - 4.0 * 0.81).abs() < 1e-9);
    }

    #[test]
    fn test_split_evidence_is_ambiguous() {
        let evidence = vec![
            item(SourceType::LyricsSite, 1965, 0.6),
            item(SourceType::Unclassified, 1998, 0.4),
            item(SourceType::StreamingMetadata, 1972, 0.6),
        ];
        let scored = score_evidence(&evidence);
        let consensus = resolve_consensus(&scored, &ResearchConfig::default());

        assert!(consensus.year_variance > 10.0);
        assert!(consensus.confidence < 0.7);
        assert!(consensus.ambiguous);
    }

    #[test]
    fn test_two_items_never_ambiguous() {
        // Dispersion with fewer than 3 items is noise, not a tie.
        let evidence = vec![
            item(SourceType::LyricsSite, 1965, 0.6),
            item(SourceType::Unclassified, 1998, 0.4),
        ];
        let scored = score_evidence(&evidence);
        let consensus = resolve_consensus(&scored, &ResearchConfig::default());
        assert!(!consensus.ambiguous);
    }

    #[test]
    fn test_confident_plurality_not_ambiguous() {
        // Wide spread but one year dominates the weight.
        let evidence = vec![
            item(SourceType::Encyclopedia, 1970, 0.9),
            item(SourceType::CriticDb, 1970, 0.85),
            item(SourceType::Unclassified, 1999, 0.4),
        ];
        let scored = score_evidence(&evidence);
        let consensus = resolve_consensus(&scored, &ResearchConfig::default());
        assert!(consensus.year_variance > 10.0);
        assert!(consensus.confidence >= 0.7);
        assert!(!consensus.ambiguous);
    }

    #[test]
    fn test_empty_evidence() {
        let consensus = resolve_consensus(&[], &ResearchConfig::default());
        assert_eq!(consensus.leading_year(), 0);
        assert_eq!(consensus.confidence, 0.0);
        assert_eq!(consensus.year_variance, 0.0);
        assert!(!consensus.ambiguous);
    }

    #[test]
    fn test_determinism() {
        let evidence = vec![
            item(SourceType::Encyclopedia, 1985, 0.9),
            item(SourceType::LyricsSite, 1987, 0.7),
            item(SourceType::Unclassified, 1985, 0.4),
        ];
        let a = resolve_consensus(&score_evidence(&evidence), &ResearchConfig::default());
        let b = resolve_consensus(&score_evidence(&evidence), &ResearchConfig::default());
        assert_eq!(a.candidate_years, b.candidate_years);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.year_variance, b.year_variance);
    }

    #[test]
    fn test_variance_of_spread_years() {
        // {1965, 1972, 1998}: mean 1978.33, population variance ≈ 204.2
        let years = [1965, 1972, 1998];
        let var = population_variance(years.into_iter());
        assert!(var > 200.0 && var < 210.0);
    }
}
