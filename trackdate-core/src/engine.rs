//! Research engine — orchestrates the release-year pipeline.
//!
//! One long-lived [`ResearchEngine`] holds its collaborator handles (search,
//! fetch, solver, arbiter) and drives a fresh [`ResearchState`] through the
//! stage machine per call: search -> fetch -> extract -> score -> resolve,
//! with one bounded back-edge from resolve to search when the evidence is
//! thin, then a terminal answering stage that applies volume discounting and
//! the confidence clamp.
//!
//! `research()` never fails: transport problems shrink the evidence base,
//! arbiter problems fall back to the plurality result, and anything worse is
//! converted into the standard zero-confidence outcome.

use crate::arbiter::{build_arbitration_prompt, parse_verdict, Arbiter};
use crate::challenge::{BotChallengeDetector, CaptchaSolver};
use crate::config::TrackdateConfig;
use crate::cookies::CookieStore;
use crate::evidence::{EvidenceItem, SourceType};
use crate::extract::YearExtractor;
use crate::fetch::PageFetcher;
use crate::queries::QueryBuilder;
use crate::score::{resolve_consensus, score_evidence};
use crate::search::SearchProvider;
use crate::state::{ResearchStage, ResearchState, StateDelta};
use futures::stream::StreamExt;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Final result of one research call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    /// Most probable original release year; 0 if undetermined.
    pub year: i32,
    /// Final confidence in [0, 0.95].
    pub confidence: f64,
    /// Human-readable explanation of the conclusion.
    pub reasoning: String,
    /// Number of evidence items behind the answer.
    pub sources_count: usize,
    /// The full evidence trail; empty when nothing was found.
    pub evidence: Vec<EvidenceItem>,
}

impl ResearchOutcome {
    fn failure(reasoning: impl Into<String>) -> Self {
        Self {
            year: 0,
            confidence: 0.0,
            reasoning: reasoning.into(),
            sources_count: 0,
            evidence: Vec::new(),
        }
    }
}

/// Outcome of fetching one candidate URL through the challenge gate.
enum FetchOutcome {
    /// Clean page content.
    Page(String),
    /// Page dropped (unsolvable or keyless challenge).
    Dropped,
    /// Transport failure worth logging.
    Failed(String),
}

/// The research pipeline orchestrator.
pub struct ResearchEngine {
    config: TrackdateConfig,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    solver: Arc<dyn CaptchaSolver>,
    arbiter: Arc<dyn Arbiter>,
    detector: BotChallengeDetector,
    extractor: YearExtractor,
    queries: QueryBuilder,
    cookies: Mutex<CookieStore>,
    /// Start instant of the most recent research call, for pacing.
    last_call_started: Mutex<Option<Instant>>,
}

impl ResearchEngine {
    /// Construct an engine with explicit collaborator handles.
    ///
    /// The cookie store is loaded once from `cookie_dir`; a missing store is
    /// an empty one.
    pub fn new(
        config: TrackdateConfig,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        solver: Arc<dyn CaptchaSolver>,
        arbiter: Arc<dyn Arbiter>,
        cookie_dir: &Path,
    ) -> Self {
        let cookies = CookieStore::load(cookie_dir, config.cookies.ttl_secs);
        Self {
            config,
            search,
            fetcher,
            solver,
            arbiter,
            detector: BotChallengeDetector::new(),
            extractor: YearExtractor::new(),
            queries: QueryBuilder::new(),
            cookies: Mutex::new(cookies),
            last_call_started: Mutex::new(None),
        }
    }

    /// Research the original release year of an artist/title pair.
    ///
    /// Never fails: "no answer found" is the valid `{year: 0, confidence: 0}`
    /// outcome, and internal errors are converted to the same shape with a
    /// failure-describing reasoning string.
    pub async fn research(&self, artist: &str, title: &str) -> ResearchOutcome {
        self.pace().await;

        let mut state = ResearchState::new(artist, title);
        tracing::info!(run_id = %state.run_id, artist, title, "starting research run");

        let run = AssertUnwindSafe(self.run_pipeline(&mut state)).catch_unwind();
        if run.await.is_err() {
            tracing::error!(artist, title, "research pipeline aborted unexpectedly");
            return ResearchOutcome::failure(
                "Internal error: research pipeline aborted unexpectedly",
            );
        }

        tracing::info!(
            run_id = %state.run_id,
            year = state.final_year,
            confidence = state.confidence,
            evidence = state.evidence.len(),
            retries = state.retry_count,
            "research run complete"
        );

        ResearchOutcome {
            year: state.final_year,
            confidence: state.confidence,
            reasoning: state.reasoning,
            sources_count: state.scored_evidence.len(),
            evidence: state.evidence,
        }
    }

    /// Enforce the minimum delay between the starts of consecutive calls.
    ///
    /// The lock is held across the sleep, so concurrent callers serialize
    /// through this single queue — the read-then-write of the shared
    /// timestamp stays atomic.
    async fn pace(&self) {
        let mut last = self.last_call_started.lock().await;
        if let Some(prev) = *last {
            let min = Duration::from_millis(self.config.research.min_call_interval_ms);
            let elapsed = prev.elapsed();
            if elapsed < min {
                tokio::time::sleep(min - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Drive the stage machine to completion.
    async fn run_pipeline(&self, state: &mut ResearchState) {
        let mut stage = ResearchStage::Searching;
        loop {
            tracing::debug!(stage = %stage, "entering stage");
            stage = match stage {
                ResearchStage::Searching => {
                    let delta = self.search_stage(state).await;
                    state.merge(delta);
                    ResearchStage::Fetching
                }
                ResearchStage::Fetching => {
                    let delta = self.fetch_stage(state).await;
                    state.merge(delta);
                    ResearchStage::Extracting
                }
                ResearchStage::Extracting => {
                    let delta = self.extract_stage(state);
                    state.merge(delta);
                    ResearchStage::Scoring
                }
                ResearchStage::Scoring => {
                    let delta = StateDelta {
                        scored_evidence: Some(score_evidence(&state.evidence)),
                        ..Default::default()
                    };
                    state.merge(delta);
                    ResearchStage::Resolving
                }
                ResearchStage::Resolving => {
                    let consensus =
                        resolve_consensus(&state.scored_evidence, &self.config.research);
                    state.merge(StateDelta {
                        candidate_years: Some(consensus.candidate_years.clone()),
                        ..Default::default()
                    });
                    if self.should_retry(state, consensus.confidence) {
                        ResearchStage::Retrying
                    } else {
                        ResearchStage::Answering
                    }
                }
                ResearchStage::Retrying => {
                    tracing::debug!(retry = state.retry_count + 1, "broadening search");
                    state.merge(StateDelta {
                        retry_increment: 1,
                        ..Default::default()
                    });
                    ResearchStage::Searching
                }
                ResearchStage::Answering => {
                    let delta = self.answer_stage(state).await;
                    state.merge(delta);
                    ResearchStage::Done
                }
                ResearchStage::Done => break,
            };
        }
    }

    /// Retry iff confidence is low AND the evidence base is thin AND the
    /// retry budget remains.
    fn should_retry(&self, state: &ResearchState, confidence: f64) -> bool {
        let research = &self.config.research;
        confidence < research.min_confidence
            && state.scored_evidence.len() < research.min_evidence
            && state.retry_count < research.max_retries
    }

    /// Run the current pass's queries and collect candidate URLs.
    async fn search_stage(&self, state: &ResearchState) -> StateDelta {
        let queries = self.queries.queries_for_pass(
            &state.artist,
            &state.title,
            state.retry_count,
            &state.search_queries,
        );

        let mut delta = StateDelta {
            search_queries: queries.clone(),
            ..Default::default()
        };

        for query in &queries {
            match self.search.search(query).await {
                Ok(hits) => {
                    for hit in hits {
                        if hit.url.starts_with("http://") || hit.url.starts_with("https://") {
                            delta.urls_to_fetch.push(hit.url);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "search failed");
                    delta.errors.push(format!("search '{query}' failed: {e}"));
                }
            }
        }

        delta
    }

    /// Fetch unvisited candidate URLs with bounded parallelism and an
    /// overall stage timeout. Timeout keeps whatever landed; nothing fails.
    async fn fetch_stage(&self, state: &ResearchState) -> StateDelta {
        let urls: Vec<String> = state
            .unfetched_urls()
            .into_iter()
            .take(self.config.fetch.max_urls_per_cycle)
            .collect();
        if urls.is_empty() {
            return StateDelta::default();
        }

        let results: std::sync::Mutex<Vec<(String, FetchOutcome)>> =
            std::sync::Mutex::new(Vec::new());
        let results_ref = &results;

        let work = futures::stream::iter(urls)
            .map(|url| async move {
                let outcome = self.fetch_one(&url).await;
                results_ref
                    .lock()
                    .expect("fetch results lock")
                    .push((url, outcome));
            })
            .buffer_unordered(self.config.fetch.fetch_concurrency)
            .for_each(|()| futures::future::ready(()));

        let stage_budget = Duration::from_secs(self.config.fetch.fetch_stage_timeout_secs);
        if tokio::time::timeout(stage_budget, work).await.is_err() {
            tracing::warn!(
                budget_secs = self.config.fetch.fetch_stage_timeout_secs,
                "fetch stage timed out; keeping partial results"
            );
        }

        let mut delta = StateDelta::default();
        for (url, outcome) in results.into_inner().expect("fetch results lock") {
            match outcome {
                FetchOutcome::Page(content) => {
                    delta.fetched_pages.insert(url, content);
                }
                FetchOutcome::Dropped => {
                    tracing::debug!(url = %url, "page dropped by challenge gate");
                }
                FetchOutcome::Failed(message) => {
                    delta.errors.push(format!("fetch {url} failed: {message}"));
                }
            }
        }

        // Cookies earned this batch are persisted best-effort.
        if self.config.cookies.enabled {
            let store = self.cookies.lock().await;
            if let Err(e) = store.save() {
                tracing::warn!(error = %e, "cookie store save failed");
            }
        }

        delta
    }

    /// Fetch one URL through the challenge gate.
    async fn fetch_one(&self, url: &str) -> FetchOutcome {
        let domain = host_of(url);
        let cookie_header = match &domain {
            Some(d) => self.cookies.lock().await.cookies_for(d),
            None => None,
        };

        let page = match self.fetcher.fetch(url, cookie_header.as_deref()).await {
            Ok(page) => page,
            Err(e) => return FetchOutcome::Failed(e.to_string()),
        };
        if let Some(d) = &domain {
            self.cookies.lock().await.record(d, &page.set_cookies);
        }

        let detection = match self.detector.detect(&page.content, url) {
            None => return FetchOutcome::Page(page.content),
            Some(d) => d,
        };

        let Some(site_key) = detection.site_key else {
            tracing::debug!(url = %url, kind = %detection.kind, "challenge without site key");
            return FetchOutcome::Dropped;
        };

        let solve = match self.solver.solve(url, detection.kind, &site_key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "challenge solve failed");
                return FetchOutcome::Dropped;
            }
        };
        let token = match (solve.success, solve.token) {
            (true, Some(token)) => token,
            _ => return FetchOutcome::Dropped,
        };

        // Re-submit the clearance token and confirm the challenge is gone
        // before accepting the page.
        let retried = match self
            .fetcher
            .fetch_with_clearance(url, cookie_header.as_deref(), &token)
            .await
        {
            Ok(page) => page,
            Err(e) => return FetchOutcome::Failed(e.to_string()),
        };
        if let Some(d) = &domain {
            let mut store = self.cookies.lock().await;
            store.record(d, &retried.set_cookies);
            store.record(d, &[format!("cf_clearance={token}")]);
        }

        if self.detector.detect(&retried.content, url).is_some() {
            tracing::debug!(url = %url, "challenge persisted after solve");
            return FetchOutcome::Dropped;
        }
        FetchOutcome::Page(retried.content)
    }

    /// Extract year claims from pages that have none yet.
    fn extract_stage(&self, state: &ResearchState) -> StateDelta {
        let mut delta = StateDelta::default();
        for (url, content) in &state.fetched_pages {
            if state.evidence.iter().any(|e| &e.source == url) {
                continue;
            }
            let source_type = SourceType::classify(url);
            let extraction = self.extractor.extract(content, source_type);
            if extraction.found() {
                delta.evidence.push(EvidenceItem::new(
                    url.clone(),
                    source_type,
                    extraction.year,
                    extraction.confidence,
                    extraction.snippet,
                ));
            }
        }
        delta
    }

    /// Terminal stage: arbitrate if ambiguous, discount for volume, clamp,
    /// and produce the reasoning string.
    async fn answer_stage(&self, state: &ResearchState) -> StateDelta {
        if state.scored_evidence.is_empty() {
            return StateDelta {
                final_year: Some(0),
                confidence: Some(0.0),
                reasoning: Some("No reliable evidence found".to_string()),
                ..Default::default()
            };
        }

        let consensus = resolve_consensus(&state.scored_evidence, &self.config.research);

        let mut year = consensus.leading_year();
        let mut confidence = consensus.confidence;
        let mut arbitration_note: Option<String> = None;
        let mut errors = Vec::new();

        if consensus.ambiguous {
            tracing::debug!(
                variance = consensus.year_variance,
                confidence,
                "escalating to arbitration"
            );
            let prompt =
                build_arbitration_prompt(&state.artist, &state.title, &state.scored_evidence);
            match self.arbiter.invoke(&prompt).await {
                Ok(output) => {
                    let verdict = parse_verdict(&output);
                    if verdict.usable() {
                        year = verdict.year;
                        confidence = verdict.confidence;
                        arbitration_note = Some(verdict.reasoning);
                    } else {
                        tracing::warn!("arbiter output unusable; keeping plurality result");
                        errors.push("arbiter output unusable".to_string());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "arbiter failed; keeping plurality result");
                    errors.push(format!("arbiter failed: {e}"));
                }
            }
        }

        let confidence =
            (confidence * volume_factor(state.scored_evidence.len())).clamp(0.0, 0.95);
        let reasoning = build_reasoning(
            year,
            confidence,
            &state.scored_evidence,
            arbitration_note.as_deref(),
        );

        StateDelta {
            final_year: Some(year),
            confidence: Some(confidence),
            reasoning: Some(reasoning),
            candidate_years: Some(consensus.candidate_years),
            errors,
            ..Default::default()
        }
    }
}

/// Volume adjustment for the terminal confidence: a lone confident source
/// is discounted, a broad base earns a capped boost.
fn volume_factor(evidence_count: usize) -> f64 {
    if evidence_count < 2 {
        0.5
    } else if evidence_count < 4 {
        0.8
    } else if evidence_count > 6 {
        1.1
    } else {
        1.0
    }
}

/// Human-readable conclusion naming the year, the corroborating source
/// count, and up to three supporting snippets.
fn build_reasoning(
    year: i32,
    confidence: f64,
    scored: &[crate::score::ScoredEvidence],
    arbitration_note: Option<&str>,
) -> String {
    let supporting: Vec<&crate::score::ScoredEvidence> =
        scored.iter().filter(|s| s.item.year == year).collect();

    let mut reasoning = format!(
        "Concluded {year} from {} corroborating source{} (confidence {confidence:.2}).",
        supporting.len(),
        if supporting.len() == 1 { "" } else { "s" },
    );
    if let Some(note) = arbitration_note {
        if !note.is_empty() {
            reasoning.push_str(&format!(" Arbitration: {note}."));
        }
    }
    let snippets: Vec<String> = supporting
        .iter()
        .take(3)
        .map(|s| {
            let truncated: String = s.item.snippet.chars().take(50).collect();
            format!("\"{truncated}\"")
        })
        .collect();
    if !snippets.is_empty() {
        reasoning.push_str(&format!(" Supporting: {}.", snippets.join("; ")));
    }
    reasoning
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
}
