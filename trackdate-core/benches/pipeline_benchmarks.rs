use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trackdate_core::challenge::BotChallengeDetector;
use trackdate_core::config::ResearchConfig;
use trackdate_core::evidence::{EvidenceItem, SourceType};
use trackdate_core::extract::YearExtractor;
use trackdate_core::fetch::extract_text_from_html;
use trackdate_core::score::{resolve_consensus, score_evidence};

fn bench_year_extractor(c: &mut Criterion) {
    let extractor = YearExtractor::new();

    let encyclopedia_page =
        "Song Title\nGenre: Rock\nReleased: 12 June 1985\nLabel: Example Records\n".repeat(20);
    c.bench_function("extract_encyclopedia_structured", |b| {
        b.iter(|| extractor.extract(black_box(&encyclopedia_page), SourceType::Encyclopedia))
    });

    let noisy_page = "mentioned in 1985 reviews, a 1987 reissue, and again 1985 liner notes. "
        .repeat(80);
    c.bench_function("extract_generic_frequency_vote", |b| {
        b.iter(|| extractor.extract(black_box(&noisy_page), SourceType::Unclassified))
    });
}

fn bench_scoring_and_consensus(c: &mut Criterion) {
    let evidence: Vec<EvidenceItem> = (0..50)
        .map(|i| {
            EvidenceItem::new(
                format!("https://example.com/page/{i}"),
                SourceType::Encyclopedia,
                1980 + (i % 5) as i32,
                0.9,
                "Released: 1985",
            )
        })
        .collect();
    let config = ResearchConfig::default();

    c.bench_function("score_and_resolve_50_items", |b| {
        b.iter(|| resolve_consensus(&score_evidence(black_box(&evidence)), &config))
    });
}

fn bench_challenge_detector(c: &mut Criterion) {
    let detector = BotChallengeDetector::new();
    let clean_page = "Artist - Song\nReleased: 1985\nTracklist\n1. Song (3:42)\n".repeat(50);
    let challenged_page =
        r#"<div class="cf-turnstile" data-sitekey="0x4AAAAAAADnPIDROzbs0Aaj"></div>"#;

    c.bench_function("detect_clean_page", |b| {
        b.iter(|| detector.detect(black_box(&clean_page), "https://www.discogs.com/release/1"))
    });
    c.bench_function("detect_challenged_page", |b| {
        b.iter(|| detector.detect(black_box(challenged_page), "https://www.discogs.com/release/1"))
    });
}

fn bench_html_extraction(c: &mut Criterion) {
    let html = "<div><p>Released in <b>1985</b> as a single.</p><script>x()</script></div>"
        .repeat(100);
    c.bench_function("extract_text_from_html", |b| {
        b.iter(|| extract_text_from_html(black_box(&html)))
    });
}

criterion_group!(
    benches,
    bench_year_extractor,
    bench_scoring_and_consensus,
    bench_challenge_detector,
    bench_html_extraction
);
criterion_main!(benches);
