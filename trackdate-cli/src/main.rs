//! trackdate CLI — research the original release year of a song.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use trackdate_core::{
    DisabledArbiter, DuckDuckGoSearch, HttpArbiter, HttpFetcher, ResearchEngine,
    UnconfiguredSolver,
};

/// trackdate: evidence-based release-year research for music tracks
#[derive(Parser, Debug)]
#[command(name = "trackdate", version, about, long_about = None)]
struct Cli {
    /// Artist name
    artist: String,

    /// Song title
    title: String,

    /// Workspace directory (config and cookie store live under .trackdate/)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry().with(stderr_layer).init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = trackdate_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    let search = Arc::new(
        DuckDuckGoSearch::new(&config.fetch.user_agent)
            .map_err(|e| anyhow::anyhow!("Search setup failed: {e}"))?,
    );
    let fetcher = Arc::new(
        HttpFetcher::new(&config.fetch.user_agent, config.fetch.request_timeout_secs)
            .map_err(|e| anyhow::anyhow!("Fetcher setup failed: {e}"))?,
    );
    let arbiter: Arc<dyn trackdate_core::Arbiter> = match HttpArbiter::from_config(&config.arbiter)
    {
        Ok(arbiter) => Arc::new(arbiter),
        Err(e) => {
            tracing::warn!(error = %e, "arbiter unavailable; ambiguous results will not be arbitrated");
            Arc::new(DisabledArbiter)
        }
    };

    let cookie_dir = workspace.join(".trackdate");
    let engine = ResearchEngine::new(
        config,
        search,
        fetcher,
        Arc::new(UnconfiguredSolver),
        arbiter,
        &cookie_dir,
    );

    let outcome = engine.research(&cli.artist, &cli.title).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.year == 0 {
        println!("Could not determine a release year for \"{}\" by {}.", cli.title, cli.artist);
        println!("  {}", outcome.reasoning);
    } else {
        println!(
            "{} — {} was most likely released in {} (confidence {:.0}%).",
            cli.artist,
            cli.title,
            outcome.year,
            outcome.confidence * 100.0
        );
        println!("  {}", outcome.reasoning);
        if !cli.quiet {
            for item in &outcome.evidence {
                println!(
                    "  [{}] {} -> {}",
                    item.source_type, item.source, item.year
                );
            }
        }
    }

    Ok(())
}
