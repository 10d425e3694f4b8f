//! # Tech News Digest
//!
//! A pipeline that fetches the latest articles from AI/tech newsletters and
//! blogs, summarizes them with Gemini, and assembles a daily markdown digest.
//!
//! ## Features
//!
//! - Fetches articles from configured Substack RSS feeds and scrapes ad-hoc
//!   blogs without feeds
//! - Saves each article as a markdown file with a fixed metadata header
//! - Summarizes new and previously-failed articles through the Gemini API
//!   (parallel, 4 at a time)
//! - Builds one digest per calendar date and merges later runs into it
//!   without duplicating entries
//! - Optional synthesis mode that analyzes every saved article for
//!   cross-cutting themes
//!
//! ## Usage
//!
//! ```sh
//! tech_news_digest --summarize
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Download feed items and blog posts into `articles/`
//! 2. **Selection**: Pick unprocessed and previously-failed articles from
//!    the state store
//! 3. **Summarization**: Send each article to Gemini for a bullet summary
//! 4. **Digest**: Create or update `digests/<date>-daily-digest.md`

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod config;
mod digest;
mod fetch;
mod models;
mod state;
mod summarizer;
mod synthesis;
mod utils;

use cli::Cli;
use state::StateStore;
use summarizer::Summarizer;
use synthesis::SynthesisAnalyzer;
use utils::{ensure_writable_dir, truncate_title};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("tech_news_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Missing configuration is the one fatal error class; everything after
    // this gate degrades per-source or per-article instead of aborting.
    if !Path::new(&args.feeds_config).exists() {
        error!(path = %args.feeds_config, "Feeds config file not found");
        return Err(format!("feeds config not found at {}", args.feeds_config).into());
    }
    if (args.summarize || args.synthesize) && !Path::new(&args.gemini_config).exists() {
        error!(path = %args.gemini_config, "Gemini config file not found");
        return Err(format!("gemini config not found at {}", args.gemini_config).into());
    }

    let state = StateStore::new(Path::new(&args.state_dir))?;
    if let Some(last_run) = state.last_run_time() {
        info!(%last_run, "Previous completed run found");
    }

    // Early check: ensure the articles dir is writable
    if let Err(e) = ensure_writable_dir(&args.articles_dir).await {
        error!(
            path = %args.articles_dir,
            error = %e,
            "Articles directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let articles_dir = Path::new(&args.articles_dir);

    // ---- Fetch articles (skipped in synthesis mode) ----
    if !args.synthesize {
        let feeds = config::load_feeds_config(Path::new(&args.feeds_config))?;
        let report = fetch::fetch_all(&feeds, articles_dir).await?;

        for fetched in &report.success {
            info!(
                source = %fetched.source,
                title = %truncate_title(&fetched.title),
                path = %fetched.path.display(),
                "Fetched"
            );
        }
        for source in &report.failed_sources {
            warn!(%source, "No articles fetched from source");
        }
        info!(
            fetched = report.success.len(),
            failed_sources = report.failed_sources.len(),
            "Fetch summary"
        );
    }

    // ---- Summarize and build the daily digest ----
    if args.summarize {
        let gemini = config::load_gemini_config(Path::new(&args.gemini_config))?;

        let all_article_files = list_article_files(articles_dir);
        if all_article_files.is_empty() {
            info!("No articles found to summarize");
        } else {
            debug!(
                processed = state.processed().len(),
                failed = state.failed().len(),
                "Loaded processing state"
            );
            let to_process = state.select_for_processing(&all_article_files);
            if to_process.is_empty() {
                info!(
                    total = all_article_files.len(),
                    "No new articles to process (all articles already summarized)"
                );
            } else {
                info!(
                    to_process = to_process.len(),
                    total = all_article_files.len(),
                    "Found articles to process"
                );

                let digests_dir = Path::new(&args.digests_dir);
                let existing = state.digest_for_today(digests_dir);
                let is_update = existing.is_some();
                match &existing {
                    Some(info) => {
                        info!(path = %info.path.display(), date = %info.date, "Updating existing digest")
                    }
                    None => info!("Creating new daily digest"),
                }

                let summarizer = Summarizer::new(&gemini)?;
                let summaries = summarizer.summarize_articles(&to_process, &state).await;

                if summaries.is_empty() {
                    warn!("No articles were successfully summarized");
                } else {
                    match digest::build_or_update(summaries, digests_dir, is_update).await? {
                        Some(path) => {
                            info!(path = %path.display(), "Daily digest saved");
                            state.record_run_completion()?;
                        }
                        None => warn!("Digest builder produced no output"),
                    }
                }
            }
        }
    }

    // ---- Cross-article synthesis ----
    if args.synthesize {
        let gemini = config::load_gemini_config(Path::new(&args.gemini_config))?;
        let analyzer = SynthesisAnalyzer::new(&gemini)?;
        match analyzer
            .run(articles_dir, Path::new(&args.synthesis_dir))
            .await?
        {
            Some(path) => info!(path = %path.display(), "Synthesis analysis saved"),
            None => info!("No articles found to analyze"),
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        date = %Local::now().format("%Y-%m-%d"),
        "Execution complete"
    );

    Ok(())
}

/// All `.md` files in the articles directory, sorted by filename so
/// selection and processing order are stable across runs.
fn list_article_files(articles_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(articles_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    files.sort();
    files
}
