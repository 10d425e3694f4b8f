//! Command-line interface definitions for the digest tool.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Paths can also be provided via environment variables, which suits cron
//! and container deployments.

use clap::Parser;

/// Command-line arguments for the tech news digest pipeline.
///
/// The default invocation only fetches articles. Add `--summarize` to also
/// build today's digest, or `--synthesize` to skip fetching and produce a
/// cross-article trend analysis instead.
///
/// # Examples
///
/// ```sh
/// # Fetch the latest articles from all configured sources
/// tech_news_digest
///
/// # Fetch and then build (or update) today's digest
/// tech_news_digest --summarize
///
/// # Analyze everything already on disk, no fetching
/// tech_news_digest --synthesize
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Summarize new articles and build today's digest after fetching
    #[arg(long)]
    pub summarize: bool,

    /// Skip fetching and produce a cross-article synthesis analysis
    #[arg(long)]
    pub synthesize: bool,

    /// Path to the feeds configuration file
    #[arg(long, env = "FEEDS_CONFIG", default_value = "config/feeds.yaml")]
    pub feeds_config: String,

    /// Path to the Gemini configuration file
    #[arg(long, env = "GEMINI_CONFIG", default_value = "config/gemini.yaml")]
    pub gemini_config: String,

    /// Directory where fetched articles are saved
    #[arg(short, long, default_value = "articles")]
    pub articles_dir: String,

    /// Directory where daily digests are written
    #[arg(short, long, default_value = "digests")]
    pub digests_dir: String,

    /// Directory where synthesis analyses are written
    #[arg(long, default_value = "synthesis")]
    pub synthesis_dir: String,

    /// Directory for run-state files
    #[arg(long, env = "STATE_DIR", default_value = ".state")]
    pub state_dir: String,
}
