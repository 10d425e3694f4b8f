//! YAML configuration loading.
//!
//! Two config files drive the application:
//!
//! - `feeds.yaml`: the newsletter feeds and ad-hoc blogs to collect from,
//!   plus fetch settings.
//! - `gemini.yaml`: Gemini API credentials/model plus summarization limits.
//!
//! A missing config file is the one fatal error class in the pipeline
//! (spelled out by the orchestrator); everything downstream degrades
//! per-item instead of aborting.

use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use tracing::info;

/// One RSS-backed newsletter source.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    /// Human-readable name, shown in digests and run reports.
    pub name: String,
    /// Short identifier used as the filename prefix for saved articles.
    pub slug: String,
    pub rss_url: String,
}

/// One ad-hoc blog without an RSS feed, scraped from its index page.
#[derive(Debug, Clone, Deserialize)]
pub struct BlogSource {
    pub name: String,
    pub slug: String,
    pub base_url: String,
    /// CSS selector for post links on the index page. When absent, link
    /// heuristics are applied instead.
    #[serde(default)]
    pub post_selector: Option<String>,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
}

fn default_max_posts() -> usize {
    5
}

/// Fetch-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_max_articles")]
    pub max_articles_per_source: usize,
}

fn default_max_articles() -> usize {
    3
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            max_articles_per_source: default_max_articles(),
        }
    }
}

/// Top-level shape of `feeds.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub substacks: Vec<FeedSource>,
    #[serde(default)]
    pub blogs: Vec<BlogSource>,
    #[serde(default)]
    pub settings: FetchSettings,
}

/// Gemini credentials and model selection, from `gemini.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
}

/// Summarization limits, from `gemini.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarySettings {
    #[serde(default = "default_max_article_length")]
    pub max_article_length: usize,
}

fn default_max_article_length() -> usize {
    8000
}

impl Default for SummarySettings {
    fn default() -> Self {
        SummarySettings {
            max_article_length: default_max_article_length(),
        }
    }
}

/// Top-level shape of `gemini.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub summarization: SummarySettings,
}

/// Load and parse `feeds.yaml`.
pub fn load_feeds_config(path: &Path) -> Result<FeedsConfig, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let config: FeedsConfig = serde_yaml::from_str(&raw)?;
    info!(
        path = %path.display(),
        substacks = config.substacks.len(),
        blogs = config.blogs.len(),
        "Loaded feeds configuration"
    );
    Ok(config)
}

/// Load and parse `gemini.yaml`.
pub fn load_gemini_config(path: &Path) -> Result<GeminiConfig, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let config: GeminiConfig = serde_yaml::from_str(&raw)?;
    info!(path = %path.display(), model = %config.gemini.model, "Loaded Gemini configuration");
    Ok(config)
}
