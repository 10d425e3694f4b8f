//! Article summarization: reads saved article files, asks Gemini for a
//! bullet-point summary of each, and records successes and failures into
//! the state store.
//!
//! Per-article failures are isolated: one bad article never blocks the
//! rest of the batch, it just lands in the failed set for retry on the
//! next run.

use crate::api::{ask_with_backoff, GeminiClient};
use crate::config::GeminiConfig;
use crate::models::{ArticleDocument, ArticleSummary};
use crate::state::StateStore;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// How many summarization requests are in flight at once. The digest sort
/// restores chronological order afterwards, so completion order is free to
/// vary.
const PARALLEL_REQUESTS: usize = 4;

pub struct Summarizer {
    client: GeminiClient,
    max_article_length: usize,
}

impl Summarizer {
    pub fn new(config: &GeminiConfig) -> Result<Self, Box<dyn Error>> {
        let client = GeminiClient::new(config.gemini.api_key.clone(), config.gemini.model.clone())?;
        Ok(Summarizer {
            client,
            max_article_length: config.summarization.max_article_length,
        })
    }

    /// Summarize every file in `article_files`, updating the state store
    /// once at the end of the pass: successes move to the processed set
    /// (and out of the failed set), failures join the failed set.
    #[instrument(level = "info", skip_all, fields(count = article_files.len()))]
    pub async fn summarize_articles(
        &self,
        article_files: &[PathBuf],
        state: &StateStore,
    ) -> Vec<ArticleSummary> {
        let results: Vec<(String, Option<ArticleSummary>)> =
            stream::iter(article_files.iter())
                .map(|path| async move {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let summary = self.summarize_one(path).await;
                    (filename, summary)
                })
                .buffer_unordered(PARALLEL_REQUESTS)
                .collect()
                .await;

        let mut summaries = Vec::new();
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for (filename, outcome) in results {
            match outcome {
                Some(summary) => {
                    summaries.push(summary);
                    successful.push(filename);
                }
                None => failed.push(filename),
            }
        }

        if !successful.is_empty() {
            if let Err(e) = state.add_processed(&successful) {
                warn!(error = %e, "Failed to persist processed set");
            }
            if let Err(e) = state.clear_failed(&successful) {
                warn!(error = %e, "Failed to clear retried articles from failed set");
            }
        }
        if !failed.is_empty() {
            if let Err(e) = state.add_failed(&failed) {
                warn!(error = %e, "Failed to persist failed set");
            }
        }

        info!(
            successful = successful.len(),
            failed = failed.len(),
            "Completed summarization pass"
        );
        summaries
    }

    /// Summarize a single article file. Returns `None` on any failure
    /// (unreadable file, unparsable header, API error).
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    async fn summarize_one(&self, path: &Path) -> Option<ArticleSummary> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Could not read article file");
                return None;
            }
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some(document) = ArticleDocument::parse(&raw, &filename) else {
            warn!("Article file is empty; skipping");
            return None;
        };

        let prompt = build_prompt(&document, self.max_article_length);
        debug!(prompt_len = prompt.len(), "Built summarization prompt");

        match ask_with_backoff(&self.client, &prompt).await {
            Ok(text) => {
                debug!(
                    response_preview = %crate::utils::truncate_for_log(&text, 300),
                    "Received summary"
                );
                Some(ArticleSummary {
                    title: document.title,
                    source: document.source,
                    date: document.date,
                    url: document.url,
                    summary: text.trim().to_string(),
                    filename,
                })
            }
            Err(e) => {
                warn!(error = %e, title = %document.title, "Summarization failed; will retry next run");
                None
            }
        }
    }
}

/// Build the per-article summarization prompt.
fn build_prompt(document: &ArticleDocument, max_article_length: usize) -> String {
    let content = truncate_content(&document.body, max_article_length);
    format!(
        "Please provide a concise bullet-point summary of this AI/technology article. Focus on:\n\n\
         1. Key technical insights or findings\n\
         2. Important developments or announcements\n\
         3. Practical implications for developers/engineers\n\
         4. Notable tools, frameworks, or methodologies mentioned\n\n\
         Keep each bullet point to 1-2 sentences maximum. Be specific and technical.\n\n\
         Article Title: {}\n\
         Source: {}\n\n\
         Article Content:\n{}\n\n\
         Summary:",
        document.title, document.source, content
    )
}

/// Truncate article text to `max_length`, preferring a sentence boundary
/// when one falls in the last fifth of the window.
fn truncate_content(content: &str, max_length: usize) -> String {
    if content.len() <= max_length {
        return content.to_string();
    }

    let mut end = max_length;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    let window = &content[..end];

    match window.rfind('.') {
        Some(last_period) if last_period > (max_length * 4) / 5 => {
            format!("{}\n\n[Content truncated...]", &window[..=last_period])
        }
        _ => format!("{}\n\n[Content truncated...]", window),
    }
}
