//! Data models for saved articles and their summarized representations.
//!
//! This module defines the core data structures used throughout the
//! application:
//! - [`ArticleDocument`]: an article as persisted to `articles/*.md`, with
//!   the fixed header block (`# title`, `**Source:**`, `**Date:**`,
//!   `**URL:**`, `---`, body)
//! - [`ArticleSummary`]: one summarized article ready for digest rendering
//! - [`FetchReport`]: per-run accounting of which sources succeeded/failed

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TITLE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^# (.+)$").unwrap());
static SOURCE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*Source:\*\* (.+)").unwrap());
static DATE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*Date:\*\* (.+)").unwrap());
static URL_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*URL:\*\* (.+)").unwrap());
static BODY_AFTER_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?ms)^---\s*\n(.*)$").unwrap());

/// An article as stored on disk in the articles directory.
///
/// The digest pipeline round-trips through these files: the fetchers render
/// them with [`ArticleDocument::to_markdown`] and the summarizer reads them
/// back with [`ArticleDocument::parse`]. Identity for state tracking is the
/// `filename`, never the content.
#[derive(Debug, Clone)]
pub struct ArticleDocument {
    /// The article title/headline.
    pub title: String,
    /// Human-readable source name (e.g. the newsletter's name).
    pub source: String,
    /// Publication date as free text, usually `YYYY-MM-DD HH:MM`.
    pub date: String,
    /// Canonical article URL.
    pub url: String,
    /// The extracted readable text of the article.
    pub body: String,
    /// Basename of the file this article lives in.
    pub filename: String,
}

impl ArticleDocument {
    /// Render the on-disk markdown representation with the fixed header block.
    pub fn to_markdown(&self) -> String {
        format!(
            "# {}\n\n**Source:** {}  \n**Date:** {}  \n**URL:** {}  \n\n---\n\n{}\n",
            self.title, self.source, self.date, self.url, self.body
        )
    }

    /// Parse a saved article file back into a structured record.
    ///
    /// Missing header fields fall back to placeholder defaults rather than
    /// failing; a file without any recognizable body keeps the whole content
    /// as its body. Returns `None` only for completely empty input.
    pub fn parse(content: &str, filename: &str) -> Option<ArticleDocument> {
        if content.trim().is_empty() {
            return None;
        }

        let capture = |re: &Regex, default: &str| -> String {
            re.captures(content)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };

        let body = BODY_AFTER_RULE
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| content.trim().to_string());

        Some(ArticleDocument {
            title: capture(&TITLE_LINE, "Unknown Title"),
            source: capture(&SOURCE_LINE, "Unknown Source"),
            date: capture(&DATE_LINE, "Unknown Date"),
            url: capture(&URL_LINE, ""),
            body,
            filename: filename.to_string(),
        })
    }
}

/// A summarized article, produced fresh each run by the summarizer.
///
/// Ownership passes to the digest builder, which renders it into markdown
/// and discards it. The `url` is the dedup key inside a digest; the
/// `filename` ties the summary back to the state store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArticleSummary {
    pub title: String,
    pub source: String,
    /// Free-text date carried through from the article header.
    pub date: String,
    pub url: String,
    /// Markdown-ish summary body as returned by the model.
    pub summary: String,
    /// Basename of the source article file.
    pub filename: String,
}

/// One successfully fetched and saved article, for run reporting.
#[derive(Debug, Clone)]
pub struct FetchedArticle {
    pub source: String,
    pub title: String,
    pub path: std::path::PathBuf,
}

/// Per-run accounting of fetch results across all configured sources.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub success: Vec<FetchedArticle>,
    pub failed_sources: Vec<String>,
}

impl FetchReport {
    pub fn merge(&mut self, other: FetchReport) {
        self.success.extend(other.success);
        self.failed_sources.extend(other.failed_sources);
    }
}
