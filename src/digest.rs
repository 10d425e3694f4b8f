//! Daily digest assembly: chronological sorting, entry rendering, and
//! create-or-merge document building.
//!
//! One digest file exists per calendar day (`<YYYY-MM-DD>-daily-digest.md`).
//! The first summarize run of the day creates it; later runs merge into it.
//! Merging is idempotent: an article already embedded in the digest (keyed
//! by URL) is never added twice, and merging a fully-known batch returns the
//! document unchanged.
//!
//! The text-level core ([`sort_chronologically`], [`render_entry`],
//! [`create_document`], [`merge_into_existing`]) is pure and synchronous;
//! only [`build_or_update`] touches the filesystem.

use crate::models::ArticleSummary;
use crate::utils::truncate_title;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static COUNT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Today's digest contains \d+ articles").unwrap());
static GENERATED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*Generated on \d{4}-\d{2}-\d{2} \d{2}:\d{2}\*").unwrap());

/// Marker line the merge algorithm anchors on. Everything before it is the
/// entry region; everything from it on is the footer.
const SOURCES_MARKER: &str = "\n## Sources\n";

/// What a merge did to the existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// This many entries were inserted.
    Added(usize),
    /// Every candidate was already embedded; the document is unchanged.
    NoNewEntries,
}

/// Parse the free-text date carried on a summary.
///
/// Accepts `YYYY-MM-DD HH:MM`, ISO-8601 timestamps with a `T`, and bare
/// dates. Anything unparsable maps to the minimum instant so it sorts last,
/// never erroring and never dropping the entry.
fn parse_summary_date(raw: &str) -> NaiveDateTime {
    let trimmed = raw.trim();
    if trimmed.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&trimmed.replace('Z', "+00:00")) {
            return dt.naive_utc();
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
            return dt;
        }
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M") {
        return dt;
    }
    let first = trimmed.split_whitespace().next().unwrap_or("");
    if let Ok(date) = NaiveDate::parse_from_str(first, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN);
    }
    NaiveDateTime::MIN
}

/// Sort summaries newest-first. Stable, so entries with equal (or equally
/// unparsable) dates keep their input order.
pub fn sort_chronologically(mut summaries: Vec<ArticleSummary>) -> Vec<ArticleSummary> {
    summaries.sort_by(|a, b| parse_summary_date(&b.date).cmp(&parse_summary_date(&a.date)));
    summaries
}

/// Render one self-contained markdown section for an article.
///
/// The raw summary body is reformatted line by line: subsection markers
/// become italic, section markers become bold, existing bullets keep their
/// nesting, and any other non-blank line becomes a top-level bullet. Blank
/// lines are dropped.
pub fn render_entry(summary: &ArticleSummary) -> String {
    let title = truncate_title(&summary.title);

    let mut formatted: Vec<String> = Vec::new();
    for raw in summary.summary.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        // The subsection marker must be tested before the section marker,
        // otherwise `###` lines match the `##` prefix first.
        if let Some(rest) = trimmed.strip_prefix("###") {
            formatted.push(format!("\n*{}*", rest.trim()));
        } else if let Some(rest) = trimmed.strip_prefix("##") {
            formatted.push(format!("\n**{}**", rest.trim()));
        } else if line.starts_with("  - ") || line.starts_with("  • ") {
            // Nested bullet, keep as a sub-bullet
            formatted.push(format!("    {}", &line[2..]));
        } else if trimmed.starts_with("- ") || trimmed.starts_with("• ") {
            formatted.push(format!("  {}", trimmed));
        } else {
            formatted.push(format!("  • {}", trimmed));
        }
    }
    let summary_text = formatted.join("\n");

    format!(
        "### [{}]({})\n**{}** • {}\n\n{}\n\n---",
        title, summary.url, summary.source, summary.date, summary_text
    )
}

/// Build a brand-new digest document from already-sorted summaries.
pub fn create_document(sorted_summaries: &[ArticleSummary]) -> String {
    let now = Local::now();
    let sources: BTreeSet<&str> = sorted_summaries.iter().map(|s| s.source.as_str()).collect();

    let mut doc = format!(
        "# Daily Tech News Digest - {}\n\n\
         *Generated on {}*\n\n\
         ## Summary\n\
         Today's digest contains {} articles from {} sources, covering the latest developments in AI, technology, and software development.\n\n\
         ## Articles\n\n",
        now.format("%Y-%m-%d"),
        now.format("%Y-%m-%d %H:%M"),
        sorted_summaries.len(),
        sources.len()
    );

    for summary in sorted_summaries {
        doc.push_str(&render_entry(summary));
        doc.push_str("\n\n");
    }

    doc.push_str(&format!(
        "\n## Sources\n{}\n\n---\n*This digest was automatically generated from configured newsletter feeds.*\n",
        sources.iter().join(", ")
    ));

    doc
}

/// Collect every article URL already embedded in a digest document.
///
/// URLs are read out of markdown link syntax; keeping this behind its own
/// function keeps the merge algorithm independent of the markdown dialect.
pub fn embedded_urls(text: &str) -> HashSet<String> {
    MARKDOWN_LINK
        .captures_iter(text)
        .filter_map(|caps| caps.get(2).map(|m| m.as_str().to_string()))
        .collect()
}

/// Merge new summaries into an existing digest document.
///
/// Entries whose URL is already embedded are dropped; if nothing survives
/// the filter the input text is returned unchanged. Otherwise the new
/// entries are inserted immediately before the Sources footer (or appended
/// under a `## New Articles` section when the footer marker is missing),
/// and the article count and generation timestamp in the header are
/// recomputed from the updated text.
pub fn merge_into_existing(
    existing: &str,
    new_summaries: &[ArticleSummary],
) -> (String, MergeOutcome) {
    let known = embedded_urls(existing);
    let fresh: Vec<&ArticleSummary> = new_summaries
        .iter()
        .filter(|s| !known.contains(&s.url))
        .unique_by(|s| s.url.clone())
        .collect();

    if fresh.is_empty() {
        return (existing.to_string(), MergeOutcome::NoNewEntries);
    }

    let mut rendered = String::new();
    for summary in &fresh {
        rendered.push_str(&render_entry(summary));
        rendered.push_str("\n\n");
    }

    let mut updated = match existing.find(SOURCES_MARKER) {
        Some(pos) => {
            let mut out = String::with_capacity(existing.len() + rendered.len());
            out.push_str(&existing[..pos]);
            out.push_str(&rendered);
            out.push_str(&existing[pos..]);
            out
        }
        None => {
            // Malformed or foreign document: append rather than fail
            let mut out = existing.to_string();
            out.push_str("\n\n## New Articles\n\n");
            out.push_str(&rendered);
            out
        }
    };

    // Recount from the headings actually present, never the old number
    let total = updated.matches("### [").count();
    updated = COUNT_LINE
        .replace(&updated, format!("Today's digest contains {} articles", total))
        .into_owned();
    updated = GENERATED_LINE
        .replace(
            &updated,
            format!("*Generated on {}*", Local::now().format("%Y-%m-%d %H:%M")),
        )
        .into_owned();

    (updated, MergeOutcome::Added(fresh.len()))
}

/// Create or update today's digest file.
///
/// Returns `None` when there is nothing to write. In update mode an
/// existing digest for today is merged into; any failure while reading or
/// merging it degrades to regenerating the file from the new summaries,
/// logged as a warning rather than surfaced as an error.
#[instrument(level = "info", skip_all, fields(digest_dir = %digest_dir.display(), is_update))]
pub async fn build_or_update(
    summaries: Vec<ArticleSummary>,
    digest_dir: &Path,
    is_update: bool,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    if summaries.is_empty() {
        return Ok(None);
    }

    let sorted = sort_chronologically(summaries);
    fs::create_dir_all(digest_dir).await?;

    let today = Local::now().format("%Y-%m-%d").to_string();
    let path = digest_dir.join(format!("{}-daily-digest.md", today));

    if is_update && path.exists() {
        match merge_file(&path, &sorted).await {
            Ok(MergeOutcome::NoNewEntries) => {
                info!(path = %path.display(), "No new articles to add to existing digest");
                return Ok(Some(path));
            }
            Ok(MergeOutcome::Added(count)) => {
                info!(path = %path.display(), added = count, "Merged new articles into existing digest");
                return Ok(Some(path));
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Digest merge failed; regenerating from new summaries");
            }
        }
    }

    let doc = create_document(&sorted);
    fs::write(&path, doc).await?;
    info!(path = %path.display(), count = sorted.len(), "Wrote new daily digest");
    Ok(Some(path))
}

async fn merge_file(
    path: &Path,
    sorted: &[ArticleSummary],
) -> Result<MergeOutcome, Box<dyn Error>> {
    let existing = fs::read_to_string(path).await?;
    let (updated, outcome) = merge_into_existing(&existing, sorted);
    if let MergeOutcome::Added(_) = outcome {
        fs::write(path, updated).await?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(title: &str, url: &str, date: &str) -> ArticleSummary {
        ArticleSummary {
            title: title.to_string(),
            source: "S".to_string(),
            date: date.to_string(),
            url: url.to_string(),
            summary: "- First point\n- Second point".to_string(),
            filename: format!("{}.md", title.to_lowercase()),
        }
    }

    #[test]
    fn test_sort_newest_first_with_times() {
        let input = vec![
            summary("A", "https://x/a", "2025-09-19 10:00"),
            summary("B", "https://x/b", "2025-09-18"),
            summary("C", "https://x/c", "2025-09-20"),
            summary("D", "https://x/d", "2025-09-19 14:00"),
        ];
        let sorted = sort_chronologically(input);
        let titles: Vec<&str> = sorted.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn test_sort_unparsable_date_goes_last() {
        let input = vec![
            summary("Garbled", "https://x/g", "sometime last week"),
            summary("Dated", "https://x/d", "2025-09-18"),
        ];
        let sorted = sort_chronologically(input);
        assert_eq!(sorted[0].title, "Dated");
        assert_eq!(sorted[1].title, "Garbled");
    }

    #[test]
    fn test_sort_accepts_iso_timestamps() {
        let input = vec![
            summary("Older", "https://x/1", "2025-09-19T08:00:00Z"),
            summary("Newer", "https://x/2", "2025-09-19T12:00:00Z"),
        ];
        let sorted = sort_chronologically(input);
        assert_eq!(sorted[0].title, "Newer");
    }

    #[test]
    fn test_render_entry_heading_and_byline() {
        let s = summary("Test", "https://x/1", "2025-09-19 10:00");
        let entry = render_entry(&s);
        assert!(entry.starts_with("### [Test](https://x/1)"));
        assert!(entry.contains("**S** • 2025-09-19 10:00"));
        assert!(entry.ends_with("---"));
    }

    #[test]
    fn test_render_entry_body_reformatting() {
        let mut s = summary("Test", "https://x/1", "2025-09-19");
        s.summary = "## Section\n### Subsection\n- bullet\n  - nested\nplain text\n\n".to_string();
        let entry = render_entry(&s);

        assert!(entry.contains("\n**Section**"));
        assert!(entry.contains("\n*Subsection*"));
        assert!(entry.contains("\n  - bullet"));
        assert!(entry.contains("\n    - nested"));
        assert!(entry.contains("\n  • plain text"));
    }

    #[test]
    fn test_render_entry_truncates_long_title() {
        let long_title = "T".repeat(100);
        let s = summary(&long_title, "https://x/long", "2025-09-19");
        let entry = render_entry(&s);
        let expected = format!("### [{}...](https://x/long)", "T".repeat(77));
        assert!(entry.starts_with(&expected));
    }

    #[test]
    fn test_create_document_single_article() {
        let s = summary("Test", "https://x/1", "2025-09-19 10:00");
        let doc = create_document(&[s]);

        assert_eq!(doc.matches("### [Test](https://x/1)").count(), 1);
        assert!(doc.contains("Today's digest contains 1 articles from 1 sources"));
        assert!(doc.contains("\n## Sources\nS\n"));
        assert!(doc.starts_with("# Daily Tech News Digest - "));
    }

    #[test]
    fn test_embedded_urls() {
        let text = "### [A](https://x/1)\nsome text\n### [B](https://x/2)\n";
        let urls = embedded_urls(text);
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://x/1"));
        assert!(urls.contains("https://x/2"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = summary("Test", "https://x/1", "2025-09-19 10:00");
        let doc = create_document(&[a.clone()]);

        let (merged, outcome) = merge_into_existing(&doc, &[a]);
        assert_eq!(outcome, MergeOutcome::NoNewEntries);
        assert_eq!(merged, doc);
    }

    #[test]
    fn test_merge_adds_new_entry_and_recounts() {
        let a = summary("Test", "https://x/1", "2025-09-19 10:00");
        let b = summary("Another", "https://x/2", "2025-09-19 12:00");
        let doc = create_document(&[a.clone()]);

        let (merged, outcome) = merge_into_existing(&doc, &[b]);
        assert_eq!(outcome, MergeOutcome::Added(1));
        assert_eq!(merged.matches("### [").count(), 2);
        assert!(merged.contains("Today's digest contains 2 articles"));
        // The original entry survives untouched
        assert!(merged.contains("### [Test](https://x/1)"));
        // New entries land before the footer
        let sources_pos = merged.find("\n## Sources\n").unwrap();
        let new_pos = merged.find("### [Another]").unwrap();
        assert!(new_pos < sources_pos);
    }

    #[test]
    fn test_merge_dedups_within_batch() {
        let a = summary("Test", "https://x/1", "2025-09-19");
        let doc = create_document(&[a]);
        let dup1 = summary("Dup one", "https://x/2", "2025-09-19");
        let dup2 = summary("Dup two", "https://x/2", "2025-09-19");

        let (merged, outcome) = merge_into_existing(&doc, &[dup1, dup2]);
        assert_eq!(outcome, MergeOutcome::Added(1));
        assert_eq!(merged.matches("](https://x/2)").count(), 1);
    }

    #[test]
    fn test_merge_fallback_without_footer() {
        let foreign = "# Some other document\n\nNo sources section here.\n";
        let b = summary("New", "https://x/9", "2025-09-19");

        let (merged, outcome) = merge_into_existing(foreign, &[b]);
        assert_eq!(outcome, MergeOutcome::Added(1));
        assert!(merged.starts_with(foreign));
        assert!(merged.contains("## New Articles"));
        assert!(merged.contains("### [New](https://x/9)"));
    }

    #[test]
    fn test_count_stays_consistent_across_merges() {
        let mut doc = create_document(&[summary("One", "https://x/1", "2025-09-19")]);
        for i in 2..=4 {
            let s = summary(&format!("Entry {}", i), &format!("https://x/{}", i), "2025-09-19");
            let (next, _) = merge_into_existing(&doc, &[s]);
            doc = next;
        }
        let headings = doc.matches("### [").count();
        assert_eq!(headings, 4);
        assert!(doc.contains(&format!("Today's digest contains {} articles", headings)));
    }

    #[tokio::test]
    async fn test_build_or_update_empty_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_or_update(vec![], dir.path(), false).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_build_then_update_on_disk() {
        let dir = tempfile::tempdir().unwrap();

        let a = summary("First", "https://x/1", "2025-09-19 10:00");
        let path = build_or_update(vec![a], dir.path(), false)
            .await
            .unwrap()
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-daily-digest.md"));

        let b = summary("Second", "https://x/2", "2025-09-19 12:00");
        let updated_path = build_or_update(vec![b], dir.path(), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated_path, path);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("### [First](https://x/1)"));
        assert!(content.contains("### [Second](https://x/2)"));
        assert!(content.contains("Today's digest contains 2 articles"));
    }

    #[tokio::test]
    async fn test_update_mode_without_existing_creates() {
        let dir = tempfile::tempdir().unwrap();
        let a = summary("Solo", "https://x/1", "2025-09-19");
        let path = build_or_update(vec![a], dir.path(), true)
            .await
            .unwrap()
            .unwrap();
        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Today's digest contains 1 articles"));
    }
}
