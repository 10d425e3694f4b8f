//! Article collection from configured sources.
//!
//! Two fetch paths share this module's plumbing:
//! - [`rss`]: newsletter feeds with an RSS endpoint (Substack and friends)
//! - [`blog`]: ad-hoc blogs scraped from their index page
//!
//! Both paths end in the same place: an [`ArticleDocument`] written to the
//! articles directory, named `<slug>-<date>-<sanitized-title>.md`, and a
//! [`FetchReport`] entry. Every per-source and per-article failure is
//! logged and skipped; fetching never aborts the run.

pub mod blog;
pub mod rss;

use crate::config::FeedsConfig;
use crate::models::{ArticleDocument, FetchReport};
use crate::utils::sanitize_filename;
use scraper::ElementRef;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Pause between article downloads from the same host.
const POLITE_DELAY: Duration = Duration::from_secs(1);

/// Fetch from every configured source, newsletters first, then blogs.
///
/// Sources are visited sequentially on purpose; the per-article delay is
/// the rate limit and parallel sources would defeat it.
#[instrument(level = "info", skip_all)]
pub async fn fetch_all(
    config: &FeedsConfig,
    articles_dir: &Path,
) -> Result<FetchReport, Box<dyn Error>> {
    let client = http_client()?;

    let mut report = rss::fetch_sources(
        &client,
        &config.substacks,
        config.settings.max_articles_per_source,
        articles_dir,
    )
    .await;
    report.merge(blog::fetch_sources(&client, &config.blogs, articles_dir).await);

    info!(
        saved = report.success.len(),
        failed_sources = report.failed_sources.len(),
        "Fetch pass complete"
    );
    Ok(report)
}

fn http_client() -> Result<reqwest::Client, Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

/// Build the on-disk filename for a fetched article.
pub fn article_filename(slug: &str, date: &str, title: &str) -> String {
    format!("{}-{}-{}.md", slug, date, sanitize_filename(title))
}

/// Write an article document into the articles directory.
pub async fn save_article(
    articles_dir: &Path,
    document: &ArticleDocument,
) -> Result<PathBuf, Box<dyn Error>> {
    tokio::fs::create_dir_all(articles_dir).await?;
    let path = articles_dir.join(&document.filename);
    tokio::fs::write(&path, document.to_markdown()).await?;
    Ok(path)
}

/// Readable text of an element, one line per text node, with script/style
/// and noscript subtrees dropped.
pub fn element_text(element: ElementRef) -> String {
    let mut lines = Vec::new();
    collect_text(element, &mut lines);
    lines.join("\n")
}

fn collect_text(element: ElementRef, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if matches!(
                child_element.value().name(),
                "script" | "style" | "noscript"
            ) {
                continue;
            }
            collect_text(child_element, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn test_article_filename_shape() {
        let name = article_filename("import-ai", "2025-09-19", "GPT-5: What's Next?");
        assert_eq!(name, "import-ai-2025-09-19-GPT-5-Whats-Next.md");
    }

    #[test]
    fn test_element_text_skips_scripts() {
        let html = Html::parse_document(
            "<article><p>Visible text.</p><script>var x = 1;</script>\
             <style>p { color: red }</style><p>More text.</p></article>",
        );
        let selector = Selector::parse("article").unwrap();
        let element = html.select(&selector).next().unwrap();

        let text = element_text(element);
        assert_eq!(text, "Visible text.\nMore text.");
    }

    #[test]
    fn test_element_text_nested_elements() {
        let html = Html::parse_document(
            "<div><h2>Heading</h2><p>One <em>emphasized</em> word.</p></div>",
        );
        let selector = Selector::parse("div").unwrap();
        let element = html.select(&selector).next().unwrap();

        let text = element_text(element);
        assert!(text.contains("Heading"));
        assert!(text.contains("emphasized"));
    }

    #[tokio::test]
    async fn test_save_article_creates_dir_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let articles_dir = dir.path().join("articles");
        let document = ArticleDocument {
            title: "T".to_string(),
            source: "S".to_string(),
            date: "2025-09-19 10:00".to_string(),
            url: "https://example.com/t".to_string(),
            body: "Body.".to_string(),
            filename: "s-2025-09-19-T.md".to_string(),
        };

        let path = save_article(&articles_dir, &document).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# T\n"));
        assert!(written.contains("**URL:** https://example.com/t"));
    }
}
