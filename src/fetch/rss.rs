//! RSS feed fetching for newsletter sources.
//!
//! Feeds are parsed with a streaming XML reader rather than a feed crate;
//! only `<item>` title/link/pubDate are needed and Substack feeds wrap all
//! three in CDATA half the time.

use super::{article_filename, element_text, save_article, POLITE_DELAY};
use crate::config::FeedSource;
use crate::models::{ArticleDocument, FetchReport, FetchedArticle};
use crate::utils::truncate_title;
use chrono::{DateTime, Local, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{Html, Selector};
use std::error::Error;
use std::path::Path;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Content selectors tried in order against an article page. The first few
/// are Substack-specific, the rest are generic article containers.
const CONTENT_SELECTORS: [&str; 6] = [
    r#"div[data-testid="post-content"]"#,
    "div.post-content",
    "div.entry-content",
    "article",
    r#"div[class*="post"]"#,
    "main",
];

#[derive(Debug, Default, Clone)]
struct FeedItem {
    title: String,
    link: String,
    pub_date: String,
}

#[derive(Clone, Copy)]
enum ItemField {
    Title,
    Link,
    PubDate,
}

impl FeedItem {
    fn append(&mut self, field: ItemField, text: &str) {
        let slot = match field {
            ItemField::Title => &mut self.title,
            ItemField::Link => &mut self.link,
            ItemField::PubDate => &mut self.pub_date,
        };
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(text);
    }
}

/// Fetch and save the latest articles from every RSS source.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn fetch_sources(
    client: &reqwest::Client,
    sources: &[FeedSource],
    max_articles: usize,
    articles_dir: &Path,
) -> FetchReport {
    let mut report = FetchReport::default();
    for source in sources {
        report.merge(fetch_source(client, source, max_articles, articles_dir).await);
    }
    report
}

#[instrument(level = "info", skip_all, fields(source = %source.name))]
async fn fetch_source(
    client: &reqwest::Client,
    source: &FeedSource,
    max_articles: usize,
    articles_dir: &Path,
) -> FetchReport {
    let mut report = FetchReport::default();

    let items = match fetch_feed(client, &source.rss_url).await {
        Ok(items) if !items.is_empty() => items,
        Ok(_) => {
            warn!(url = %source.rss_url, "Feed contained no articles");
            report.failed_sources.push(source.name.clone());
            return report;
        }
        Err(e) => {
            warn!(url = %source.rss_url, error = %e, "Feed fetch failed");
            report.failed_sources.push(source.name.clone());
            return report;
        }
    };

    for item in items.into_iter().take(max_articles) {
        info!(title = %truncate_title(&item.title), "Processing article");

        let body = match extract_article_text(client, &item.link).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                warn!(url = %item.link, "Could not extract article content");
                continue;
            }
            Err(e) => {
                warn!(url = %item.link, error = %e, "Article fetch failed");
                continue;
            }
        };

        let published = parse_pub_date(&item.pub_date)
            .unwrap_or_else(|| Local::now().naive_local());
        let document = ArticleDocument {
            title: item.title.clone(),
            source: source.name.clone(),
            date: published.format("%Y-%m-%d %H:%M").to_string(),
            url: item.link.clone(),
            body,
            filename: article_filename(
                &source.slug,
                &published.format("%Y-%m-%d").to_string(),
                &item.title,
            ),
        };

        match save_article(articles_dir, &document).await {
            Ok(path) => {
                info!(file = %document.filename, "Saved article");
                report.success.push(FetchedArticle {
                    source: source.name.clone(),
                    title: item.title,
                    path,
                });
            }
            Err(e) => warn!(error = %e, "Failed to save article"),
        }

        // Be polite to the host between article downloads
        sleep(POLITE_DELAY).await;
    }

    report
}

async fn fetch_feed(
    client: &reqwest::Client,
    rss_url: &str,
) -> Result<Vec<FeedItem>, Box<dyn Error>> {
    let xml = client
        .get(rss_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let items = parse_feed(&xml)?;
    debug!(count = items.len(), url = rss_url, "Parsed feed");
    Ok(items)
}

/// Parse RSS XML into feed items. Items without a title or link are dropped.
fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, Box<dyn Error>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<ItemField> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"item" => current = Some(FeedItem::default()),
                b"title" if current.is_some() => field = Some(ItemField::Title),
                b"link" if current.is_some() => field = Some(ItemField::Link),
                b"pubDate" if current.is_some() => field = Some(ItemField::PubDate),
                _ => field = None,
            },
            Event::Text(t) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.append(f, t.unescape()?.trim());
                }
            }
            Event::CData(t) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.append(f, String::from_utf8_lossy(&t.into_inner()).trim());
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        if !item.title.is_empty() && !item.link.is_empty() {
                            items.push(item);
                        }
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Parse a feed timestamp, RFC 2822 first (the RSS norm), then RFC 3339.
fn parse_pub_date(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.naive_local())
}

/// Download an article page and pull out its readable text.
#[instrument(level = "debug", skip_all, fields(%url))]
async fn extract_article_text(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<String>, Box<dyn Error>> {
    let html = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let document = Html::parse_document(&html);

    for selector in CONTENT_SELECTORS {
        let parsed = Selector::parse(selector).unwrap();
        if let Some(element) = document.select(&parsed).next() {
            let text = element_text(element);
            if !text.trim().is_empty() {
                debug!(selector, bytes = text.len(), "Extracted article text");
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Import AI</title>
    <link>https://importai.substack.com</link>
    <item>
      <title><![CDATA[Import AI 380: Agents & Evals]]></title>
      <link>https://importai.substack.com/p/import-ai-380</link>
      <pubDate>Fri, 19 Sep 2025 10:30:00 +0000</pubDate>
    </item>
    <item>
      <title>Plain &amp; Simple</title>
      <link>https://importai.substack.com/p/plain-simple</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_extracts_items() {
        let items = parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Import AI 380: Agents & Evals");
        assert_eq!(items[0].link, "https://importai.substack.com/p/import-ai-380");
        assert_eq!(items[0].pub_date, "Fri, 19 Sep 2025 10:30:00 +0000");
        assert_eq!(items[1].title, "Plain & Simple");
        assert!(items[1].pub_date.is_empty());
    }

    #[test]
    fn test_parse_feed_ignores_channel_title() {
        let items = parse_feed(SAMPLE_FEED).unwrap();
        assert!(items.iter().all(|i| i.title != "Import AI"));
    }

    #[test]
    fn test_parse_feed_drops_incomplete_items() {
        let xml = r#"<rss><channel>
            <item><title>No link here</title></item>
            <item><title>Good</title><link>https://a.example/p</link></item>
        </channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Good");
    }

    #[test]
    fn test_parse_pub_date_rfc2822() {
        let parsed = parse_pub_date("Fri, 19 Sep 2025 10:30:00 +0000").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M").to_string(), "2025-09-19 10:30");
    }

    #[test]
    fn test_parse_pub_date_rfc3339() {
        let parsed = parse_pub_date("2025-09-19T10:30:00+00:00").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2025-09-19");
    }

    #[test]
    fn test_parse_pub_date_garbage_is_none() {
        assert!(parse_pub_date("sometime last week").is_none());
    }
}
