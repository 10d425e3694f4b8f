//! Index-page scraping for blogs without an RSS feed.
//!
//! Post discovery prefers the per-blog `post_selector` from config; blogs
//! without one go through link heuristics (date-shaped URLs, post-like link
//! text). Scraped posts carry the fetch time as their date since most blog
//! themes bury the real one.

use super::{article_filename, element_text, save_article, POLITE_DELAY};
use crate::config::BlogSource;
use crate::models::{ArticleDocument, FetchReport, FetchedArticle};
use crate::utils::truncate_title;
use chrono::Local;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::error::Error;
use std::path::Path;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Date shapes that mark a URL as a dated blog post, like `/2024/01/` or
/// `/2024-01-15`.
static DATED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d{4}/\d{2}/|/\d{4}-\d{2}-\d{2}|/\d{2}/\d{2}/\d{4}").unwrap());

/// Index-page paths that are never posts.
const SKIP_PATTERNS: [&str; 6] = [
    "/about",
    "/contact",
    "/subscribe",
    "/newsletter",
    "/tags",
    "/categories",
];

const TITLE_SELECTORS: [&str; 6] = [
    "h1",
    "title",
    ".post-title",
    ".entry-title",
    "article h1",
    r#"[class*="title"]"#,
];

const CONTENT_SELECTORS: [&str; 7] = [
    "article",
    ".post-content",
    ".entry-content",
    ".content",
    "main",
    r#"[class*="content"]"#,
    r#"[class*="post"]"#,
];

/// Scrape and save recent posts from every configured blog.
#[instrument(level = "info", skip_all, fields(blogs = blogs.len()))]
pub async fn fetch_sources(
    client: &reqwest::Client,
    blogs: &[BlogSource],
    articles_dir: &Path,
) -> FetchReport {
    let mut report = FetchReport::default();
    for blog in blogs {
        report.merge(fetch_blog(client, blog, articles_dir).await);
    }
    report
}

#[instrument(level = "info", skip_all, fields(blog = %blog.name))]
async fn fetch_blog(
    client: &reqwest::Client,
    blog: &BlogSource,
    articles_dir: &Path,
) -> FetchReport {
    let mut report = FetchReport::default();

    let links = match index_posts(client, blog).await {
        Ok(links) if !links.is_empty() => links,
        Ok(_) => {
            warn!(url = %blog.base_url, "No post links found on index page");
            report.failed_sources.push(blog.name.clone());
            return report;
        }
        Err(e) => {
            warn!(url = %blog.base_url, error = %e, "Blog index fetch failed");
            report.failed_sources.push(blog.name.clone());
            return report;
        }
    };

    for link in links {
        let post = match scrape_post(client, &link).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                warn!(url = %link, "Post had no usable title or content");
                continue;
            }
            Err(e) => {
                warn!(url = %link, error = %e, "Post fetch failed");
                continue;
            }
        };
        info!(title = %truncate_title(&post.title), "Scraped blog post");

        let now = Local::now();
        let document = ArticleDocument {
            filename: article_filename(
                &blog.slug,
                &now.format("%Y-%m-%d").to_string(),
                &post.title,
            ),
            title: post.title,
            source: blog.name.clone(),
            date: now.format("%Y-%m-%d %H:%M").to_string(),
            url: link,
            body: post.content,
        };

        match save_article(articles_dir, &document).await {
            Ok(path) => {
                info!(file = %document.filename, "Saved article");
                report.success.push(FetchedArticle {
                    source: blog.name.clone(),
                    title: document.title.clone(),
                    path,
                });
            }
            Err(e) => warn!(error = %e, "Failed to save article"),
        }

        sleep(POLITE_DELAY).await;
    }

    report
}

struct ScrapedPost {
    title: String,
    content: String,
}

/// Fetch the blog index page and pick out post URLs, newest-first as they
/// appear on the page, capped at `max_posts`.
async fn index_posts(
    client: &reqwest::Client,
    blog: &BlogSource,
) -> Result<Vec<String>, Box<dyn Error>> {
    let html = client
        .get(&blog.base_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let document = Html::parse_document(&html);
    let links = collect_post_links(&document, blog);
    debug!(count = links.len(), "Collected post links");
    Ok(links)
}

fn collect_post_links(document: &Html, blog: &BlogSource) -> Vec<String> {
    let base = match url::Url::parse(&blog.base_url) {
        Ok(base) => base,
        Err(e) => {
            warn!(url = %blog.base_url, error = %e, "Invalid blog base URL");
            return Vec::new();
        }
    };

    let links: Vec<String> = match &blog.post_selector {
        Some(selector) => match Selector::parse(selector) {
            Ok(parsed) => document
                .select(&parsed)
                .filter_map(|element| element.value().attr("href"))
                .filter_map(|href| base.join(href).ok())
                .map(|resolved| resolved.to_string())
                .collect(),
            Err(e) => {
                warn!(selector = %selector, error = %e.to_string(), "Bad post selector; using link heuristics");
                heuristic_links(document, &base, &blog.base_url)
            }
        },
        None => heuristic_links(document, &base, &blog.base_url),
    };

    links.into_iter().unique().take(blog.max_posts).collect()
}

/// Without a selector, keep same-site links that look like posts.
fn heuristic_links(document: &Html, base: &url::Url, base_url: &str) -> Vec<String> {
    let anchor = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();

    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.trim();
        if text.len() < 10 {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let full_url = resolved.to_string();
        if !full_url.starts_with(base_url) {
            continue;
        }
        let lowered = full_url.to_lowercase();
        if SKIP_PATTERNS.iter().any(|p| lowered.contains(p)) {
            continue;
        }
        if looks_like_blog_post(href, text) {
            links.push(full_url);
        }
    }
    links
}

fn looks_like_blog_post(href: &str, text: &str) -> bool {
    if DATED_URL.is_match(href) {
        return true;
    }
    let lowered = text.to_lowercase();
    if ["post", "article", "blog", "note"]
        .iter()
        .any(|word| lowered.contains(word))
    {
        return true;
    }
    // Headline-length link text is a decent signal on its own
    text.len() > 20 && text.len() < 100
}

async fn scrape_post(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<ScrapedPost>, Box<dyn Error>> {
    let html = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let document = Html::parse_document(&html);

    let Some(title) = extract_title(&document) else {
        return Ok(None);
    };
    let Some(content) = extract_content(&document) else {
        return Ok(None);
    };
    Ok(Some(ScrapedPost { title, content }))
}

fn extract_title(document: &Html) -> Option<String> {
    for selector in TITLE_SELECTORS {
        let parsed = Selector::parse(selector).unwrap();
        if let Some(element) = document.select(&parsed).next() {
            let title = element.text().collect::<Vec<_>>().join(" ");
            let title = title.trim();
            if title.len() > 5 {
                return Some(title.to_string());
            }
        }
    }
    None
}

fn extract_content(document: &Html) -> Option<String> {
    for selector in CONTENT_SELECTORS {
        let parsed = Selector::parse(selector).unwrap();
        if let Some(element) = document.select(&parsed).next() {
            let content = element_text(element);
            if content.len() > 100 {
                return Some(content);
            }
        }
    }
    None
}
