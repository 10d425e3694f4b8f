//! Cross-article synthesis: feeds every saved article into one Gemini
//! prompt and writes out a trend analysis instead of per-article summaries.

use crate::api::{ask_with_backoff, GeminiClient};
use crate::config::GeminiConfig;
use chrono::Local;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// How much of each article feeds the combined prompt. Keeps the request
/// inside the model's context window even with dozens of articles.
const PREVIEW_CHARS: usize = 2000;

pub struct SynthesisAnalyzer {
    client: GeminiClient,
}

/// One loaded article, ready for the combined prompt.
struct LoadedArticle {
    title: String,
    content: String,
}

impl SynthesisAnalyzer {
    pub fn new(config: &GeminiConfig) -> Result<Self, Box<dyn Error>> {
        let client = GeminiClient::new(config.gemini.api_key.clone(), config.gemini.model.clone())?;
        Ok(SynthesisAnalyzer { client })
    }

    /// Run the full synthesis pass: load every article, ask Gemini for a
    /// cross-cutting analysis, and save it under `synthesis_dir`.
    ///
    /// Returns the path of the written file, or `None` when there was
    /// nothing to analyze.
    #[instrument(level = "info", skip_all)]
    pub async fn run(
        &self,
        articles_dir: &Path,
        synthesis_dir: &Path,
    ) -> Result<Option<PathBuf>, Box<dyn Error>> {
        let articles = load_articles(articles_dir).await?;
        if articles.is_empty() {
            info!("No articles found to synthesize");
            return Ok(None);
        }
        info!(count = articles.len(), "Synthesizing insights across articles");

        let prompt = build_synthesis_prompt(&articles);
        let analysis = ask_with_backoff(&self.client, &prompt).await?;

        let path = save_synthesis(&analysis, synthesis_dir).await?;
        info!(path = %path.display(), "Saved synthesis");
        Ok(Some(path))
    }
}

/// Read every `.md` file in the articles directory.
async fn load_articles(articles_dir: &Path) -> Result<Vec<LoadedArticle>, Box<dyn Error>> {
    let mut articles = Vec::new();
    let mut entries = match tokio::fs::read_dir(articles_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %articles_dir.display(), error = %e, "Articles directory not readable");
            return Ok(articles);
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable article");
                continue;
            }
        };
        let title = content
            .lines()
            .next()
            .map(|line| line.trim_start_matches("# ").to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
        articles.push(LoadedArticle { title, content });
    }
    Ok(articles)
}

fn build_synthesis_prompt(articles: &[LoadedArticle]) -> String {
    let article_texts: Vec<String> = articles
        .iter()
        .map(|article| {
            let preview = preview_of(&article.content);
            format!("**{}**\n{}\n---\n", article.title, preview)
        })
        .collect();
    let combined_text = article_texts.join("\n");

    format!(
        "You are a technology analyst tasked with synthesizing insights from multiple AI and technology articles.\n\n\
         Below are {} recent articles from top tech newsletters and blogs. Your job is to:\n\n\
         1. **Identify the 3-5 most significant cross-cutting themes** that appear across multiple articles\n\
         2. **Extract the most important technical developments** mentioned\n\
         3. **Find common patterns in industry trends** and market dynamics\n\
         4. **Identify emerging opportunities and challenges** that multiple sources are highlighting\n\
         5. **Synthesize actionable insights** for developers, engineers, and tech leaders\n\n\
         Write a comprehensive analysis that reads like a high-quality tech newsletter post. \
         Structure it with clear sections, use specific examples from the articles, and provide concrete takeaways.\n\n\
         Here are the articles to analyze:\n\n{}\n\n\
         Please provide a well-structured analysis that would be valuable for a technical audience \
         interested in AI, software development, and technology trends.",
        articles.len(),
        combined_text
    )
}

/// First [`PREVIEW_CHARS`] of the article, cut on a char boundary, with an
/// ellipsis when anything was dropped.
fn preview_of(content: &str) -> String {
    if content.len() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let mut end = PREVIEW_CHARS;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &content[..end])
}

async fn save_synthesis(analysis: &str, synthesis_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    tokio::fs::create_dir_all(synthesis_dir).await?;

    let now = Local::now();
    let filename = format!("synthesis_{}.md", now.format("%Y-%m-%d_%H-%M"));
    let path = synthesis_dir.join(filename);

    let header = format!(
        "# Tech News Synthesis - {}\n\n\
         *Generated on {}*\n\n\
         *This analysis synthesizes insights from multiple AI and technology sources \
         to identify cross-cutting themes and emerging trends.*\n\n\
         ---\n\n",
        now.format("%B %d, %Y"),
        now.format("%Y-%m-%d %H:%M")
    );

    tokio::fs::write(&path, format!("{}{}", header, analysis)).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, content: &str) -> LoadedArticle {
        LoadedArticle {
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_preview_short_content_untouched() {
        assert_eq!(preview_of("short"), "short");
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let long = "x".repeat(PREVIEW_CHARS + 100);
        let preview = preview_of(&long);
        assert_eq!(preview.len(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_prompt_counts_articles_and_embeds_titles() {
        let articles = vec![
            article("First Post", "# First Post\n\nBody one."),
            article("Second Post", "# Second Post\n\nBody two."),
        ];
        let prompt = build_synthesis_prompt(&articles);
        assert!(prompt.contains("Below are 2 recent articles"));
        assert!(prompt.contains("**First Post**"));
        assert!(prompt.contains("**Second Post**"));
        assert!(prompt.contains("Body two."));
    }

    #[tokio::test]
    async fn test_load_articles_reads_titles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# Hello World\n\nText").unwrap();
        std::fs::write(dir.path().join("b.txt"), "not markdown").unwrap();

        let articles = load_articles(dir.path()).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Hello World");
    }

    #[tokio::test]
    async fn test_load_articles_missing_dir_is_empty() {
        let articles = load_articles(Path::new("/nonexistent/articles"))
            .await
            .unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn test_save_synthesis_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_synthesis("The analysis body.", dir.path()).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Tech News Synthesis - "));
        assert!(written.contains("*Generated on "));
        assert!(written.ends_with("The analysis body."));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("synthesis_"));
    }
}
