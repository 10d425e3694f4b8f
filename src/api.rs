//! Gemini API interaction with exponential backoff retry logic.
//!
//! This module provides a robust interface for the generative-language API
//! used to summarize articles. It includes automatic retry logic with
//! exponential backoff and jitter to handle transient failures gracefully.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async model interaction
//! - [`GeminiClient`]: reqwest-backed implementation of the Gemini REST API
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use rand::{rng, Rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

const GENERATE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Trait for async model interaction.
///
/// Implementors of this trait can send text to a generative model and
/// receive a response. This abstraction allows for different backends or
/// decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the model.
    type Response;

    /// Send text to the model and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`]
/// implementation.
///
/// This decorator transparently adds retry logic with exponential backoff
/// and jitter to handle transient API failures. It's designed to be
/// resilient against rate limiting, network issues, and temporary server
/// errors.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

// Wire types for the generateContent endpoint.

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiApiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiApiError {
    message: String,
}

/// reqwest-backed client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The API key never appears in logs
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiClient {
    /// One un-retried call to the `generateContent` endpoint.
    #[instrument(level = "info", skip_all, fields(model = %self.model, prompt_len = text.len()))]
    async fn generate(&self, text: &str) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let url = format!(
            "{}/{}:generateContent?key={}",
            GENERATE_ENDPOINT, self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(serde_json::to_string(&request)?)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(elapsed_ms = dt.as_millis() as u128, %status, "API call failed");
            return Err(format!("Gemini API returned {}: {}", status, raw).into());
        }

        let parsed: GeminiResponse = serde_json::from_str(&raw)?;
        if let Some(api_error) = parsed.error {
            return Err(format!("Gemini API error: {}", api_error.message).into());
        }

        parsed
            .candidates
            .and_then(|mut candidates| candidates.drain(..).next())
            .and_then(|mut candidate| candidate.content.parts.drain(..).next())
            .map(|part| part.text)
            .ok_or_else(|| "No content returned from Gemini".into())
    }
}

/// Borrowing adapter that lets a shared [`GeminiClient`] flow through the
/// [`RetryAsk`] decorator.
#[derive(Debug)]
struct ClientAsk<'a> {
    client: &'a GeminiClient,
}

impl<'a> AskAsync for ClientAsk<'a> {
    type Response = String;

    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        self.client.generate(text).await
    }
}

/// High-level function to call the model with exponential backoff retry
/// logic.
///
/// This is the primary entry point for sending prompts to Gemini. It
/// automatically wraps the request with retry logic to handle transient
/// failures gracefully.
///
/// # Retry Behavior
///
/// - Up to 5 retry attempts
/// - Exponential backoff: 1s, 2s, 4s, 8s, 16s (capped at 30s)
/// - Random jitter added to prevent thundering herd
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff(
    client: &GeminiClient,
    prompt: &str,
) -> Result<String, Box<dyn Error>> {
    let t0 = Instant::now();
    let api = RetryAsk::new(ClientAsk { client }, 5, StdDuration::from_secs(1));
    let res = api.ask(prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(
            elapsed_ms_total = dt.as_millis() as u128,
            "ask_with_backoff succeeded"
        ),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis() as u128, error = %e, "ask_with_backoff failed")
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct FlakyAsk {
        failures_remaining: Cell<usize>,
    }

    impl AskAsync for FlakyAsk {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            let remaining = self.failures_remaining.get();
            if remaining > 0 {
                self.failures_remaining.set(remaining - 1);
                Err("simulated transient failure".into())
            } else {
                Ok(format!("echo: {}", text))
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let inner = FlakyAsk {
            failures_remaining: Cell::new(2),
        };
        let api = RetryAsk::new(inner, 5, StdDuration::from_millis(1));
        let response = api.ask("hello").await.unwrap();
        assert_eq!(response, "echo: hello");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_error() {
        let inner = FlakyAsk {
            failures_remaining: Cell::new(100),
        };
        let api = RetryAsk::new(inner, 2, StdDuration::from_millis(1));
        assert!(api.ask("hello").await.is_err());
    }

    #[test]
    fn test_gemini_request_serialization() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: "Summarize this".to_string(),
                }],
            }],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("contents"));
        assert!(json.contains("Summarize this"));
    }

    #[test]
    fn test_gemini_response_success_shape() {
        let json = r#"{
            "candidates": [{
                "content": { "parts": [{"text": "A summary."}] }
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        let text = &response.candidates.unwrap()[0].content.parts[0].text;
        assert_eq!(text, "A summary.");
    }

    #[test]
    fn test_gemini_response_error_shape() {
        let json = r#"{"error": {"message": "API key invalid"}}"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert!(response.candidates.is_none());
        assert_eq!(response.error.unwrap().message, "API key invalid");
    }
}
