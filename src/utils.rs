//! Utility functions for string manipulation and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Filename sanitization for saved article files
//! - String truncation for logging and for digest headings
//! - File system validation for output directories

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static NON_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// Turn an article title into a safe filename fragment.
///
/// Strips everything except word characters, whitespace, and hyphens,
/// collapses whitespace/hyphen runs into single hyphens, and caps the
/// result at 50 characters.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_filename("Hello, World!"), "Hello-World");
/// ```
pub fn sanitize_filename(title: &str) -> String {
    let stripped = NON_FILENAME_CHARS.replace_all(title, "");
    let hyphenated = DASH_RUNS.replace_all(stripped.trim(), "-");
    hyphenated.chars().take(50).collect()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes with an ellipsis and byte
/// count indicator appended. Truncation backs up to a char boundary so
/// multi-byte input never panics.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…(+{} bytes)", &s[..end], s.len() - end)
    }
}

/// Truncate a heading title to at most 80 characters.
///
/// Titles longer than 80 characters are cut at 77 and suffixed with `...`
/// so digest headings stay scannable.
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() > 80 {
        let head: String = title.chars().take(77).collect();
        format!("{}...", head)
    } else {
        title.to_string()
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test
/// by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
