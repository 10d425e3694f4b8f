//! Durable run-state bookkeeping and work selection.
//!
//! The state store tracks which article files have already been summarized
//! and which attempts failed, so repeated runs only pay for new work and
//! failures get retried. Two small JSON files live in the state directory:
//!
//! - `last_run.json`: timestamp/date of the last completed summarize cycle
//! - `processed_articles.json`: the processed and failed filename sets
//!
//! Reads of missing, empty, or corrupt state files always yield defaults —
//! losing state degrades to re-summarizing, never to a crash. Writes are
//! whole-file overwrites; the process owns the directory end-to-end, so
//! last-write-wins is acceptable.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Contents of `last_run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// ISO-8601 local timestamp of the last completed run.
    pub timestamp: String,
    /// Same instant as a `YYYY-MM-DD` date string.
    pub date: String,
}

/// Contents of `processed_articles.json`.
///
/// The two sets are kept disjoint by the callers' protocol: every filename
/// passed to [`StateStore::add_processed`] must also go through
/// [`StateStore::clear_failed`] in the same pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedState {
    #[serde(default)]
    pub processed_articles: BTreeSet<String>,
    #[serde(default)]
    pub failed_articles: BTreeSet<String>,
    #[serde(default)]
    pub last_updated: String,
}

/// Location of today's digest, when one already exists.
#[derive(Debug, Clone)]
pub struct DigestInfo {
    pub path: PathBuf,
    pub date: String,
}

/// Handle to the on-disk state directory.
///
/// Constructed once per run and passed by reference into the components
/// that need it; there are no process-wide singletons.
#[derive(Debug)]
pub struct StateStore {
    last_run_path: PathBuf,
    processed_path: PathBuf,
}

impl StateStore {
    /// Open (and create if needed) the state directory.
    pub fn new(state_dir: &Path) -> Result<StateStore, Box<dyn Error>> {
        std::fs::create_dir_all(state_dir)?;
        Ok(StateStore {
            last_run_path: state_dir.join("last_run.json"),
            processed_path: state_dir.join("processed_articles.json"),
        })
    }

    fn load_processed_state(&self) -> ProcessedState {
        load_or_default(&self.processed_path)
    }

    fn store_processed_state(&self, state: &ProcessedState) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.processed_path, json)?;
        Ok(())
    }

    /// The set of article filenames that have been successfully summarized.
    pub fn processed(&self) -> BTreeSet<String> {
        self.load_processed_state().processed_articles
    }

    /// The set of article filenames whose last summarization attempt failed.
    pub fn failed(&self) -> BTreeSet<String> {
        self.load_processed_state().failed_articles
    }

    /// Union `filenames` into the processed set and persist.
    #[instrument(level = "debug", skip_all, fields(count = filenames.len()))]
    pub fn add_processed<S: AsRef<str>>(&self, filenames: &[S]) -> Result<(), Box<dyn Error>> {
        let mut state = self.load_processed_state();
        for name in filenames {
            state.processed_articles.insert(name.as_ref().to_string());
        }
        state.last_updated = Local::now().to_rfc3339();
        self.store_processed_state(&state)
    }

    /// Union `filenames` into the failed set (eligible for retry) and persist.
    #[instrument(level = "debug", skip_all, fields(count = filenames.len()))]
    pub fn add_failed<S: AsRef<str>>(&self, filenames: &[S]) -> Result<(), Box<dyn Error>> {
        let mut state = self.load_processed_state();
        for name in filenames {
            state.failed_articles.insert(name.as_ref().to_string());
        }
        state.last_updated = Local::now().to_rfc3339();
        self.store_processed_state(&state)
    }

    /// Remove `filenames` from the failed set.
    ///
    /// Must be called for everything passed to [`add_processed`] in the same
    /// pass; that keeps the processed and failed sets disjoint.
    ///
    /// [`add_processed`]: StateStore::add_processed
    #[instrument(level = "debug", skip_all, fields(count = filenames.len()))]
    pub fn clear_failed<S: AsRef<str>>(&self, filenames: &[S]) -> Result<(), Box<dyn Error>> {
        let mut state = self.load_processed_state();
        for name in filenames {
            state.failed_articles.remove(name.as_ref());
        }
        state.last_updated = Local::now().to_rfc3339();
        self.store_processed_state(&state)
    }

    /// Timestamp of the last completed summarize cycle, if any.
    pub fn last_run_time(&self) -> Option<String> {
        let metadata: Option<RunMetadata> = load_optional(&self.last_run_path);
        metadata.map(|m| m.timestamp)
    }

    /// Overwrite the run metadata with the current time.
    pub fn record_run_completion(&self) -> Result<(), Box<dyn Error>> {
        let now = Local::now();
        let metadata = RunMetadata {
            timestamp: now.to_rfc3339(),
            date: now.format("%Y-%m-%d").to_string(),
        };
        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&self.last_run_path, json)?;
        Ok(())
    }

    /// Select the articles that need (re)processing this run.
    ///
    /// A path is kept iff its filename is not in the processed set, or is in
    /// the failed set (failed always wins, so retries happen even for a
    /// filename that somehow landed in both). Input order is preserved.
    pub fn select_for_processing(&self, all_article_files: &[PathBuf]) -> Vec<PathBuf> {
        let state = self.load_processed_state();
        let selected: Vec<PathBuf> = all_article_files
            .iter()
            .filter(|path| {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                !state.processed_articles.contains(&filename)
                    || state.failed_articles.contains(&filename)
            })
            .cloned()
            .collect();
        debug!(
            total = all_article_files.len(),
            selected = selected.len(),
            "Selected articles for processing"
        );
        selected
    }

    /// Check whether a digest for the current calendar date already exists.
    pub fn digest_for_today(&self, digest_dir: &Path) -> Option<DigestInfo> {
        let today = Local::now().format("%Y-%m-%d").to_string();
        let path = digest_dir.join(format!("{}-daily-digest.md", today));
        if path.exists() {
            Some(DigestInfo { path, date: today })
        } else {
            None
        }
    }
}

/// Read a JSON file into `T`, treating missing/corrupt files as `T::default()`.
fn load_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return T::default();
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

/// Read a JSON file into `Option<T>`, treating missing/corrupt files as `None`.
fn load_optional<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> StateStore {
        StateStore::new(dir).unwrap()
    }

    #[test]
    fn test_empty_store_returns_empty_sets() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.processed().is_empty());
        assert!(store.failed().is_empty());
        assert!(store.last_run_time().is_none());
    }

    #[test]
    fn test_corrupt_state_file_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("processed_articles.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("last_run.json"), "").unwrap();

        let store = store_in(dir.path());
        assert!(store.processed().is_empty());
        assert!(store.failed().is_empty());
        assert!(store.last_run_time().is_none());
    }

    #[test]
    fn test_add_processed_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.add_processed(&["a.md", "b.md"]).unwrap();
        store.add_processed(&["c.md"]).unwrap();

        let processed = store.processed();
        assert_eq!(processed.len(), 3);
        assert!(processed.contains("a.md"));
        assert!(processed.contains("c.md"));
    }

    #[test]
    fn test_failed_add_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.add_failed(&["f1.md", "f2.md", "f3.md"]).unwrap();
        store.clear_failed(&["f1.md"]).unwrap();

        let failed = store.failed();
        assert_eq!(
            failed,
            BTreeSet::from(["f2.md".to_string(), "f3.md".to_string()])
        );
    }

    #[test]
    fn test_retry_lifecycle_keeps_sets_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.add_failed(&["a.md"]).unwrap();
        store.add_processed(&["a.md"]).unwrap();
        store.clear_failed(&["a.md"]).unwrap();

        assert_eq!(store.processed(), BTreeSet::from(["a.md".to_string()]));
        assert!(store.failed().is_empty());
    }

    #[test]
    fn test_record_run_completion() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.record_run_completion().unwrap();
        let timestamp = store.last_run_time().unwrap();
        // Should parse back as a valid RFC 3339 instant
        assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
    }

    #[test]
    fn test_select_for_processing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.add_processed(&["done1.md", "done2.md"]).unwrap();
        store.add_failed(&["retry.md"]).unwrap();
        // A filename in both sets is still retried
        store.add_processed(&["retry.md"]).unwrap();

        let all: Vec<PathBuf> = ["done1.md", "retry.md", "new.md", "done2.md"]
            .iter()
            .map(|f| PathBuf::from("/articles").join(f))
            .collect();

        let selected = store.select_for_processing(&all);
        let names: Vec<String> = selected
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["retry.md", "new.md"]);
    }

    #[test]
    fn test_select_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.add_processed(&["p.md"]).unwrap();

        let all = vec![PathBuf::from("p.md"), PathBuf::from("q.md")];
        assert_eq!(
            store.select_for_processing(&all),
            store.select_for_processing(&all)
        );
    }

    #[test]
    fn test_digest_for_today() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let digest_dir = dir.path().join("digests");
        std::fs::create_dir_all(&digest_dir).unwrap();

        assert!(store.digest_for_today(&digest_dir).is_none());

        let today = Local::now().format("%Y-%m-%d").to_string();
        let digest_path = digest_dir.join(format!("{}-daily-digest.md", today));
        std::fs::write(&digest_path, "# Daily Digest\n").unwrap();

        let info = store.digest_for_today(&digest_dir).unwrap();
        assert_eq!(info.date, today);
        assert_eq!(info.path, digest_path);
    }
}
