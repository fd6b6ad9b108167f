//! Progress ledger: which work items are done and which gave up.
//!
//! The file-backed ledger keeps two flat text files, one identifier per
//! line, appended to as each item reaches a terminal outcome. A crash loses
//! at most the item that was in flight.
//!
//! A missing file is an empty set. An identifier present in both files
//! counts as completed (it failed on an earlier run and succeeded later),
//! which keeps the two sets disjoint on load.
//!
//! Appends from one [`FileLedger`] are serialized internally. Two ledgers
//! (or two processes) pointed at the same files are not coordinated; give
//! each its own files.

use crate::error::ScrapeError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Persistence for per-item progress, injected into the batch loop.
pub trait ProgressLedger {
    /// Identifiers already completed.
    async fn completed(&self) -> Result<HashSet<String>, ScrapeError>;

    /// Identifiers that permanently failed and have not completed since.
    async fn failed(&self) -> Result<HashSet<String>, ScrapeError>;

    async fn mark_completed(&self, id: &str) -> Result<(), ScrapeError>;

    async fn mark_failed(&self, id: &str) -> Result<(), ScrapeError>;
}

/// Read a ledger file into a set of identifiers. Blank lines are ignored.
pub async fn load_ids(path: &Path) -> Result<HashSet<String>, ScrapeError> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(ScrapeError::io(path, e)),
    }
}

/// Append one identifier as a single line write.
pub async fn append_id(path: &Path, id: &str) -> Result<(), ScrapeError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| ScrapeError::io(path, e))?;
    file.write_all(format!("{id}\n").as_bytes())
        .await
        .map_err(|e| ScrapeError::io(path, e))?;
    file.flush().await.map_err(|e| ScrapeError::io(path, e))
}

/// Ledger backed by a completed-items file and a failed-items file.
#[derive(Debug)]
pub struct FileLedger {
    completed_path: PathBuf,
    failed_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(completed_path: impl Into<PathBuf>, failed_path: impl Into<PathBuf>) -> Self {
        Self {
            completed_path: completed_path.into(),
            failed_path: failed_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn completed_path(&self) -> &Path {
        &self.completed_path
    }

    pub fn failed_path(&self) -> &Path {
        &self.failed_path
    }
}

impl ProgressLedger for FileLedger {
    async fn completed(&self) -> Result<HashSet<String>, ScrapeError> {
        load_ids(&self.completed_path).await
    }

    async fn failed(&self) -> Result<HashSet<String>, ScrapeError> {
        let completed = load_ids(&self.completed_path).await?;
        let mut failed = load_ids(&self.failed_path).await?;
        failed.retain(|id| !completed.contains(id));
        Ok(failed)
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.completed_path.display()))]
    async fn mark_completed(&self, id: &str) -> Result<(), ScrapeError> {
        let _guard = self.write_lock.lock().await;
        append_id(&self.completed_path, id).await?;
        debug!("Marked completed");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.failed_path.display()))]
    async fn mark_failed(&self, id: &str) -> Result<(), ScrapeError> {
        let _guard = self.write_lock.lock().await;
        append_id(&self.failed_path, id).await?;
        debug!("Marked failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_is_empty_set() {
        let dir = tempdir().unwrap();
        let ids = load_ids(&dir.path().join("nope.txt")).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn load_ignores_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scraped_pages.txt");
        tokio::fs::write(&path, "1\n\n  2 \n3\n\n").await.unwrap();

        let ids = load_ids(&path).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("2"));
    }

    #[tokio::test]
    async fn file_ledger_round_trip() {
        let dir = tempdir().unwrap();
        let ledger = FileLedger::new(
            dir.path().join("scraped_pages.txt"),
            dir.path().join("failed_pages.txt"),
        );

        ledger.mark_completed("1").await.unwrap();
        ledger.mark_completed("2").await.unwrap();
        ledger.mark_failed("3").await.unwrap();

        let completed = ledger.completed().await.unwrap();
        let failed = ledger.failed().await.unwrap();
        assert_eq!(completed.len(), 2);
        assert!(completed.contains("1") && completed.contains("2"));
        assert_eq!(failed.len(), 1);
        assert!(failed.contains("3"));

        let text = tokio::fs::read_to_string(ledger.completed_path()).await.unwrap();
        assert_eq!(text, "1\n2\n");
    }

    #[tokio::test]
    async fn later_completion_removes_from_failed() {
        let dir = tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("done.txt"), dir.path().join("failed.txt"));

        ledger.mark_failed("7").await.unwrap();
        ledger.mark_completed("7").await.unwrap();

        assert!(ledger.completed().await.unwrap().contains("7"));
        assert!(ledger.failed().await.unwrap().is_empty());
    }
}
