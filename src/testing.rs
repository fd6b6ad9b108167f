//! Test doubles for the fetcher, pause and sink seams.

use crate::error::{FetchError, ScrapeError};
use crate::ledger::ProgressLedger;
use crate::fetch::{FetchRequest, PageFetcher};
use crate::models::{Page, TableRows, WorkItem};
use crate::outputs::RecordSink;
use crate::retry::Pause;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn page(html: &str) -> Page {
    Page {
        url: "https://example.com".into(),
        status: 200,
        html: html.into(),
    }
}

/// Plays back a fixed sequence of results, then repeats the fallback.
#[derive(Debug)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Page, FetchError>>>,
    fallback: Option<Result<Page, FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Page, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn repeating(result: Result<Page, FetchError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(result),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _request: &FetchRequest) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .unwrap_or(Err(FetchError::Network("script exhausted".into())))
    }
}

/// Serves canned documents by URL and logs every request. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pages: Arc<HashMap<String, Result<String, FetchError>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn new<I>(pages: I) -> Self
    where
        I: IntoIterator<Item = (String, Result<String, FetchError>)>,
    {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            requested: Arc::default(),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl PageFetcher for FakeSite {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError> {
        self.requested.lock().unwrap().push(request.url.clone());
        match self.pages.get(&request.url) {
            Some(Ok(html)) => Ok(Page {
                url: request.url.clone(),
                status: 200,
                html: html.clone(),
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::NotFound),
        }
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingPause {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPause {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Pause for RecordingPause {
    async fn pause(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

/// Collects appended tables in memory, keyed by work item id.
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<Vec<(String, TableRows)>>,
}

impl MemorySink {
    pub fn written(&self) -> Vec<(String, TableRows)> {
        self.written.lock().unwrap().clone()
    }

    pub fn record_count(&self) -> usize {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.records.len())
            .sum()
    }
}

impl RecordSink for MemorySink {
    async fn append(&self, item: &WorkItem, tables: Vec<TableRows>) -> Result<usize, ScrapeError> {
        let mut written = self.written.lock().unwrap();
        let mut count = 0;
        for table in tables {
            count += table.records.len();
            written.push((item.id.clone(), table));
        }
        Ok(count)
    }
}

/// In-memory progress ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerSets>,
}

#[derive(Debug, Default)]
struct LedgerSets {
    completed: HashSet<String>,
    failed: HashSet<String>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a set of already completed identifiers.
    pub fn with_completed<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ledger = Self::default();
        if let Ok(mut state) = ledger.state.lock() {
            state.completed = ids.into_iter().map(Into::into).collect();
        }
        ledger
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerSets) -> T) -> Result<T, ScrapeError> {
        self.state
            .lock()
            .map(|mut state| f(&mut state))
            .map_err(|_| ScrapeError::Config("memory ledger lock poisoned".into()))
    }
}

impl ProgressLedger for MemoryLedger {
    async fn completed(&self) -> Result<HashSet<String>, ScrapeError> {
        self.with_state(|s| s.completed.clone())
    }

    async fn failed(&self) -> Result<HashSet<String>, ScrapeError> {
        self.with_state(|s| s.failed.clone())
    }

    async fn mark_completed(&self, id: &str) -> Result<(), ScrapeError> {
        self.with_state(|s| {
            s.failed.remove(id);
            s.completed.insert(id.to_string());
        })
    }

    async fn mark_failed(&self, id: &str) -> Result<(), ScrapeError> {
        self.with_state(|s| {
            s.completed.remove(id);
            s.failed.insert(id.to_string());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_ledger_keeps_sets_disjoint() {
        let ledger = MemoryLedger::with_completed(["1"]);
        ledger.mark_failed("2").await.unwrap();
        ledger.mark_completed("2").await.unwrap();
        ledger.mark_failed("1").await.unwrap();

        let completed = ledger.completed().await.unwrap();
        let failed = ledger.failed().await.unwrap();
        assert!(completed.contains("2") && !completed.contains("1"));
        assert!(failed.contains("1") && !failed.contains("2"));
    }
}
