//! Scrape jobs: what to fetch for a work item and how to read the result.
//!
//! Every job runs through the same [`BatchScraper`](crate::scrape::BatchScraper)
//! loop; a job only supplies the request for an item and the extractor for
//! its page.
//!
//! # Jobs
//!
//! | Job | Module | Work list | Output |
//! |-----|--------|-----------|--------|
//! | Market values | [`values`] | listing page numbers | one appended CSV |
//! | Transfer history | [`transfers`] | `Player URL` column | one appended CSV |
//! | All-competition stats | [`stats`] | `fbref_alltimestat` column | a folder of CSVs per player |
//! | Profile resolver | [`resolve`] | `Name` and `Team` columns | appended `fbref_url` CSV |
//!
//! Each module exports an async `scrape(args, config)` entry point that
//! builds the work list, layers the settings, and runs the batch.

pub mod resolve;
pub mod stats;
pub mod transfers;
pub mod values;

use crate::cli::RunArgs;
use crate::config::Settings;
use crate::error::ScrapeError;
use crate::fetch::{FetchRequest, HttpFetcher};
use crate::ledger::FileLedger;
use crate::models::{Page, Summary, TableRows, WorkItem};
use crate::outputs::RecordSink;
use crate::scrape::BatchScraper;
use std::path::PathBuf;
use tracing::info;

/// The per-site half of a scrape.
pub trait Job {
    /// Request to issue for `item`.
    fn request(&self, item: &WorkItem) -> FetchRequest;

    /// Records read from the fetched page. An empty result is not an error.
    fn extract(&self, item: &WorkItem, page: &Page) -> Vec<TableRows>;

    /// Output that is already known without fetching, if any.
    fn known(&self, _item: &WorkItem) -> Option<Vec<TableRows>> {
        None
    }
}

/// Default file names for one job's progress ledger.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LedgerFiles {
    pub completed: &'static str,
    pub failed: &'static str,
}

impl LedgerFiles {
    fn resolve(&self, args: &RunArgs) -> FileLedger {
        FileLedger::new(
            args.completed_log
                .clone()
                .unwrap_or_else(|| PathBuf::from(self.completed)),
            args.failed_log
                .clone()
                .unwrap_or_else(|| PathBuf::from(self.failed)),
        )
    }
}

/// Run `job` over `items` with one HTTP session per worker.
pub(crate) async fn run_job<J, S>(
    job: J,
    sink: S,
    items: &[WorkItem],
    settings: &Settings,
    args: &RunArgs,
    ledger: LedgerFiles,
) -> Result<Summary, ScrapeError>
where
    J: Job,
    S: RecordSink,
{
    let ledger = ledger.resolve(args);
    info!(
        items = items.len(),
        concurrency = settings.concurrency,
        max_attempts = settings.retry.max_attempts,
        completed_log = %ledger.completed_path().display(),
        failed_log = %ledger.failed_path().display(),
        "Starting batch"
    );
    let sessions = HttpFetcher::pool(&settings.fetch, settings.concurrency)?;
    BatchScraper::new(job, sink, ledger, settings.retry.clone())
        .with_delay(settings.delay)
        .run(items, sessions)
        .await
}
