//! The batch scrape loop.
//!
//! For every work item not yet in the completed ledger: courtesy pause,
//! fetch with retries, extract, append to the output, mark the ledger.
//! Every per-item failure is caught and logged here; only environment
//! errors (an unreadable ledger, no sessions) abort a run.
//!
//! With more than one session the work list is cut into contiguous
//! partitions, one per session. Partitions run concurrently, each one
//! strictly in order. Sessions never share a connection.

use crate::error::ScrapeError;
use crate::fetch::PageFetcher;
use crate::ledger::ProgressLedger;
use crate::models::{Summary, WorkItem};
use crate::outputs::RecordSink;
use crate::retry::{FetchOutcome, Pause, RetryFetch, RetryPolicy, TokioPause};
use crate::scrapers::Job;
use crate::utils::truncate_for_log;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Scraped,
    Failed,
    /// Rate-limited; not recorded in the ledger so the next run retries it.
    CooledDown,
}

/// Orchestrates one run of a [`Job`] over a work list.
pub struct BatchScraper<J, S, L, P = TokioPause> {
    job: J,
    sink: S,
    ledger: L,
    retry: RetryPolicy,
    delay: Duration,
    pause: P,
}

impl<J, S, L> BatchScraper<J, S, L, TokioPause> {
    pub fn new(job: J, sink: S, ledger: L, retry: RetryPolicy) -> Self {
        Self {
            job,
            sink,
            ledger,
            retry,
            delay: Duration::ZERO,
            pause: TokioPause,
        }
    }
}

impl<J, S, L, P> BatchScraper<J, S, L, P> {
    /// Courtesy pause taken before every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_pause<Q>(self, pause: Q) -> BatchScraper<J, S, L, Q> {
        BatchScraper {
            job: self.job,
            sink: self.sink,
            ledger: self.ledger,
            retry: self.retry,
            delay: self.delay,
            pause,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<J, S, L, P> BatchScraper<J, S, L, P>
where
    J: Job,
    S: RecordSink,
    L: ProgressLedger,
    P: Pause + Clone,
{
    /// Run the job over `items` with one worker per session.
    #[instrument(level = "info", skip_all, fields(items = items.len(), sessions = sessions.len()))]
    pub async fn run<F: PageFetcher>(
        &self,
        items: &[WorkItem],
        sessions: Vec<F>,
    ) -> Result<Summary, ScrapeError> {
        if sessions.is_empty() {
            return Err(ScrapeError::Config("at least one fetch session is required".into()));
        }
        let t0 = Instant::now();
        let completed = self.ledger.completed().await?;
        let failed_before = self.ledger.failed().await?;
        info!(
            completed = completed.len(),
            failed_before = failed_before.len(),
            "Loaded progress ledger"
        );

        let partition = items.len().div_ceil(sessions.len()).max(1);
        let workers = items
            .chunks(partition)
            .zip(sessions)
            .enumerate()
            .map(|(worker, (part, session))| self.run_partition(worker, session, part, &completed));
        let summaries = join_all(workers).await;

        let mut summary = Summary::default();
        for s in summaries {
            summary += s;
        }
        let elapsed = t0.elapsed();
        info!(
            scraped = summary.scraped,
            failed = summary.failed,
            skipped = summary.skipped,
            ?elapsed,
            "Batch complete"
        );
        Ok(summary)
    }

    #[instrument(level = "info", skip_all, fields(worker = worker, items = items.len()))]
    async fn run_partition<F: PageFetcher>(
        &self,
        worker: usize,
        session: F,
        items: &[WorkItem],
        completed: &HashSet<String>,
    ) -> Summary {
        let fetcher = RetryFetch::new(session, self.retry.clone(), self.pause.clone());
        let mut summary = Summary::default();

        for item in items {
            if completed.contains(&item.id) {
                debug!(item = %item.id, "Already completed; skipping");
                summary.skipped += 1;
                continue;
            }
            match self.process(&fetcher, item).await {
                ItemOutcome::Scraped => summary.scraped += 1,
                ItemOutcome::Failed | ItemOutcome::CooledDown => summary.failed += 1,
            }
        }

        info!(
            scraped = summary.scraped,
            failed = summary.failed,
            skipped = summary.skipped,
            "Worker finished"
        );
        summary
    }

    #[instrument(level = "info", skip_all, fields(item = %item.id, label = %item.label))]
    async fn process<F: PageFetcher>(&self, fetcher: &RetryFetch<F, P>, item: &WorkItem) -> ItemOutcome {
        let tables = match self.job.known(item) {
            Some(tables) => {
                debug!("Resolved without fetching");
                tables
            }
            None => {
                if !self.delay.is_zero() {
                    self.pause.pause(self.delay).await;
                }
                let request = self.job.request(item);
                let outcome = fetcher.fetch(&request).await;
                debug!(attempts = outcome.attempts(), "Fetch finished");
                match outcome {
                    FetchOutcome::Success { page, .. } => self.job.extract(item, &page),
                    FetchOutcome::Cooldown { .. } => {
                        warn!("Rate limited; leaving item for a later run");
                        return ItemOutcome::CooledDown;
                    }
                    FetchOutcome::Failed { attempts, error } => {
                        error!(
                            attempts,
                            error = %truncate_for_log(&error.to_string(), 300),
                            "Giving up on item"
                        );
                        self.record_failure(item).await;
                        return ItemOutcome::Failed;
                    }
                }
            }
        };

        let extracted: usize = tables.iter().map(|t| t.records.len()).sum();
        if extracted == 0 {
            warn!("No records extracted from document");
        }

        match self.sink.append(item, tables).await {
            Ok(written) => {
                info!(extracted, written, "Saved item");
                if let Err(e) = self.ledger.mark_completed(&item.id).await {
                    error!(error = %e, "Could not record completion");
                }
                ItemOutcome::Scraped
            }
            Err(e) => {
                error!(error = %e, "Failed to write records");
                self.record_failure(item).await;
                ItemOutcome::Failed
            }
        }
    }

    async fn record_failure(&self, item: &WorkItem) {
        if let Err(e) = self.ledger.mark_failed(&item.id).await {
            error!(item = %item.id, error = %e, "Could not record failure");
        }
    }
}
