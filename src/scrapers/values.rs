//! Ranked market-value listing.
//!
//! Walks the numbered listing pages, reads every player row leniently, and
//! appends them to one CSV. Page numbers are the ledger identifiers.

use super::{Job, LedgerFiles, run_job};
use crate::cli::ValuesArgs;
use crate::config::{FileConfig, Settings, VALUES_DEFAULTS};
use crate::error::ScrapeError;
use crate::extract::extract_listing;
use crate::fetch::{Awaited, FetchRequest};
use crate::models::{Page, Summary, TableRows, WorkItem};
use crate::outputs::csv::CsvTable;
use crate::worklist::page_range;
use scraper::Html;
use std::path::PathBuf;
use tracing::instrument;
use url::Url;

pub const SITE: &str = "https://www.footballtransfers.com";
pub const PAGE_TEMPLATE: &str =
    "https://www.footballtransfers.com/en/values/players/most-valuable-players/{}";
/// The listing table is rendered late; a page without a player link is incomplete.
pub const PLAYER_LINK: &str = "td.td-player a[title]";

pub const DEFAULT_OUTPUT: &str = "most_valuable_players_fast.csv";
const LEDGER: LedgerFiles = LedgerFiles {
    completed: "scraped_pages.txt",
    failed: "failed_pages.txt",
};

#[derive(Debug, Clone)]
pub struct ValuesJob {
    base: Url,
    awaited: Awaited,
}

impl ValuesJob {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            base: Url::parse(SITE)?,
            awaited: Awaited::parse(PLAYER_LINK)?,
        })
    }
}

impl Job for ValuesJob {
    fn request(&self, item: &WorkItem) -> FetchRequest {
        FetchRequest::new(item.target.clone()).wait_for(self.awaited.clone())
    }

    fn extract(&self, _item: &WorkItem, page: &Page) -> Vec<TableRows> {
        let document = Html::parse_document(&page.html);
        vec![TableRows::unnamed(extract_listing(&document, &self.base))]
    }
}

/// Scrape listing pages `first_page..=last_page`.
#[instrument(level = "info", skip_all, fields(first = args.first_page, last = args.last_page))]
pub async fn scrape(args: &ValuesArgs, config: &FileConfig) -> Result<Summary, ScrapeError> {
    let settings = Settings::resolve(&VALUES_DEFAULTS, config, &args.run)?;
    let items = page_range(PAGE_TEMPLATE, args.first_page, args.last_page);
    let output = args
        .run
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let table = CsvTable::open(&output, Some("Player URL")).await?;

    run_job(ValuesJob::new()?, table, &items, &settings, &args.run, LEDGER).await
}
