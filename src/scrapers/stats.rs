//! All-competition stats pages.
//!
//! Every identified table on a player's stats page is written to its own
//! CSV inside a folder named `{Name}_{player id}`. Tables are read with the
//! strict, header-aligned extractor.

use super::{Job, LedgerFiles, run_job};
use crate::cli::StatsArgs;
use crate::config::{FileConfig, STATS_DEFAULTS, Settings};
use crate::error::ScrapeError;
use crate::extract::extract_all_tables;
use crate::fetch::FetchRequest;
use crate::models::{Page, Summary, TableRows, WorkItem};
use crate::outputs::csv::CsvFolder;
use crate::utils::ensure_writable_dir;
use crate::worklist::InputTable;
use itertools::Itertools;
use scraper::Html;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const SITE: &str = "https://fbref.com";
pub const DEFAULT_OUTPUT: &str = "all_players_fbref_tables";
const LEDGER: LedgerFiles = LedgerFiles {
    completed: "stats_completed.txt",
    failed: "stats_failed.txt",
};

/// Player id of a stats URL: the segment after `/en/players/`.
pub fn player_id(url: &str) -> Option<&str> {
    url.split('/').nth(5).filter(|id| !id.is_empty())
}

/// One item per distinct player whose `fbref_alltimestat` is a stats URL.
pub fn stat_items(table: &InputTable) -> Result<Vec<WorkItem>, ScrapeError> {
    let cols = table.require(&["fbref_alltimestat", "Name"])?;
    let (url_col, name_col) = (cols[0], cols[1]);

    let items: Vec<WorkItem> = table
        .rows()
        .iter()
        .filter_map(|row| {
            let url = InputTable::cell(row, url_col);
            let name = InputTable::cell(row, name_col);
            if name.is_empty() || !url.starts_with(SITE) {
                return None;
            }
            let Some(id) = player_id(url) else {
                warn!(%url, "Stats URL has no player id; skipping");
                return None;
            };
            Some(WorkItem::new(id, url).with_label(format!("{name}_{id}")))
        })
        .unique_by(|item| item.id.clone())
        .collect();
    info!(items = items.len(), "Built stats work list");
    Ok(items)
}

#[derive(Debug, Clone)]
pub struct StatsJob {
    base: Url,
}

impl StatsJob {
    pub fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            base: Url::parse(SITE)?,
        })
    }
}

impl Job for StatsJob {
    fn request(&self, item: &WorkItem) -> FetchRequest {
        FetchRequest::new(item.target.clone())
    }

    fn extract(&self, item: &WorkItem, page: &Page) -> Vec<TableRows> {
        // Secondary tables ship inside HTML comments until a script reveals them.
        let html = page.html.replace("<!--", "").replace("-->", "");
        let document = Html::parse_document(&html);
        let tables: Vec<TableRows> = extract_all_tables(&document, &self.base)
            .into_iter()
            .map(|(id, records)| TableRows::named(id, records))
            .collect();
        debug!(
            player = %item.label,
            tables = ?tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "Found stats tables"
        );
        tables
    }
}

#[instrument(level = "info", skip_all, fields(input = %args.input.display()))]
pub async fn scrape(args: &StatsArgs, config: &FileConfig) -> Result<Summary, ScrapeError> {
    let settings = Settings::resolve(&STATS_DEFAULTS, config, &args.run)?;
    let input = InputTable::read(&args.input).await?;
    let items = stat_items(&input)?;
    let root = args
        .run
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    ensure_writable_dir(&root).await?;

    run_job(StatsJob::new()?, CsvFolder::new(root), &items, &settings, &args.run, LEDGER).await
}
