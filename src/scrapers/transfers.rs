//! Transfer histories for every player of a listing CSV.

use super::{Job, LedgerFiles, run_job};
use crate::cli::TransfersArgs;
use crate::config::{FileConfig, Settings, TRANSFERS_DEFAULTS};
use crate::error::ScrapeError;
use crate::extract::extract_transfers;
use crate::fetch::FetchRequest;
use crate::models::{Page, Summary, TableRows, WorkItem};
use crate::outputs::csv::CsvTable;
use crate::worklist::InputTable;
use scraper::Html;
use std::path::PathBuf;
use tracing::{info, instrument};

pub const DEFAULT_OUTPUT: &str = "compiled_transfers.csv";
const LEDGER: LedgerFiles = LedgerFiles {
    completed: "transfers_completed.txt",
    failed: "transfers_failed.txt",
};

/// One item per row with a `Player URL`. The id is the row's position in
/// the file, which is also the `Player Index` written out.
pub fn transfer_items(table: &InputTable) -> Result<Vec<WorkItem>, ScrapeError> {
    let url_col = table.require_any(&["Player URL"])?;
    let items: Vec<WorkItem> = table
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let url = InputTable::cell(row, url_col).trim_end_matches('/');
            if url.is_empty() {
                return None;
            }
            let slug = url.rsplit('/').next().unwrap_or(url);
            Some(WorkItem::new(index.to_string(), url).with_label(slug))
        })
        .collect();
    info!(items = items.len(), "Built transfer work list");
    Ok(items)
}

#[derive(Debug, Clone, Default)]
pub struct TransfersJob;

impl Job for TransfersJob {
    fn request(&self, item: &WorkItem) -> FetchRequest {
        FetchRequest::new(format!("{}/transfer-history", item.target))
    }

    fn extract(&self, item: &WorkItem, page: &Page) -> Vec<TableRows> {
        let document = Html::parse_document(&page.html);
        vec![TableRows::unnamed(extract_transfers(&document, &item.id, &item.label))]
    }
}

#[instrument(level = "info", skip_all, fields(input = %args.input.display()))]
pub async fn scrape(args: &TransfersArgs, config: &FileConfig) -> Result<Summary, ScrapeError> {
    let settings = Settings::resolve(&TRANSFERS_DEFAULTS, config, &args.run)?;
    let input = InputTable::read(&args.input).await?;
    let items = transfer_items(&input)?;
    let output = args
        .run
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let table = CsvTable::open(&output, Some("Player Index")).await?;

    run_job(TransfersJob, table, &items, &settings, &args.run, LEDGER).await
}
