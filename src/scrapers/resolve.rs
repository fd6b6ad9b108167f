//! Profile resolver: find each player's stats-site profile URL through a
//! web search.
//!
//! Pairs already resolved (in a reference CSV, or in the input's own
//! `fbref_url` column) are written without searching. A search that finds
//! no profile link still counts as done; its row carries an empty URL, and
//! with a debug directory the result page is kept as
//! `debug_{index}_{name}.html` for inspection.

use super::{Job, LedgerFiles, run_job};
use crate::cli::ResolveArgs;
use crate::config::{FileConfig, RESOLVE_DEFAULTS, Settings};
use crate::error::ScrapeError;
use crate::extract::first_link_containing;
use crate::fetch::FetchRequest;
use crate::models::{Page, Record, Summary, TableRows, Value, WorkItem};
use crate::outputs::csv::CsvTable;
use crate::utils::{ensure_writable_dir, sanitize_file_name};
use crate::worklist::InputTable;
use scraper::Html;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const SEARCH: &str = "https://duckduckgo.com/html/";
pub const PROFILE_MARKER: &str = "fbref.com/en/players/";
pub const DEFAULT_OUTPUT: &str = "fbref_urls.csv";
const LEDGER: LedgerFiles = LedgerFiles {
    completed: "resolve_completed.txt",
    failed: "resolve_failed.txt",
};
const TEAM_COLUMNS: [&str; 2] = ["Team", "Club"];

/// Search URL for one player.
pub fn search_url(name: &str, team: &str) -> String {
    let query = format!("site:fbref.com {name} {team} fbref profile");
    format!("{SEARCH}?q={}", urlencoding::encode(&query).replace("%20", "+"))
}

/// Known profile URLs keyed by trimmed `(name, team)`.
pub type KnownProfiles = HashMap<(String, String), String>;

/// Non-empty `fbref_url` values of a table, keyed by name and team.
/// Tables without the URL column contribute nothing.
pub fn known_profiles(table: &InputTable) -> Result<KnownProfiles, ScrapeError> {
    let Some(url_col) = table.column("fbref_url") else {
        return Ok(KnownProfiles::new());
    };
    let name_col = table.require_any(&["Name"])?;
    let team_col = table.require_any(&TEAM_COLUMNS)?;

    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            let url = InputTable::cell(row, url_col);
            (!url.is_empty()).then(|| {
                (
                    (
                        InputTable::cell(row, name_col).to_string(),
                        InputTable::cell(row, team_col).to_string(),
                    ),
                    url.to_string(),
                )
            })
        })
        .collect())
}

/// One item per named row; the id is the row's position in the file.
pub fn resolve_items(table: &InputTable) -> Result<Vec<WorkItem>, ScrapeError> {
    let name_col = table.require_any(&["Name"])?;
    let team_col = table.require_any(&TEAM_COLUMNS)?;

    let items: Vec<WorkItem> = table
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let name = InputTable::cell(row, name_col);
            let team = InputTable::cell(row, team_col);
            (!name.is_empty()).then(|| {
                WorkItem::new(index.to_string(), search_url(name, team))
                    .with_label(name)
                    .with_team(team)
            })
        })
        .collect();
    info!(items = items.len(), "Built resolver work list");
    Ok(items)
}

#[derive(Debug, Clone)]
pub struct ResolveJob {
    base: Url,
    known: KnownProfiles,
    debug_dir: Option<PathBuf>,
}

impl ResolveJob {
    pub fn new(known: KnownProfiles) -> Result<Self, ScrapeError> {
        Ok(Self {
            base: Url::parse(SEARCH)?,
            known,
            debug_dir: None,
        })
    }

    /// Keep search pages without a profile link under `dir`.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    pub fn debug_path(&self, item: &WorkItem) -> Option<PathBuf> {
        self.debug_dir.as_ref().map(|dir| {
            dir.join(sanitize_file_name(&format!(
                "debug_{}_{}.html",
                item.id, item.label
            )))
        })
    }

    fn keep_miss(&self, item: &WorkItem, page: &Page) {
        let Some(path) = self.debug_path(item) else {
            return;
        };
        match std::fs::write(&path, &page.html) {
            Ok(()) => debug!(path = %path.display(), "Saved search page"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not save search page"),
        }
    }

    fn row(item: &WorkItem, url: Option<String>) -> Vec<TableRows> {
        let index = item
            .id
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::text(item.id.as_str()));
        vec![TableRows::unnamed(vec![
            Record::new()
                .with("Index", index)
                .with("Name", Value::text(item.label.as_str()))
                .with("Team", item.team.clone())
                .with("fbref_url", Value::Text(url.unwrap_or_default())),
        ])]
    }
}

impl Job for ResolveJob {
    fn request(&self, item: &WorkItem) -> FetchRequest {
        FetchRequest::new(item.target.clone())
    }

    fn extract(&self, item: &WorkItem, page: &Page) -> Vec<TableRows> {
        let document = Html::parse_document(&page.html);
        let found = first_link_containing(&document, &self.base, PROFILE_MARKER);
        match &found {
            Some(url) => info!(player = %item.label, %url, "Found profile"),
            None => {
                info!(player = %item.label, "No profile link in results");
                self.keep_miss(item, page);
            }
        }
        Self::row(item, found)
    }

    fn known(&self, item: &WorkItem) -> Option<Vec<TableRows>> {
        let key = (item.label.clone(), item.team.clone().unwrap_or_default());
        let url = self.known.get(&key)?;
        debug!(player = %item.label, %url, "Profile already known");
        Some(Self::row(item, Some(url.clone())))
    }
}

#[instrument(level = "info", skip_all, fields(input = %args.input.display()))]
pub async fn scrape(args: &ResolveArgs, config: &FileConfig) -> Result<Summary, ScrapeError> {
    let settings = Settings::resolve(&RESOLVE_DEFAULTS, config, &args.run)?;
    let input = InputTable::read(&args.input).await?;
    let items = resolve_items(&input)?;

    let mut known = known_profiles(&input)?;
    if let Some(reference) = &args.reference {
        let reference = InputTable::read(reference).await?;
        reference.require(&["Name", "fbref_url"])?;
        // the reference wins over stale values in the input
        known.extend(known_profiles(&reference)?);
    }
    info!(known = known.len(), "Loaded known profiles");

    let output = args
        .run
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let table = CsvTable::open(&output, Some("Index")).await?;

    let mut job = ResolveJob::new(known)?;
    if let Some(dir) = &args.debug_dir {
        ensure_writable_dir(dir).await?;
        job = job.with_debug_dir(dir);
    }
    run_job(job, table, &items, &settings, &args.run, LEDGER).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ProgressLedger;
    use crate::retry::RetryPolicy;
    use crate::scrape::BatchScraper;
    use crate::testing::{FakeSite, MemoryLedger, MemorySink, RecordingPause, page};

    fn players() -> InputTable {
        InputTable::from_bytes(
            "players.csv",
            b"Name,Team,fbref_url\nErling Haaland,Man City,\nBukayo Saka,Arsenal,https://fbref.com/en/players/bc7dc64d/Bukayo-Saka\n,Nobody,\n",
        )
        .unwrap()
    }

    #[test]
    fn search_url_encodes_query() {
        assert_eq!(
            search_url("Kylian Mbappé", "Real Madrid"),
            "https://duckduckgo.com/html/?q=site%3Afbref.com+Kylian+Mbapp%C3%A9+Real+Madrid+fbref+profile"
        );
    }

    #[test]
    fn items_and_known_profiles_from_input() {
        let table = players();
        let items = resolve_items(&table).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "1");
        assert_eq!(items[1].team.as_deref(), Some("Arsenal"));

        let known = known_profiles(&table).unwrap();
        assert_eq!(known.len(), 1);
        assert!(known.contains_key(&("Bukayo Saka".to_string(), "Arsenal".to_string())));
    }

    #[test]
    fn club_column_is_accepted() {
        let table = InputTable::from_bytes("p.csv", b"Name,Club\nDeclan Rice,Arsenal\n").unwrap();
        assert_eq!(resolve_items(&table).unwrap()[0].team.as_deref(), Some("Arsenal"));
    }

    #[test]
    fn missing_result_still_yields_row() {
        let job = ResolveJob::new(KnownProfiles::new()).unwrap();
        let item = WorkItem::new("0", "q").with_label("Nobody").with_team("FC");
        let tables = job.extract(&item, &page("<a href='https://example.com'>x</a>"));
        let record = &tables[0].records[0];
        assert_eq!(record.get("fbref_url"), Some(&Value::text("")));
        assert_eq!(record.get("Index"), Some(&Value::Int(0)));
    }

    #[test]
    fn misses_are_kept_in_debug_dir() {
        let dir = tempfile::tempdir().unwrap();
        let job = ResolveJob::new(KnownProfiles::new())
            .unwrap()
            .with_debug_dir(dir.path());
        let item = WorkItem::new("7", "q").with_label("Declan Rice").with_team("Arsenal");
        let html = "<a href='https://example.com'>nothing</a>";

        job.extract(&item, &page(html));

        let path = job.debug_path(&item).unwrap();
        assert_eq!(path, dir.path().join("debug_7_Declan Rice.html"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), html);
    }

    #[test]
    fn hits_are_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let job = ResolveJob::new(KnownProfiles::new())
            .unwrap()
            .with_debug_dir(dir.path());
        let item = WorkItem::new("8", "q").with_label("Bukayo Saka");
        let html = r#"<a href="https://fbref.com/en/players/bc7dc64d/Bukayo-Saka">Saka</a>"#;

        job.extract(&item, &page(html));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn known_profiles_skip_the_search() {
        let table = players();
        let items = resolve_items(&table).unwrap();
        let haaland = r#"<a href="https://fbref.com/en/players/1f44ac21/Erling-Haaland">Erling Haaland</a>"#;
        let site = FakeSite::new([(items[0].target.clone(), Ok(haaland.to_string()))]);

        let scraper = BatchScraper::new(
            ResolveJob::new(known_profiles(&table).unwrap()).unwrap(),
            MemorySink::default(),
            MemoryLedger::new(),
            RetryPolicy::default(),
        )
        .with_pause(RecordingPause::default());
        let summary = scraper.run(&items, vec![site.clone()]).await.unwrap();

        assert_eq!(summary.scraped, 2);
        assert_eq!(site.requested(), vec![items[0].target.clone()]);
        let urls: Vec<String> = scraper
            .sink()
            .written()
            .iter()
            .filter_map(|(_, t)| t.records[0].get("fbref_url").map(Value::to_string))
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://fbref.com/en/players/1f44ac21/Erling-Haaland",
                "https://fbref.com/en/players/bc7dc64d/Bukayo-Saka"
            ]
        );
        assert!(scraper.ledger().completed().await.unwrap().contains("1"));
    }
}
