//! Offline CSV tidying between scrape stages.
//!
//! - [`clean_listing`]: repair the raw listing CSV into the ten-column
//!   player table
//! - [`add_stat_urls`]: derive each player's all-competitions stats URL
//!   from their profile URL
//! - [`sort_by_value`]: order a player table by market value, highest first

use crate::error::ScrapeError;
use crate::models::Value;
use crate::outputs::csv::write_table;
use crate::worklist::InputTable;
use csv::{ReaderBuilder, Trim};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Columns of the cleaned player table.
pub const LISTING_COLUMNS: [&str; 10] = [
    "Name",
    "Player URL",
    "Age",
    "Team",
    "Team Link",
    "Positions",
    "Nationality",
    "Rating",
    "Potential",
    "Value",
];
const POSITIONS: usize = 5;
const URL_COLUMNS: [usize; 2] = [1, 4];
const NUMERIC_COLUMNS: [usize; 4] = [2, 7, 8, 9];
const SITE_PREFIX: &str = "https://www.footballtransfers.com";

/// Split one raw listing line into exactly ten fields.
///
/// A line wrapped whole in quotes is unwrapped and doubled quotes are
/// collapsed before parsing. Extra fields are taken to be an unquoted
/// position list and are merged back into `Positions`. Lines with fewer
/// than ten fields give `None`.
pub fn repair_listing_line(line: &str) -> Result<Option<Vec<String>>, ScrapeError> {
    let mut line = line.trim();
    if line.len() >= 2 && line.starts_with('"') && line.ends_with('"') {
        line = &line[1..line.len() - 1];
    }
    let line = line.replace("\"\"", "\"");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::Fields)
        .from_reader(line.as_bytes());
    let Some(record) = reader.records().next().transpose()? else {
        return Ok(None);
    };
    let fields: Vec<String> = record.iter().map(str::to_string).collect();

    let width = LISTING_COLUMNS.len();
    Ok(match fields.len() {
        n if n == width => Some(fields),
        n if n > width => {
            let tail = n - (width - POSITIONS - 1);
            let mut repaired = fields[..POSITIONS].to_vec();
            repaired.push(fields[POSITIONS..tail].join(", "));
            repaired.extend_from_slice(&fields[tail..]);
            Some(repaired)
        }
        _ => None,
    })
}

/// Number if the text parses as one, else null.
fn coerce_number(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        Value::Int(n)
    } else {
        match raw.parse::<f64>() {
            Ok(x) if x.is_finite() => Value::Float(x),
            _ => Value::Null,
        }
    }
}

fn tidy_row(mut fields: Vec<String>) -> Vec<String> {
    let doubled = format!("{SITE_PREFIX}{SITE_PREFIX}");
    for col in URL_COLUMNS {
        fields[col] = fields[col].replace(&doubled, SITE_PREFIX);
    }
    for col in NUMERIC_COLUMNS {
        fields[col] = coerce_number(&fields[col]).to_string();
    }
    fields
}

/// Counts from one [`clean_listing`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub kept: usize,
    pub repaired: usize,
    pub dropped: usize,
}

/// Rewrite the raw listing at `input` as the cleaned player table at `output`.
///
/// The first line of the input is its header and is replaced by
/// [`LISTING_COLUMNS`].
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn clean_listing(input: &Path, output: &Path) -> Result<CleanReport, ScrapeError> {
    let text = fs::read_to_string(input)
        .await
        .map_err(|e| ScrapeError::io(input, e))?;

    let mut report = CleanReport::default();
    let mut rows = Vec::new();
    for (number, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let overflowed = line.matches(',').count() >= LISTING_COLUMNS.len();
        match repair_listing_line(line)? {
            Some(fields) => {
                if overflowed {
                    report.repaired += 1;
                }
                report.kept += 1;
                rows.push(tidy_row(fields));
            }
            None => {
                warn!(line = number + 1, "Could not repair row; dropping");
                report.dropped += 1;
            }
        }
    }

    let header = LISTING_COLUMNS.map(String::from);
    write_table(output, &header, rows).await?;
    info!(kept = report.kept, repaired = report.repaired, dropped = report.dropped, "Cleaned listing");
    Ok(report)
}

static PLAYER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/players/([a-z0-9]+)").unwrap());
const SUB_PAGES: [&str; 5] = ["goallogs", "matchlogs", "scout", "all_comps", "summary"];

/// All-competitions stats URL for a profile URL, or `None` when the URL
/// has no player id or ends in a sub-page rather than a name slug.
pub fn derive_stat_url(profile_url: &str) -> Option<String> {
    let id = PLAYER_ID.captures(profile_url)?.get(1)?.as_str();
    let slug = profile_url.trim_end_matches('/').rsplit('/').next()?;
    if slug.is_empty() || SUB_PAGES.contains(&slug.to_lowercase().as_str()) {
        return None;
    }
    let name = slug.split('-').take(2).join("-");
    Some(format!(
        "https://fbref.com/en/players/{id}/all_comps/{name}-Stats---All-Competitions"
    ))
}

/// Copy `input` to `output` with a `fbref_alltimestat` column derived from
/// `fbref_url` (blank where no URL can be derived). Returns how many rows
/// got a URL.
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn add_stat_urls(input: &Path, output: &Path) -> Result<usize, ScrapeError> {
    let table = InputTable::read(input).await?;
    let url_col = table.require_any(&["fbref_url"])?;
    let existing = table.column("fbref_alltimestat");

    let mut header = table.headers().to_vec();
    if existing.is_none() {
        header.push("fbref_alltimestat".to_string());
    }

    let mut derived = 0;
    let rows: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|row| {
            let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
            let width = table.headers().len();
            if fields.len() < width {
                fields.resize(width, String::new());
            }
            let stat_url = derive_stat_url(InputTable::cell(row, url_col)).unwrap_or_default();
            if !stat_url.is_empty() {
                derived += 1;
            }
            // overflow fields of long rows stay after the new column
            match existing {
                Some(col) => fields[col] = stat_url,
                None => fields.insert(width, stat_url),
            }
            fields
        })
        .collect();

    write_table(output, &header, rows).await?;
    info!(rows = table.rows().len(), derived, "Added stats URLs");
    Ok(derived)
}

/// Descending by numeric value; non-numeric values after every number.
fn by_value_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable-sort the rows of `input` by `Value`, highest first, into `output`
/// (which may be `input` itself).
#[instrument(level = "info", skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn sort_by_value(input: &Path, output: &Path) -> Result<usize, ScrapeError> {
    let table = InputTable::read(input).await?;
    let value_col = table.require_any(&["Value"])?;
    let value = |row: &csv::StringRecord| {
        InputTable::cell(row, value_col)
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
    };

    let rows = table
        .rows()
        .iter()
        .sorted_by(|a, b| by_value_desc(value(a), value(b)))
        .map(|row| row.iter().map(str::to_string).collect::<Vec<_>>());
    write_table(output, table.headers(), rows).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn well_formed_line_is_kept() {
        let fields = repair_listing_line(
            "Erling Haaland,https://x/p,24,Man City,https://x/t,CF,Norway,94.5,95,200000000.0",
        )
        .unwrap()
        .unwrap();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[5], "CF");
    }

    #[test]
    fn overflowing_positions_are_merged() {
        let fields = repair_listing_line(
            r#""Bukayo Saka,https://x/p,23,Arsenal,https://x/t,""M, AM (R)"",England,88,91,120000000.0""#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(fields[5], "M, AM (R)");
        assert_eq!(fields[6], "England");

        let fields = repair_listing_line("A,u,20,T,l,LW,RW,ST,Spain,80,85,1.0")
            .unwrap()
            .unwrap();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[5], "LW, RW, ST");
        assert_eq!(fields[9], "1.0");
    }

    #[test]
    fn short_line_is_dropped() {
        assert_eq!(repair_listing_line("Name,only").unwrap(), None);
        assert_eq!(repair_listing_line("").unwrap(), None);
    }

    #[tokio::test]
    async fn clean_listing_writes_ten_column_table() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("clean.csv");
        let doubled = format!("{SITE_PREFIX}{SITE_PREFIX}/en/players/a");
        tokio::fs::write(
            &input,
            format!(
                "Name,Player URL,Age,Club,Club URL,Position,Nationality,Skill,Potential,Market Value (€)\n\
                 A,{doubled},n/a,T,{SITE_PREFIX}/t,CF,Spain,80.5,85,1000000.0\n\
                 broken,row\n"
            ),
        )
        .await
        .unwrap();

        let report = clean_listing(&input, &output).await.unwrap();
        assert_eq!(report, CleanReport { kept: 1, repaired: 0, dropped: 1 });

        let text = tokio::fs::read_to_string(&output).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], LISTING_COLUMNS.join(","));
        assert_eq!(
            lines[1],
            format!("A,{SITE_PREFIX}/en/players/a,,T,{SITE_PREFIX}/t,CF,Spain,80.5,85,1000000.0")
        );
    }

    #[test]
    fn stat_url_derivation() {
        assert_eq!(
            derive_stat_url("https://fbref.com/en/players/1f44ac21/Erling-Haaland").as_deref(),
            Some("https://fbref.com/en/players/1f44ac21/all_comps/Erling-Haaland-Stats---All-Competitions")
        );
        assert_eq!(
            derive_stat_url("https://fbref.com/en/players/dea698d9/Cristiano-Ronaldo-dos-Santos/").as_deref(),
            Some("https://fbref.com/en/players/dea698d9/all_comps/Cristiano-Ronaldo-Stats---All-Competitions")
        );
        assert_eq!(
            derive_stat_url("https://fbref.com/en/players/6b3a9d2c/Pedri").as_deref(),
            Some("https://fbref.com/en/players/6b3a9d2c/all_comps/Pedri-Stats---All-Competitions")
        );
        assert_eq!(derive_stat_url("https://fbref.com/en/players/1f44ac21/matchlogs"), None);
        assert_eq!(derive_stat_url("https://fbref.com/en/squads/b8fd03ef/City"), None);
        assert_eq!(derive_stat_url(""), None);
    }

    #[tokio::test]
    async fn stat_urls_column_is_added() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("urls.csv");
        let output = dir.path().join("stats.csv");
        tokio::fs::write(
            &input,
            "Index,Name,Team,fbref_url\n0,Erling Haaland,Man City,https://fbref.com/en/players/1f44ac21/Erling-Haaland\n1,Nobody,FC,\n",
        )
        .await
        .unwrap();

        assert_eq!(add_stat_urls(&input, &output).await.unwrap(), 1);
        let text = tokio::fs::read_to_string(&output).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Index,Name,Team,fbref_url,fbref_alltimestat");
        assert!(lines[1].ends_with(",https://fbref.com/en/players/1f44ac21/all_comps/Erling-Haaland-Stats---All-Competitions"));
        assert_eq!(lines[2], "1,Nobody,FC,,");
    }

    #[tokio::test]
    async fn stat_urls_keep_overflow_fields() {
        let dir = tempdir().unwrap();
        let haaland = "https://fbref.com/en/players/1f44ac21/Erling-Haaland";
        let stats = "https://fbref.com/en/players/1f44ac21/all_comps/Erling-Haaland-Stats---All-Competitions";

        let replaced_in = dir.path().join("replaced.csv");
        let replaced_out = dir.path().join("replaced_out.csv");
        tokio::fs::write(
            &replaced_in,
            format!("Name,fbref_url,fbref_alltimestat\nA,{haaland},old,extra1,extra2\nB\n"),
        )
        .await
        .unwrap();
        add_stat_urls(&replaced_in, &replaced_out).await.unwrap();
        let text = tokio::fs::read_to_string(&replaced_out).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], format!("A,{haaland},{stats},extra1,extra2"));
        assert_eq!(lines[2], "B,,");

        let appended_in = dir.path().join("appended.csv");
        let appended_out = dir.path().join("appended_out.csv");
        tokio::fs::write(&appended_in, format!("Name,fbref_url\nA,{haaland},extra\n"))
            .await
            .unwrap();
        add_stat_urls(&appended_in, &appended_out).await.unwrap();
        let text = tokio::fs::read_to_string(&appended_out).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Name,fbref_url,fbref_alltimestat");
        assert_eq!(lines[1], format!("A,{haaland},{stats},extra"));
    }

    #[tokio::test]
    async fn sort_puts_highest_value_first_and_blanks_last() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("players.csv");
        tokio::fs::write(&path, "Name,Value\nA,5.0\nB,\nC,200000000.0\nD,5.0\nE,x\n")
            .await
            .unwrap();

        assert_eq!(sort_by_value(&path, &path).await.unwrap(), 5);
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let names: Vec<&str> = text.lines().skip(1).map(|l| &l[..1]).collect();
        assert_eq!(names, vec!["C", "A", "D", "B", "E"]);
    }
}
