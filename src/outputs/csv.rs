//! CSV outputs.
//!
//! [`CsvTable`] is the append-only table shared by a whole run: the header
//! is written by whichever append first meets an empty file, later appends
//! add rows only. Each append is one write of fully encoded rows, made under
//! a lock, so concurrent workers interleave whole batches, never partial
//! lines.
//!
//! With a dedup key, keys already present in the file when it is opened
//! (and keys written since) are not written again, which makes re-running
//! over the same work list safe even without a progress ledger. Records
//! with a blank key are always written.
//!
//! [`CsvFolder`] writes one file per named table into a folder per work
//! item, replacing earlier files of the same name. [`write_table`] rewrites
//! a whole file at once for the offline tidy tools.

use super::RecordSink;
use crate::error::ScrapeError;
use crate::models::{Record, TableRows, WorkItem};
use crate::utils::sanitize_file_name;
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Encode records as CSV bytes, optionally preceded by the first record's field names.
pub fn encode_records(records: &[Record], with_header: bool) -> Result<Vec<u8>, ScrapeError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());

    if with_header {
        if let Some(first) = records.first() {
            writer.write_record(first.names())?;
        }
    }
    for record in records {
        writer.write_record(record.values().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| ScrapeError::Csv(e.into_error().into()))
}

/// Replace the file at `path` with `header` followed by `rows`.
pub async fn write_table<I, R>(path: &Path, header: &[String], rows: I) -> Result<usize, ScrapeError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    writer.write_record(header)?;
    let mut count = 0;
    for row in rows {
        writer.write_record(row)?;
        count += 1;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ScrapeError::Csv(e.into_error().into()))?;
    fs::write(path, bytes)
        .await
        .map_err(|e| ScrapeError::io(path, e))?;
    info!(path = %path.display(), rows = count, "Wrote table");
    Ok(count)
}

#[derive(Debug, Default)]
struct TableState {
    has_header: bool,
    seen: HashSet<String>,
}

/// Append-only CSV file.
#[derive(Debug)]
pub struct CsvTable {
    path: PathBuf,
    dedup_key: Option<String>,
    state: Mutex<TableState>,
}

impl CsvTable {
    /// Open (without truncating) the table at `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, dedup_key: Option<&str>) -> Result<Self, ScrapeError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ScrapeError::io(parent, e))?;
        }

        let existing = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ScrapeError::io(&path, e)),
        };

        let mut state = TableState {
            has_header: !existing.is_empty(),
            seen: HashSet::new(),
        };
        if let (Some(key), true) = (dedup_key, state.has_header) {
            state.seen = existing_keys(&existing, key)?;
            if state.seen.is_empty() {
                warn!(key, "Existing table has no values for dedup key");
            }
        }

        info!(
            existing_bytes = existing.len(),
            known_keys = state.seen.len(),
            "Opened output table"
        );
        Ok(Self {
            path,
            dedup_key: dedup_key.map(str::to_string),
            state: Mutex::new(state),
        })
    }

    /// Append records, skipping any whose dedup key was already written.
    pub async fn append_records(&self, records: &[Record]) -> Result<usize, ScrapeError> {
        let mut state = self.state.lock().await;

        let fresh: Vec<Record> = match &self.dedup_key {
            Some(key) => records
                .iter()
                .filter(|r| match r.get(key) {
                    Some(v) if !v.is_null() => !state.seen.contains(&v.to_string()),
                    _ => true,
                })
                .cloned()
                .collect(),
            None => records.to_vec(),
        };
        let duplicates = records.len() - fresh.len();
        if duplicates > 0 {
            debug!(duplicates, "Skipped records already in table");
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        let bytes = encode_records(&fresh, !state.has_header)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ScrapeError::io(&self.path, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| ScrapeError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| ScrapeError::io(&self.path, e))?;

        state.has_header = true;
        if let Some(key) = &self.dedup_key {
            let keys = fresh
                .iter()
                .filter_map(|r| r.get(key))
                .filter(|v| !v.is_null())
                .map(|v| v.to_string());
            state.seen.extend(keys);
        }
        Ok(fresh.len())
    }
}

fn existing_keys(bytes: &[u8], key: &str) -> Result<HashSet<String>, ScrapeError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let Some(column) = reader.headers()?.iter().position(|h| h == key) else {
        return Ok(HashSet::new());
    };
    let mut keys = HashSet::new();
    for row in reader.records() {
        if let Some(value) = row?.get(column).filter(|v| !v.is_empty()) {
            keys.insert(value.to_string());
        }
    }
    Ok(keys)
}

impl RecordSink for CsvTable {
    async fn append(&self, _item: &WorkItem, tables: Vec<TableRows>) -> Result<usize, ScrapeError> {
        let records: Vec<Record> = tables.into_iter().flat_map(|t| t.records).collect();
        self.append_records(&records).await
    }
}

/// One folder per work item, one CSV per table.
#[derive(Debug, Clone)]
pub struct CsvFolder {
    root: PathBuf,
}

impl CsvFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder_for(&self, item: &WorkItem) -> PathBuf {
        self.root.join(sanitize_file_name(&item.label))
    }
}

impl RecordSink for CsvFolder {
    #[instrument(level = "debug", skip_all, fields(item = %item.label))]
    async fn append(&self, item: &WorkItem, tables: Vec<TableRows>) -> Result<usize, ScrapeError> {
        let folder = self.folder_for(item);
        fs::create_dir_all(&folder)
            .await
            .map_err(|e| ScrapeError::io(&folder, e))?;

        let mut written = 0;
        for table in tables.iter().filter(|t| !t.records.is_empty()) {
            let name = if table.name.is_empty() {
                "table"
            } else {
                table.name.as_str()
            };
            let path = folder.join(format!("{}.csv", sanitize_file_name(name)));
            let bytes = encode_records(&table.records, true)?;
            fs::write(&path, bytes)
                .await
                .map_err(|e| ScrapeError::io(&path, e))?;
            written += table.records.len();
        }
        debug!(tables = tables.len(), records = written, folder = %folder.display(), "Wrote tables");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use tempfile::tempdir;

    fn player(url: &str, value: f64) -> Record {
        Record::new()
            .with("Name", Value::text("Player, Jr."))
            .with("Player URL", Value::text(url))
            .with("Market Value (€)", Value::Float(value))
            .with("Age", None::<i64>)
    }

    #[test]
    fn encoding_quotes_and_blanks() {
        let bytes = encode_records(&[player("/p/1", 5e6)], true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Name,Player URL,Market Value (€),Age\n\"Player, Jr.\",/p/1,5000000.0,\n"
        );
    }

    #[tokio::test]
    async fn header_written_once_across_appends_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("players.csv");

        let table = CsvTable::open(&path, None).await.unwrap();
        table.append_records(&[player("/p/1", 1.0)]).await.unwrap();
        table.append_records(&[player("/p/2", 2.0)]).await.unwrap();
        drop(table);

        let table = CsvTable::open(&path, None).await.unwrap();
        table.append_records(&[player("/p/3", 3.0)]).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text.lines().count(), 4);
        assert_eq!(text.matches("Player URL").count(), 1);
    }

    #[tokio::test]
    async fn dedup_key_skips_rows_from_earlier_runs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("players.csv");

        let table = CsvTable::open(&path, Some("Player URL")).await.unwrap();
        assert_eq!(table.append_records(&[player("/p/1", 1.0)]).await.unwrap(), 1);
        drop(table);

        let table = CsvTable::open(&path, Some("Player URL")).await.unwrap();
        let written = table
            .append_records(&[player("/p/1", 1.0), player("/p/2", 2.0)])
            .await
            .unwrap();
        assert_eq!(written, 1);

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn dedup_keeps_all_rows_of_a_new_key_in_one_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transfers.csv");
        let table = CsvTable::open(&path, Some("Player Index")).await.unwrap();

        let rows: Vec<Record> = ["Arsenal", "Chelsea"]
            .iter()
            .map(|to| {
                Record::new()
                    .with("Player Index", Value::Int(4))
                    .with("Transfer To", Value::text(*to))
            })
            .collect();
        assert_eq!(table.append_records(&rows).await.unwrap(), 2);
        assert_eq!(table.append_records(&rows).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn folder_writes_one_file_per_table() {
        let dir = tempdir().unwrap();
        let folder = CsvFolder::new(dir.path());
        let item = WorkItem::new("1f44ac21", "https://fbref.com/x").with_label("Erling Haaland_1f44ac21");

        let tables = vec![
            TableRows::named("stats_standard", vec![Record::new().with("Gls", Value::text("27"))]),
            TableRows::named("stats_empty", vec![]),
        ];
        let written = folder.append(&item, tables).await.unwrap();
        assert_eq!(written, 1);

        let player_dir = dir.path().join("Erling Haaland_1f44ac21");
        let text = tokio::fs::read_to_string(player_dir.join("stats_standard.csv"))
            .await
            .unwrap();
        assert_eq!(text, "Gls\n27\n");
        assert!(!player_dir.join("stats_empty.csv").exists());
    }
}
