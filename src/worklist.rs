//! Work-list sources: page ranges and input CSV tables.

use crate::error::ScrapeError;
use crate::models::WorkItem;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// One work item per page number in `first..=last`; `{}` in `template`
/// is replaced by the page number, which is also the item id.
pub fn page_range(template: &str, first: u32, last: u32) -> Vec<WorkItem> {
    (first..=last)
        .map(|page| WorkItem::new(page.to_string(), template.replace("{}", &page.to_string())))
        .collect()
}

/// A CSV file loaded whole, addressed by column name.
#[derive(Debug, Clone)]
pub struct InputTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl InputTable {
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let path = path.as_ref();
        let bytes = fs::read(path).await.map_err(|e| ScrapeError::io(path, e))?;
        let table = Self::from_bytes(path, &bytes)?;
        info!(rows = table.rows.len(), columns = table.headers.len(), "Loaded input table");
        Ok(table)
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, ScrapeError> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(bytes);
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            path: path.into(),
            headers,
            rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Fail unless every named column is present.
    pub fn require(&self, columns: &[&str]) -> Result<Vec<usize>, ScrapeError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| self.column(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ScrapeError::MissingColumns {
                path: self.path.clone(),
                missing,
            });
        }
        Ok(columns.iter().filter_map(|c| self.column(c)).collect())
    }

    /// The first of `alternatives` present in the table.
    pub fn require_any(&self, alternatives: &[&str]) -> Result<usize, ScrapeError> {
        alternatives
            .iter()
            .find_map(|c| self.column(c))
            .ok_or_else(|| ScrapeError::MissingColumns {
                path: self.path.clone(),
                missing: vec![alternatives.join(" or ")],
            })
    }

    /// Trimmed cell text; missing cells read as empty.
    pub fn cell<'a>(row: &'a StringRecord, column: usize) -> &'a str {
        row.get(column).map(str::trim).unwrap_or_default()
    }
}
