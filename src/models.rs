//! Data models shared by the scrape loop, the extractors and the CSV outputs.
//!
//! - [`WorkItem`]: one unit of scrape work (a listing page or a player)
//! - [`Page`]: a fetched document
//! - [`Record`] / [`Value`]: one output row with a fixed, ordered field set
//! - [`TableRows`]: the records an extractor produced for one named table
//! - [`Summary`]: the per-run counters reported at the end of a batch

use crate::normalize::Fee;
use std::fmt;
use std::ops::AddAssign;

/// One unit of scrape work.
///
/// The `id` is what the progress ledger records; `target` is the URL (or
/// search query) the job fetches. `label` is a human-readable name used in
/// logs and, for per-player outputs, in folder names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub target: String,
    pub label: String,
    /// Club or team name, when the work list carries one.
    pub team: Option<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            target: target.into(),
            team: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }
}

/// A successfully fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// The URL that was requested.
    pub url: String,
    pub status: u16,
    pub html: String,
}

/// One cell of an output row. `Null` marks a source element that was absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map(Value::Text).unwrap_or(Value::Null)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::Float).unwrap_or(Value::Null)
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map(Value::Int).unwrap_or(Value::Null)
    }
}

impl From<Fee> for Value {
    fn from(fee: Fee) -> Self {
        match fee {
            Fee::Amount(n) => Value::Int(n),
            other => Value::Text(other.to_string()),
        }
    }
}

/// CSV cell rendering. Nulls are empty cells; whole floats keep one decimal
/// (`12000000.0`) so numeric columns read back as floats.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
        }
    }
}

/// One output row: an ordered list of named fields.
///
/// Field names may repeat (stats tables sometimes carry duplicate headers),
/// so this is a list rather than a map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style push.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }
}

/// Records an extractor produced for one table of a document.
///
/// Single-table jobs leave `name` empty; multi-table pages (stats) use the
/// table's DOM id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    pub name: String,
    pub records: Vec<Record>,
}

impl TableRows {
    pub fn unnamed(records: Vec<Record>) -> Self {
        Self {
            name: String::new(),
            records,
        }
    }

    pub fn named(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

/// Outcome counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Items fetched (or resolved without fetching) and written.
    pub scraped: usize,
    /// Items that exhausted their retries, hit a cooldown, or failed to write.
    pub failed: usize,
    /// Items already in the completed ledger.
    pub skipped: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.scraped + self.failed + self.skipped
    }
}

impl AddAssign for Summary {
    fn add_assign(&mut self, rhs: Self) {
        self.scraped += rhs.scraped;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
    }
}
