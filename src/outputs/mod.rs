//! Where extracted records go.
//!
//! # Submodules
//!
//! - [`csv`]: append-only CSV tables and per-item CSV folders
//!
//! # Output Structure
//!
//! ```text
//! most_valuable_players_fast.csv      # values: one table, appended per page
//! compiled_transfers.csv              # transfers: one table, appended per player
//! all_players_fbref_tables/           # stats: one folder per player
//! └── Erling Haaland_1f44ac21/
//!     ├── stats_standard_dom_lg.csv
//!     └── stats_shooting_dom_lg.csv
//! ```

pub mod csv;

use crate::error::ScrapeError;
use crate::models::{TableRows, WorkItem};

/// Destination for the tables extracted from one work item.
pub trait RecordSink {
    /// Persist `tables` for `item`, returning how many records were written.
    async fn append(&self, item: &WorkItem, tables: Vec<TableRows>) -> Result<usize, ScrapeError>;
}
