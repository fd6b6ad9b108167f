//! Command-line interface definitions.
//!
//! One subcommand per scrape job plus the offline tidy tools. Run settings
//! given here override the YAML configuration file, which overrides each
//! job's built-in defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the football scrapers.
///
/// # Examples
///
/// ```sh
/// # Listing pages 1-50 with four sessions
/// football_scrape values --last-page 50 --concurrency 4
///
/// # Clean the listing, then fetch every player's transfer history
/// football_scrape clean
/// football_scrape transfers --input all_players_ratings_original.csv
///
/// # Resolve profile URLs, derive stats URLs, fetch stats tables
/// football_scrape resolve --reference all_players_ratings.csv
/// football_scrape stat-urls
/// football_scrape stats --log-level debug
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, global = true, env = "FOOTBALL_SCRAPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `football_scrape=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape the ranked market-value listing pages
    Values(ValuesArgs),
    /// Scrape the transfer history of every listed player
    Transfers(TransfersArgs),
    /// Scrape every stats table of each player's all-competitions page
    Stats(StatsArgs),
    /// Find each player's stats-site profile URL through a web search
    Resolve(ResolveArgs),
    /// Repair the raw listing CSV into the ten-column player table
    Clean(CleanArgs),
    /// Add an all-competitions stats URL column derived from `fbref_url`
    StatUrls(StatUrlsArgs),
    /// Sort a player table by `Value`, highest first
    Sort(SortArgs),
}

/// Settings shared by every scrape job.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Number of concurrent sessions
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per item, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Backoff before retry k is base^k seconds
    #[arg(long)]
    pub backoff_base: Option<u64>,

    /// Pause after a rate-limit ban (HTTP 418)
    #[arg(long)]
    pub cooldown_secs: Option<u64>,

    /// Courtesy pause before every request
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Per-request timeout
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Ledger of completed item ids
    #[arg(long)]
    pub completed_log: Option<PathBuf>,

    /// Ledger of failed item ids
    #[arg(long)]
    pub failed_log: Option<PathBuf>,

    /// Output CSV (or folder, for `stats`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValuesArgs {
    #[arg(long, default_value_t = 1)]
    pub first_page: u32,

    #[arg(long, default_value_t = 1353)]
    pub last_page: u32,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct TransfersArgs {
    /// Player table with a `Player URL` column
    #[arg(short, long, default_value = "all_players_ratings_original.csv")]
    pub input: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Table with `Name` and `fbref_alltimestat` columns
    #[arg(short, long, default_value = "fbref_stat_urls.csv")]
    pub input: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Table with `Name` and `Team` (or `Club`) columns
    #[arg(short, long, default_value = "all_players_ratings_original.csv")]
    pub input: PathBuf,

    /// Earlier table whose `fbref_url` values are reused without searching
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Save search pages that yield no profile link into this folder
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    #[arg(short, long, default_value = "most_valuable_players_fast.csv")]
    pub input: PathBuf,

    #[arg(short, long, default_value = "all_players_ratings_original.csv")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct StatUrlsArgs {
    #[arg(short, long, default_value = "fbref_urls.csv")]
    pub input: PathBuf,

    #[arg(short, long, default_value = "fbref_stat_urls.csv")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct SortArgs {
    #[arg(short, long, default_value = "all_players_ratings_original.csv")]
    pub input: PathBuf,

    /// Defaults to rewriting the input in place
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
