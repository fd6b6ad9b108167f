//! # Football Scrape
//!
//! Resumable, rate-limited scrapers that build a football player dataset:
//! market values from a ranked listing, transfer histories, stats-site
//! profile URLs and per-player stats tables.
//!
//! ## Usage
//!
//! ```sh
//! football_scrape values
//! football_scrape clean
//! football_scrape transfers
//! ```
//!
//! ## Architecture
//!
//! Every scrape subcommand runs the same pipeline:
//! 1. **Work list**: page numbers, or rows of an input CSV
//! 2. **Skip**: items already in the completed ledger are not fetched
//! 3. **Fetch**: bounded retries with exponential backoff and a long
//!    cooldown on rate-limit bans, over one HTTP session per worker
//! 4. **Extract**: job-specific readers turn each page into records
//! 5. **Output**: records are appended to CSV and the item is marked done
//!
//! Interrupted runs resume where they stopped.

use clap::Parser;
use std::error::Error;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod ledger;
mod models;
mod normalize;
mod outputs;
mod retry;
mod scrape;
mod scrapers;
#[cfg(test)]
mod testing;
mod tidy;
mod utils;
mod worklist;

use cli::{Cli, Command};
use config::FileConfig;
use models::Summary;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "football_scrape starting up");
    debug!(?args, "Parsed CLI arguments");

    let config = FileConfig::load(args.config.as_deref())?;

    match &args.command {
        Command::Values(a) => report(scrapers::values::scrape(a, &config).await?),
        Command::Transfers(a) => report(scrapers::transfers::scrape(a, &config).await?),
        Command::Stats(a) => report(scrapers::stats::scrape(a, &config).await?),
        Command::Resolve(a) => report(scrapers::resolve::scrape(a, &config).await?),
        Command::Clean(a) => {
            tidy::clean_listing(&a.input, &a.output).await?;
        }
        Command::StatUrls(a) => {
            tidy::add_stat_urls(&a.input, &a.output).await?;
        }
        Command::Sort(a) => {
            let output = a.output.as_ref().unwrap_or(&a.input);
            let rows = tidy::sort_by_value(&a.input, output).await?;
            info!(rows, path = %output.display(), "Sorted by value");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn report(summary: Summary) {
    info!(
        scraped = summary.scraped,
        failed = summary.failed,
        skipped = summary.skipped,
        total = summary.total(),
        "Run summary"
    );
}
