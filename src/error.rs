//! Error types shared by the scrapers.
//!
//! Two families:
//!
//! - [`FetchError`] classifies a single failed fetch attempt. The retry
//!   wrapper switches on the variant to decide between backing off,
//!   cooling down, or giving up.
//! - [`ScrapeError`] covers the environment: files, CSV input, config and
//!   selectors. These abort a run before any work starts.

use std::path::PathBuf;
use thiserror::Error;

/// Why one attempt at fetching a page did not produce a usable document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The site answered 418 ("I'm a teapot"), its rate-limit ban signal.
    #[error("rate limited (418 I'm a teapot)")]
    RateLimited,

    /// HTTP 404. Retried like any other status; kept apart for logging.
    #[error("page not found (404)")]
    NotFound,

    /// Any other non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Connection-level failure or an unreadable body.
    #[error("network error: {0}")]
    Network(String),

    /// The document arrived but the element the job waits for is absent.
    #[error("selector `{0}` not present in document")]
    MissingSelector(String),
}

impl FetchError {
    /// Classify a free-form error message.
    ///
    /// Any text mentioning `418` or `I'm a teapot` is a rate-limit ban;
    /// everything else is a transient network error.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("418") || message.contains("I'm a teapot") {
            FetchError::RateLimited
        } else {
            FetchError::Network(message)
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout;
        }
        match e.status() {
            Some(status) if status.as_u16() == 418 => FetchError::RateLimited,
            Some(status) if status.as_u16() == 404 => FetchError::NotFound,
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::from_message(e.to_string()),
        }
    }
}

/// Failures of the environment around a scrape run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The input table lacks columns the job cannot run without.
    #[error("{} is missing required column(s): {}", .path.display(), .missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid CSS selector `{0}`")]
    Selector(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl ScrapeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrapeError::Io {
            path: path.into(),
            source,
        }
    }
}
