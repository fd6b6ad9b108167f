//! Run configuration.
//!
//! Settings are layered: built-in per-job defaults, then an optional YAML
//! file, then command-line flags. The YAML file looks like:
//!
//! ```yaml
//! retry:
//!   max_attempts: 8
//!   backoff_base: 2
//!   cooldown_secs: 3600
//!   jitter_ms: 0
//! fetch:
//!   timeout_secs: 30
//!   user_agent: "Mozilla/5.0"
//!   accept_invalid_certs: true
//!   delay_ms: 200
//!   concurrency: 4
//! ```
//!
//! Every key is optional.

use crate::cli::RunArgs;
use crate::error::ScrapeError;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Contents of the optional YAML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub retry: RetrySection,
    pub fetch: FetchSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub backoff_base: Option<u64>,
    pub cooldown_secs: Option<u64>,
    pub jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSection {
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub accept_invalid_certs: Option<bool>,
    pub delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
}

impl FileConfig {
    /// Load the file at `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ScrapeError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|e| ScrapeError::io(path, e))?;
        let config = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ScrapeError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ScrapeError::Config(e.to_string()))
    }
}

/// HTTP session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
    /// The listing site serves a certificate chain some clients reject.
    pub accept_invalid_certs: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Built-in defaults for one kind of job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobDefaults {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base: u64,
    pub cooldown: Duration,
    /// Courtesy pause before every request.
    pub delay: Duration,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

const HOUR: Duration = Duration::from_secs(3600);

/// Market-value listing pages: many pages, shared across seven sessions.
pub const VALUES_DEFAULTS: JobDefaults = JobDefaults {
    concurrency: 7,
    max_attempts: 8,
    backoff_base: 2,
    cooldown: HOUR,
    delay: Duration::ZERO,
    timeout: Duration::from_secs(30),
    accept_invalid_certs: false,
};

pub const TRANSFERS_DEFAULTS: JobDefaults = JobDefaults {
    concurrency: 1,
    max_attempts: 3,
    backoff_base: 2,
    cooldown: HOUR,
    delay: Duration::ZERO,
    timeout: Duration::from_secs(30),
    accept_invalid_certs: true,
};

/// Stats pages are heavy and the site bans quickly; one at a time, slowly.
pub const STATS_DEFAULTS: JobDefaults = JobDefaults {
    concurrency: 1,
    max_attempts: 3,
    backoff_base: 2,
    cooldown: HOUR,
    delay: Duration::from_secs(6),
    timeout: Duration::from_secs(60),
    accept_invalid_certs: false,
};

pub const RESOLVE_DEFAULTS: JobDefaults = JobDefaults {
    concurrency: 1,
    max_attempts: 10,
    backoff_base: 4,
    cooldown: HOUR,
    delay: Duration::from_millis(200),
    timeout: Duration::from_secs(10),
    accept_invalid_certs: false,
};

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub fetch: FetchSettings,
    pub delay: Duration,
}

impl Settings {
    /// Layer defaults, file and flags; flags win.
    pub fn resolve(
        defaults: &JobDefaults,
        file: &FileConfig,
        flags: &RunArgs,
    ) -> Result<Self, ScrapeError> {
        let concurrency = flags
            .concurrency
            .or(file.fetch.concurrency)
            .unwrap_or(defaults.concurrency);
        if concurrency == 0 {
            return Err(ScrapeError::Config("concurrency must be at least 1".into()));
        }

        let max_attempts = flags
            .max_attempts
            .or(file.retry.max_attempts)
            .unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ScrapeError::Config("max_attempts must be at least 1".into()));
        }

        let backoff_base = flags
            .backoff_base
            .or(file.retry.backoff_base)
            .unwrap_or(defaults.backoff_base);

        let cooldown = flags
            .cooldown_secs
            .or(file.retry.cooldown_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.cooldown);

        let jitter = Duration::from_millis(file.retry.jitter_ms.unwrap_or(0));

        let delay = flags
            .delay_ms
            .or(file.fetch.delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.delay);

        let timeout = flags
            .timeout_secs
            .or(file.fetch.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Ok(Self {
            concurrency,
            retry: RetryPolicy {
                max_attempts,
                backoff_base,
                cooldown,
                jitter,
            },
            fetch: FetchSettings {
                timeout,
                user_agent: file
                    .fetch
                    .user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                accept_invalid_certs: flags.insecure
                    || file
                        .fetch
                        .accept_invalid_certs
                        .unwrap_or(defaults.accept_invalid_certs),
            },
            delay,
        })
    }
}
