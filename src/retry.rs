//! Bounded retries with exponential backoff around a [`PageFetcher`].
//!
//! Each attempt ends in success, a transient failure or a terminal failure:
//!
//! - `RateLimited` (HTTP 418): stop immediately, sit out the long cooldown,
//!   and hand control back without marking the item failed
//! - anything else, 404 included: wait `base^k` seconds before attempt `k`
//!   (0-based) and try again, up to `max_attempts` attempts in total. A
//!   throttled site sometimes answers 404 for pages that exist.
//!
//! Delays go through [`Pause`] so tests can observe them without sleeping.

use crate::error::FetchError;
use crate::fetch::{FetchRequest, PageFetcher};
use crate::models::Page;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Something that can wait. Production code sleeps on the tokio timer.
pub trait Pause {
    async fn pause(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

impl<P: Pause> Pause for &P {
    async fn pause(&self, delay: Duration) {
        (**self).pause(delay).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before attempt `k` is `backoff_base^k` seconds.
    pub backoff_base: u64,
    /// Pause taken after a rate-limit ban.
    pub cooldown: Duration,
    /// Upper bound of random jitter added to each backoff.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
            cooldown: Duration::from_secs(3600),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Delay before the 0-based attempt `attempt`, jitter excluded.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base.saturating_pow(attempt))
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            delay
        } else {
            delay + Duration::from_millis(rng().random_range(0..=jitter_ms))
        }
    }
}

/// Final outcome of a retried fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success { page: Page, attempts: u32 },
    /// Rate-limited; the cooldown has already been taken.
    Cooldown { attempts: u32 },
    /// Retries exhausted.
    Failed { attempts: u32, error: FetchError },
}

impl FetchOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Success { attempts, .. }
            | FetchOutcome::Cooldown { attempts }
            | FetchOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Decorator adding retry, backoff and cooldown handling to a fetcher.
pub struct RetryFetch<F, P = TokioPause> {
    inner: F,
    policy: RetryPolicy,
    pause: P,
}

impl<F, P> RetryFetch<F, P>
where
    F: PageFetcher,
    P: Pause,
{
    pub fn new(inner: F, policy: RetryPolicy, pause: P) -> Self {
        Self {
            inner,
            policy,
            pause,
        }
    }

    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let total_t0 = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            let attempt_t0 = Instant::now();
            let result = self.inner.fetch(request).await;
            attempt += 1;

            let e = match result {
                Ok(page) => {
                    if attempt > 1 {
                        info!(attempt, "Fetch succeeded after retry");
                    }
                    return FetchOutcome::Success {
                        page,
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            let elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64;
            let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;

            if e == FetchError::RateLimited {
                warn!(
                    attempt,
                    cooldown = ?self.policy.cooldown,
                    "418 I'm a teapot; cooling down"
                );
                self.pause.pause(self.policy.cooldown).await;
                return FetchOutcome::Cooldown { attempts: attempt };
            }
            if attempt >= max_attempts {
                error!(
                    attempt,
                    max = max_attempts,
                    elapsed_ms_total,
                    error = %e,
                    "fetch() exhausted retries"
                );
                return FetchOutcome::Failed { attempts: attempt, error: e };
            }

            let delay = self.policy.jittered_backoff(attempt);
            if matches!(e, FetchError::Timeout) {
                warn!(
                    attempt,
                    max = max_attempts,
                    elapsed_ms_attempt,
                    ?delay,
                    "Request timed out; backing off"
                );
            } else {
                warn!(
                    attempt,
                    max = max_attempts,
                    elapsed_ms_attempt,
                    ?delay,
                    error = %e,
                    "fetch() attempt failed; backing off"
                );
            }
            self.pause.pause(delay).await;
        }
    }
}

impl<F, P> fmt::Debug for RetryFetch<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .finish()
    }
}
