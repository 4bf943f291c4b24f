//! Search endpoint abstraction with rate-limit backoff.
//!
//! # Architecture
//!
//! - [`SearchEndpoint`]: core trait for one idempotent page read
//! - [`RetryOnRateLimit`]: decorator that retries an endpoint while the remote
//!   reports "too many requests"
//! - [`BackoffPolicy`]: the delay schedule, injected from configuration
//!
//! # Retry Strategy
//!
//! Only rate-limit signals are retried. Attempt `n` (starting at 0) waits
//! `unit * base^n`, plus optional jitter, before the next request. Any other
//! non-success status fails immediately with [`IngestError::Remote`].

use crate::error::{IngestError, Result};
use crate::models::{FetchRequest, FetchResponse, FetchStatus};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// A remote that answers one page request at a time.
pub trait SearchEndpoint {
    /// Issue a single request. Implementations classify the reply into a
    /// [`FetchStatus`] and only return `Err` for transport or decode failures.
    async fn search(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Delay schedule for rate-limit retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Exponent base. The wait before retry `n` is `unit * base^n`.
    pub base: u32,
    pub unit: Duration,
    /// Total requests allowed for one call, including the first.
    pub max_attempts: u32,
    /// Upper bound of random jitter added to every wait.
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    /// Deterministic part of the wait after the `attempt`-th rate-limited reply.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.base.checked_pow(attempt).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let ms: u64 = rng().random_range(0..=self.max_jitter.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

/// Retry bookkeeping for one outbound request. Dropped once the call resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub next_delay: Duration,
}

impl RetryState {
    fn new(policy: &BackoffPolicy) -> Self {
        Self {
            attempt: 0,
            next_delay: policy.delay_for(0),
        }
    }

    fn advance(&mut self, policy: &BackoffPolicy) {
        self.attempt += 1;
        self.next_delay = policy.delay_for(self.attempt);
    }
}

/// Wrapper that retries rate-limited replies from any [`SearchEndpoint`].
///
/// Each instance owns its own policy, so two pipelines wrapping their own
/// endpoints never share a retry budget.
pub struct RetryOnRateLimit<T> {
    inner: T,
    policy: BackoffPolicy,
}

impl<T> RetryOnRateLimit<T>
where
    T: SearchEndpoint,
{
    /// Wrap `inner` with rate-limit retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The endpoint that issues the actual request
    /// * `policy` - Delay schedule and attempt budget for this wrapper only
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = NewsApiClient::new(DEFAULT_BASE_URL, api_key, Duration::from_secs(30))?;
    /// let retrying = RetryOnRateLimit::new(client, config.backoff_policy());
    /// ```
    pub fn new(inner: T, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    #[cfg(test)]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Run `request` until it succeeds, fails for a reason other than rate
    /// limiting, or exhausts the attempt budget.
    ///
    /// After the `n`-th rate-limited reply (counting from 0) this sleeps
    /// `unit * base^n` plus jitter. No sleep follows the final attempt.
    ///
    /// # Returns
    ///
    /// The first response classified as [`FetchStatus::Ok`].
    ///
    /// # Errors
    ///
    /// * [`IngestError::QuotaExhausted`] - every one of `max_attempts` requests was rate limited
    /// * [`IngestError::Remote`] - any other non-success status, returned without retrying
    /// * Transport and decode errors from the inner endpoint, unchanged
    #[instrument(level = "debug", skip_all, fields(page = request.page, query = %request.query))]
    pub async fn execute(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let total_t0 = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = RetryState::new(&self.policy);

        loop {
            let response = self.inner.search(request).await?;

            match response.status {
                FetchStatus::Ok => return Ok(response),
                FetchStatus::Failed(status) => {
                    warn!(
                        status,
                        attempt = state.attempt,
                        body = %truncate_for_log(&response.body.to_string(), 300),
                        "remote returned an error status"
                    );
                    return Err(IngestError::Remote {
                        status,
                        payload: response.body,
                    });
                }
                FetchStatus::RateLimited => {
                    let attempts = state.attempt + 1;
                    if attempts >= max_attempts {
                        error!(
                            attempts,
                            max = max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            "rate limit retries exhausted"
                        );
                        return Err(IngestError::QuotaExhausted {
                            attempts,
                            payload: response.body,
                        });
                    }

                    let delay = state.next_delay + self.policy.jitter();
                    warn!(
                        attempt = state.attempt,
                        max = max_attempts,
                        ?delay,
                        "rate limited; backing off"
                    );
                    sleep(delay).await;
                    state.advance(&self.policy);
                }
            }
        }
    }
}

impl<T> fmt::Debug for RetryOnRateLimit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOnRateLimit")
            .field("policy", &self.policy)
            .finish()
    }
}
