//! Paginated batch fetcher.
//!
//! Pulls one logical day of results from a [`SearchEndpoint`] in one of two
//! shapes:
//!
//! - **Single query**: pages `1, 2, …` of one query until the remote runs dry,
//!   a page comes back short, a request fails, or the page ceiling is hit.
//! - **Subject groups**: one page per group of subjects, each group rendered as
//!   an OR query.
//!
//! Every page is persisted as soon as it arrives, so a later failure never
//! loses earlier pages. Requests are spaced by a fixed courtesy delay on top
//! of whatever the backoff controller waits after a rate-limit reply.
//!
//! ```text
//! Idle -> Fetching(1) -> Fetching(2) -> ... -> Exhausted | QuotaReached | Errored
//! ```

use crate::api::{RetryOnRateLimit, SearchEndpoint};
use crate::error::{IngestError, Result};
use crate::models::{DayWindow, FetchRequest, PartitionKey};
use crate::outputs::sink::PartitionSink;
use crate::partition::{or_query, partition};
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Tunables for one batch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    /// Query used in single-query mode.
    pub query: String,
    pub language: String,
    pub sort_by: String,
    pub page_size: u32,
    /// Request ceiling per run: pages in single-query mode, groups otherwise.
    pub max_pages: u32,
    /// Subjects per OR query in grouped mode.
    pub group_size: usize,
    pub courtesy_delay: Duration,
    /// Snapshot file stem; `_<n>.json` is appended per page or group.
    pub artifact_prefix: String,
}

/// Where the fetch loop is. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Fetching { page: u32 },
    /// The remote ran out of results (empty or short page, or all groups done).
    Exhausted,
    /// The configured request ceiling was reached.
    QuotaReached,
    /// A request failed; earlier pages stay persisted.
    Errored,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Exhausted | BatchState::QuotaReached | BatchState::Errored
        )
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub date: PartitionKey,
    pub requests: u32,
    pub pages_persisted: u32,
    pub records: usize,
    pub failed_groups: u32,
    pub terminal: BatchState,
}

impl BatchReport {
    fn new(date: PartitionKey) -> Self {
        Self {
            date,
            requests: 0,
            pages_persisted: 0,
            records: 0,
            failed_groups: 0,
            terminal: BatchState::Idle,
        }
    }
}

/// Sequential fetch loop over a rate-limit-aware endpoint.
pub struct BatchFetcher<E> {
    endpoint: RetryOnRateLimit<E>,
    sink: PartitionSink,
    settings: BatchSettings,
}

impl<E: SearchEndpoint> BatchFetcher<E> {
    pub fn new(endpoint: RetryOnRateLimit<E>, sink: PartitionSink, settings: BatchSettings) -> Self {
        Self {
            endpoint,
            sink,
            settings,
        }
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &RetryOnRateLimit<E> {
        &self.endpoint
    }

    /// Ingest one logical day.
    ///
    /// # Arguments
    ///
    /// * `date` - The day to fetch; the request window covers it in UTC and
    ///   every artifact lands in its `YYYY-MM-DD` partition
    /// * `subjects` - When given, one OR query per group of
    ///   `group_size` subjects; otherwise the configured query is paginated
    ///
    /// # Returns
    ///
    /// A [`BatchReport`] whose `terminal` state says why the loop stopped.
    /// Remote failures end the run early and only show up there.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Persistence`] if a page cannot be written.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let fetcher = BatchFetcher::new(retrying_client, sink, config.news_settings());
    /// let report = fetcher.run(yesterday_utc(), None).await?;
    /// info!(records = report.records, "done");
    /// ```
    pub async fn run(&self, date: NaiveDate, subjects: Option<&[String]>) -> Result<BatchReport> {
        let report = match subjects {
            Some(subjects) => self.run_grouped(date, subjects).await?,
            None => self.run_paginated(date).await?,
        };
        info!(
            date = %report.date,
            requests = report.requests,
            pages = report.pages_persisted,
            records = report.records,
            failed_groups = report.failed_groups,
            terminal = ?report.terminal,
            "Batch run finished"
        );
        Ok(report)
    }

    fn request(&self, query: String, window: DayWindow, page: u32) -> FetchRequest {
        FetchRequest {
            query,
            window,
            page,
            page_size: self.settings.page_size,
            sort_by: self.settings.sort_by.clone(),
            language: self.settings.language.clone(),
        }
    }

    fn artifact_name(&self, n: u32) -> String {
        format!("{}_{}.json", self.settings.artifact_prefix, n)
    }

    /// Page through the configured query for one day.
    #[instrument(level = "info", skip(self), fields(query = %self.settings.query))]
    pub async fn run_paginated(&self, date: NaiveDate) -> Result<BatchReport> {
        let key = PartitionKey::new(date);
        let window = DayWindow::utc(date);
        let mut report = BatchReport::new(key);

        let mut state = if self.settings.max_pages == 0 {
            BatchState::QuotaReached
        } else {
            BatchState::Fetching { page: 1 }
        };

        while let BatchState::Fetching { page } = state {
            let request = self.request(self.settings.query.clone(), window, page);
            report.requests += 1;

            state = match self.endpoint.execute(&request).await {
                Err(e) => {
                    warn!(page, error = %e, payload = %payload_preview(&e), "Page fetch failed; stopping run");
                    BatchState::Errored
                }
                Ok(response) if response.is_empty() => {
                    info!(page, "No articles on page; stopping");
                    BatchState::Exhausted
                }
                Ok(response) => {
                    let count = response.records.len();
                    self.sink
                        .write_snapshot(&key, &self.artifact_name(page), &response.body)
                        .await?;
                    report.pages_persisted += 1;
                    report.records += count;
                    info!(page, count, "Saved page");

                    if count < self.settings.page_size as usize {
                        info!(page, "Short page; retrieved all available articles");
                        BatchState::Exhausted
                    } else if page >= self.settings.max_pages {
                        info!(page, max_pages = self.settings.max_pages, "Page ceiling reached");
                        BatchState::QuotaReached
                    } else {
                        sleep(self.settings.courtesy_delay).await;
                        BatchState::Fetching { page: page + 1 }
                    }
                }
            };
        }

        debug_assert!(state.is_terminal());
        report.terminal = state;
        Ok(report)
    }

    /// Fetch one page per subject group for one day.
    ///
    /// A group whose rate-limit retries run out is logged and skipped; the
    /// remaining groups still run. Any other failure stops the loop as
    /// [`BatchState::Errored`].
    #[instrument(level = "info", skip(self, subjects), fields(subjects = subjects.len(), group_size = self.settings.group_size))]
    pub async fn run_grouped(&self, date: NaiveDate, subjects: &[String]) -> Result<BatchReport> {
        let key = PartitionKey::new(date);
        let window = DayWindow::utc(date);
        let mut report = BatchReport::new(key);
        report.terminal = BatchState::Exhausted;

        for (i, group) in partition(subjects, self.settings.group_size).enumerate() {
            let n = i as u32 + 1;
            if report.requests >= self.settings.max_pages {
                info!(group = n, max_pages = self.settings.max_pages, "Request ceiling reached; remaining groups skipped");
                report.terminal = BatchState::QuotaReached;
                break;
            }
            if report.requests > 0 {
                sleep(self.settings.courtesy_delay).await;
            }

            let request = self.request(or_query(group), window, 1);
            report.requests += 1;

            match self.endpoint.execute(&request).await {
                Ok(response) if response.is_empty() => {
                    info!(group = n, "No articles for group");
                }
                Ok(response) => {
                    let count = response.records.len();
                    self.sink
                        .write_snapshot(&key, &self.artifact_name(n), &response.body)
                        .await?;
                    report.pages_persisted += 1;
                    report.records += count;
                    info!(group = n, count, "Saved group");
                }
                Err(e @ IngestError::QuotaExhausted { .. }) => {
                    report.failed_groups += 1;
                    warn!(
                        group = n,
                        subjects = ?group,
                        error = %e,
                        payload = %payload_preview(&e),
                        "Group rate limited; skipping"
                    );
                }
                Err(e) => {
                    warn!(
                        group = n,
                        subjects = ?group,
                        error = %e,
                        payload = %payload_preview(&e),
                        "Group fetch failed; stopping run"
                    );
                    report.terminal = BatchState::Errored;
                    break;
                }
            }
        }

        Ok(report)
    }
}

fn payload_preview(e: &IngestError) -> String {
    e.payload()
        .map(|p| truncate_for_log(&p.to_string(), 300))
        .unwrap_or_default()
}
