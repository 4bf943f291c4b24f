//! Data models shared by the acquisition pipelines.
//!
//! - [`Record`]: one article or submission, stored exactly as received
//! - [`PartitionKey`]: the `YYYY-MM-DD` date a record is filed under
//! - [`DayWindow`]: the UTC bounds of one logical day
//! - [`FetchRequest`] / [`FetchResponse`]: one page exchanged with a search endpoint
//!
//! Records are deliberately untyped. The remote payload shape is outside our
//! control, so it is persisted verbatim and interpreted on read.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// A single article or submission as the remote returned it.
pub type Record = Map<String, Value>;

/// The calendar date a record belongs to, rendered as `YYYY-MM-DD`.
///
/// Derived from the logical query date for batch fetches and from the
/// record's own creation timestamp for streamed items, never from the
/// wall-clock time of the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// UTC date of a unix timestamp in (possibly fractional) seconds.
    pub fn from_unix_seconds(secs: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        Utc.timestamp_opt(whole as i64, nanos)
            .single()
            .map(|dt| Self(dt.date_naive()))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Inclusive UTC bounds of one logical day: `00:00:00` to `23:59:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DayWindow {
    pub fn utc(date: NaiveDate) -> Self {
        let from = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            from,
            to: from + TimeDelta::seconds(86_399),
        }
    }
}

/// Parameters of one page request against a search endpoint.
///
/// Built fresh for every page or subject group and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Free-text query, already OR-joined when it covers a subject group.
    pub query: String,
    pub window: DayWindow,
    /// 1-based page index.
    pub page: u32,
    pub page_size: u32,
    pub sort_by: String,
    pub language: String,
}

/// How the remote classified a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    RateLimited,
    Failed(u16),
}

/// One decoded page. Consumed by the caller immediately and never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: FetchStatus,
    pub records: Vec<Record>,
    /// Remote's total-available count; only informational.
    pub total_results: Option<u64>,
    /// The full body as received. Persisted as the page snapshot on success
    /// and carried as the error payload otherwise.
    pub body: Value,
}

impl FetchResponse {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_renders_iso_date() {
        let key = PartitionKey::new(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert_eq!(key.to_string(), "2024-03-07");
    }

    #[test]
    fn test_partition_key_from_unix_is_utc() {
        // 2024-05-01T23:59:59Z and one second later.
        let before = PartitionKey::from_unix_seconds(1_714_607_999.0).unwrap();
        let after = PartitionKey::from_unix_seconds(1_714_608_000.0).unwrap();
        assert_eq!(before.to_string(), "2024-05-01");
        assert_eq!(after.to_string(), "2024-05-02");
    }

    #[test]
    fn test_partition_key_accepts_fractional_seconds() {
        let key = PartitionKey::from_unix_seconds(1_714_607_999.75).unwrap();
        assert_eq!(key.to_string(), "2024-05-01");
    }

    #[test]
    fn test_partition_key_rejects_non_finite() {
        assert!(PartitionKey::from_unix_seconds(f64::NAN).is_none());
        assert!(PartitionKey::from_unix_seconds(f64::INFINITY).is_none());
    }

    #[test]
    fn test_day_window_covers_whole_day() {
        let w = DayWindow::utc(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(w.from.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert_eq!(w.to.to_rfc3339(), "2024-05-01T23:59:59+00:00");
    }

    #[test]
    fn test_day_window_on_last_day_of_year_stays_in_that_day() {
        let w = DayWindow::utc(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(w.to.to_rfc3339(), "2024-12-31T23:59:59+00:00");
        assert_eq!(w.to.date_naive(), w.from.date_naive());
    }
}
