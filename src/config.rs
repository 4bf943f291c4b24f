//! Pipeline tunables loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or none at all) is valid.
//! Secrets are never read from here; they come from the CLI or environment.
//!
//! ```yaml
//! data_dir: data/raw
//! news:
//!   query: news
//!   page_size: 100
//!   max_pages: 100
//!   courtesy_delay_ms: 1000
//! backoff:
//!   base: 2
//!   unit_ms: 1000
//!   max_attempts: 5
//! reddit:
//!   subreddits: [stocks, wallstreetbets, investing]
//!   throttle_ms: 1000
//! ```

use crate::api::BackoffPolicy;
use crate::batch::BatchSettings;
use crate::error::{IngestError, Result};
use crate::scrapers::subjects::SubjectSource;
use crate::scrapers::{newsapi, reddit};
use crate::stream::TailerSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: PathBuf,
    pub http_timeout_ms: u64,
    pub backoff: BackoffConfig,
    pub news: NewsConfig,
    pub tickers: TickersConfig,
    pub reddit: RedditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/raw"),
            http_timeout_ms: 30_000,
            backoff: BackoffConfig::default(),
            news: NewsConfig::default(),
            tickers: TickersConfig::default(),
            reddit: RedditConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    pub base: u32,
    pub unit_ms: u64,
    pub max_attempts: u32,
    pub max_jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: 2,
            unit_ms: 1_000,
            max_attempts: 5,
            max_jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewsConfig {
    pub base_url: String,
    pub query: String,
    pub language: String,
    pub sort_by: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub courtesy_delay_ms: u64,
    pub artifact_prefix: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: newsapi::DEFAULT_BASE_URL.to_string(),
            query: "news".to_string(),
            language: "en".to_string(),
            sort_by: "publishedAt".to_string(),
            page_size: 100,
            max_pages: 100,
            courtesy_delay_ms: 1_000,
            artifact_prefix: "headlines_page".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TickersConfig {
    pub group_size: usize,
    /// Requests allowed per run (the daily quota of the search plan).
    pub max_requests: u32,
    pub courtesy_delay_ms: u64,
    pub page_size: u32,
    pub artifact_prefix: String,
    pub subjects_file: Option<PathBuf>,
    pub subjects_url: Option<String>,
    pub subjects_selector: String,
}

impl Default for TickersConfig {
    fn default() -> Self {
        Self {
            group_size: 10,
            max_requests: 100,
            courtesy_delay_ms: 1_000,
            page_size: 100,
            artifact_prefix: "tickers_group".to_string(),
            subjects_file: None,
            subjects_url: None,
            subjects_selector: "#constituents tbody tr td:first-child".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedditConfig {
    pub subreddits: Vec<String>,
    pub throttle_ms: u64,
    pub poll_interval_ms: u64,
    pub log_name: String,
    /// Keys kept from each submission; empty stores submissions verbatim.
    pub fields: Vec<String>,
    pub token_url: String,
    pub api_base: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddits: vec![
                "stocks".to_string(),
                "wallstreetbets".to_string(),
                "investing".to_string(),
            ],
            throttle_ms: 1_000,
            poll_interval_ms: 5_000,
            log_name: "reddit_stream.jsonl".to_string(),
            fields: Vec::new(),
            token_url: reddit::DEFAULT_TOKEN_URL.to_string(),
            api_base: reddit::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Read `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.news.page_size == 0 || self.news.page_size > 100 {
            return Err(IngestError::Config(format!(
                "news.page_size must be within 1..=100, got {}",
                self.news.page_size
            )));
        }
        if self.tickers.page_size == 0 || self.tickers.page_size > 100 {
            return Err(IngestError::Config(format!(
                "tickers.page_size must be within 1..=100, got {}",
                self.tickers.page_size
            )));
        }
        if self.tickers.group_size == 0 {
            return Err(IngestError::Config("tickers.group_size must be positive".into()));
        }
        if self.backoff.base < 2 {
            return Err(IngestError::Config(format!(
                "backoff.base must be at least 2, got {}",
                self.backoff.base
            )));
        }
        if self.backoff.max_attempts == 0 {
            return Err(IngestError::Config("backoff.max_attempts must be positive".into()));
        }
        if self.reddit.subreddits.is_empty() {
            return Err(IngestError::Config("reddit.subreddits must not be empty".into()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: self.backoff.base,
            unit: Duration::from_millis(self.backoff.unit_ms),
            max_attempts: self.backoff.max_attempts,
            max_jitter: Duration::from_millis(self.backoff.max_jitter_ms),
        }
    }

    pub fn news_settings(&self) -> BatchSettings {
        BatchSettings {
            query: self.news.query.clone(),
            language: self.news.language.clone(),
            sort_by: self.news.sort_by.clone(),
            page_size: self.news.page_size,
            max_pages: self.news.max_pages,
            group_size: self.tickers.group_size,
            courtesy_delay: Duration::from_millis(self.news.courtesy_delay_ms),
            artifact_prefix: self.news.artifact_prefix.clone(),
        }
    }

    /// Apply `tickers` command-line flags on top of the file values.
    ///
    /// A subject file or URL given on the command line replaces whichever
    /// source the file configured, so the two never compete.
    pub fn apply_tickers_overrides(
        &mut self,
        group_size: Option<usize>,
        subjects_file: Option<PathBuf>,
        subjects_url: Option<String>,
    ) {
        if let Some(n) = group_size {
            self.tickers.group_size = n;
        }
        if let Some(path) = subjects_file {
            self.tickers.subjects_file = Some(path);
            self.tickers.subjects_url = None;
        }
        if let Some(url) = subjects_url {
            self.tickers.subjects_url = Some(url);
            self.tickers.subjects_file = None;
        }
    }

    /// Pick the subject list source: inline subjects, then a file, then a page.
    pub fn subject_source(&self, inline: Vec<String>) -> Result<SubjectSource> {
        if !inline.is_empty() {
            return Ok(SubjectSource::Inline(inline));
        }
        if let Some(path) = &self.tickers.subjects_file {
            return Ok(SubjectSource::File(path.clone()));
        }
        if let Some(url) = &self.tickers.subjects_url {
            return Ok(SubjectSource::Html {
                url: url.clone(),
                selector: self.tickers.subjects_selector.clone(),
            });
        }
        Err(IngestError::Config(
            "no subjects: pass --subjects, --subjects-file or --subjects-url".into(),
        ))
    }

    pub fn tickers_settings(&self) -> BatchSettings {
        BatchSettings {
            query: self.news.query.clone(),
            language: self.news.language.clone(),
            sort_by: self.news.sort_by.clone(),
            page_size: self.tickers.page_size,
            max_pages: self.tickers.max_requests,
            group_size: self.tickers.group_size,
            courtesy_delay: Duration::from_millis(self.tickers.courtesy_delay_ms),
            artifact_prefix: self.tickers.artifact_prefix.clone(),
        }
    }

    pub fn tailer_settings(&self) -> TailerSettings {
        TailerSettings {
            throttle: Duration::from_millis(self.reddit.throttle_ms),
            log_name: self.reddit.log_name.clone(),
            fields: self.reddit.fields.clone(),
        }
    }

    pub fn reddit_feed_config(&self) -> reddit::RedditFeedConfig {
        reddit::RedditFeedConfig {
            token_url: self.reddit.token_url.clone(),
            api_base: self.reddit.api_base.clone(),
            poll_interval: Duration::from_millis(self.reddit.poll_interval_ms),
            timeout: self.http_timeout(),
        }
    }
}
