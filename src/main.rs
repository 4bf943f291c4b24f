//! # Chatter Ingest
//!
//! Rate-limited acquisition of raw market chatter: paginated news search
//! results and a live feed of reddit submissions, persisted verbatim into
//! one directory per logical day for later offline processing.
//!
//! ## Usage
//!
//! ```sh
//! chatter_ingest news                      # yesterday's headlines (UTC)
//! chatter_ingest tickers --subjects-file sp500.txt
//! chatter_ingest reddit                    # runs until the connection drops
//! ```
//!
//! ## Architecture
//!
//! 1. **Backoff** ([`api`]): retries rate-limited requests with exponential delay
//! 2. **Batch** ([`batch`]): pages or subject groups for one day, persisted as they arrive
//! 3. **Stream** ([`stream`]): one submission at a time, filed by its creation date
//! 4. **Sink** ([`outputs::sink`]): `data_root/YYYY-MM-DD/…`
//!
//! Scheduling is external: run `news`/`tickers` once per day from cron and
//! keep `reddit` alive under a process supervisor.

use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod batch;
mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod partition;
mod scrapers;
mod stream;
#[cfg(test)]
mod testing;
mod utils;

use api::RetryOnRateLimit;
use batch::BatchFetcher;
use cli::{BatchArgs, Cli, Command};
use config::Config;
use outputs::sink::PartitionSink;
use scrapers::newsapi::NewsApiClient;
use scrapers::reddit::{RedditCredentials, RedditFeed};
use scrapers::subjects::load_subjects;
use stream::StreamTailer;
use utils::yesterday_utc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    let args = Cli::parse();
    debug!(?args.config, ?args.data_dir, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    let sink = PartitionSink::new(&config.data_dir);

    let result = match args.command {
        Command::News {
            batch,
            query,
            max_pages,
        } => {
            if let Some(q) = query {
                config.news.query = q;
            }
            if let Some(n) = max_pages {
                config.news.max_pages = n;
            }
            config.validate()?;
            sink.ensure_writable().await?;
            run_news(&config, sink, batch).await
        }
        Command::Tickers {
            batch,
            subjects,
            subjects_file,
            subjects_url,
            group_size,
        } => {
            config.apply_tickers_overrides(group_size, subjects_file, subjects_url);
            config.validate()?;
            sink.ensure_writable().await?;
            run_tickers(&config, sink, batch, subjects).await
        }
        Command::Reddit {
            client_id,
            client_secret,
            user_agent,
            subreddits,
        } => {
            if !subreddits.is_empty() {
                config.reddit.subreddits = subreddits;
            }
            config.validate()?;
            sink.ensure_writable().await?;
            let credentials = RedditCredentials {
                client_id,
                client_secret,
                user_agent,
            };
            run_reddit(&config, sink, credentials).await
        }
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result.map_err(Into::into)
}

async fn run_news(config: &Config, sink: PartitionSink, args: BatchArgs) -> error::Result<()> {
    let date = args.date.unwrap_or_else(yesterday_utc);
    info!(%date, query = %config.news.query, "Fetching headlines");

    let client = NewsApiClient::new(&config.news.base_url, args.api_key, config.http_timeout())?;
    let fetcher = BatchFetcher::new(
        RetryOnRateLimit::new(client, config.backoff_policy()),
        sink,
        config.news_settings(),
    );
    fetcher.run(date, None).await?;
    Ok(())
}

async fn run_tickers(
    config: &Config,
    sink: PartitionSink,
    args: BatchArgs,
    inline: Vec<String>,
) -> error::Result<()> {
    let date = args.date.unwrap_or_else(yesterday_utc);

    let source = config.subject_source(inline)?;
    let subjects = load_subjects(&source, config.http_timeout()).await?;
    info!(%date, subjects = subjects.len(), group_size = config.tickers.group_size, "Fetching ticker groups");

    let client = NewsApiClient::new(&config.news.base_url, args.api_key, config.http_timeout())?;
    let fetcher = BatchFetcher::new(
        RetryOnRateLimit::new(client, config.backoff_policy()),
        sink,
        config.tickers_settings(),
    );
    fetcher.run(date, Some(&subjects)).await?;
    Ok(())
}

async fn run_reddit(
    config: &Config,
    sink: PartitionSink,
    credentials: RedditCredentials,
) -> error::Result<()> {
    let feed = RedditFeed::new(
        credentials,
        config.reddit.subreddits.clone(),
        &config.reddit_feed_config(),
    )?;
    let tailer = StreamTailer::new(sink, config.tailer_settings());
    let report = tailer.tail(feed).await?;
    info!(processed = report.processed, failed = report.failed, "Stream ended");
    Ok(())
}
