//! Command-line interface definitions.
//!
//! Secrets are only accepted as flags or environment variables, never from
//! the YAML config. Every other flag overrides its config-file counterpart.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Ingest raw news search results and reddit submissions into
/// date-partitioned JSON files.
///
/// # Examples
///
/// ```sh
/// # Yesterday's headlines, page by page
/// NEWSAPI_KEY=... chatter_ingest news
///
/// # One query per group of ten tickers for a given day
/// chatter_ingest tickers --date 2024-05-01 --subjects-file sp500.txt
///
/// # Tail r/stocks+r/investing forever
/// chatter_ingest reddit --subreddits stocks,investing
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "CHATTER_INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory of the date partitions
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Page through one search query for a single day
    News {
        #[command(flatten)]
        batch: BatchArgs,

        /// Search query (defaults to the config value)
        #[arg(short, long)]
        query: Option<String>,

        /// Page ceiling for this run
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Search once per group of subjects for a single day
    Tickers {
        #[command(flatten)]
        batch: BatchArgs,

        /// Comma-separated subjects
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["subjects_file", "subjects_url"])]
        subjects: Vec<String>,

        /// File with one subject per line
        #[arg(long, conflicts_with = "subjects_url")]
        subjects_file: Option<PathBuf>,

        /// Page to scrape subjects from (with `subjects_selector` from config)
        #[arg(long)]
        subjects_url: Option<String>,

        /// Subjects per query
        #[arg(long)]
        group_size: Option<usize>,
    },

    /// Stream new submissions from a set of subreddits until the connection drops
    Reddit {
        #[arg(long, env = "REDDIT_CLIENT_ID")]
        client_id: String,

        #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,

        #[arg(long, env = "REDDIT_USER_AGENT")]
        user_agent: String,

        /// Comma-separated subreddits (defaults to the config value)
        #[arg(long, value_delimiter = ',')]
        subreddits: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Logical day to ingest, `YYYY-MM-DD` (defaults to yesterday, UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// NewsAPI key
    #[arg(long, env = "NEWSAPI_KEY", hide_env_values = true)]
    pub api_key: String,
}
