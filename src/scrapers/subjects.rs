//! Subject list provider for the grouped batch mode.
//!
//! Subjects (ticker symbols, keywords) come from one of three places:
//!
//! | Source | Format |
//! |--------|--------|
//! | inline | comma-separated list on the command line |
//! | file | one subject per line, `#` starts a comment |
//! | html | any page + a CSS selector; the first text of each match is a subject |
//!
//! The list is read once per run and used as-is, in source order.

use crate::error::{IngestError, Result};
use scraper::{Html, Selector};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSource {
    Inline(Vec<String>),
    File(PathBuf),
    Html { url: String, selector: String },
}

/// Load the ordered subject list from `source`.
#[instrument(level = "info", skip_all)]
pub async fn load_subjects(source: &SubjectSource, timeout: Duration) -> Result<Vec<String>> {
    let subjects = match source {
        SubjectSource::Inline(items) => items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        SubjectSource::File(path) => {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                IngestError::Config(format!("reading subjects from {}: {e}", path.display()))
            })?;
            parse_subject_lines(&text)
        }
        SubjectSource::Html { url, selector } => {
            let url = Url::parse(url)
                .map_err(|e| IngestError::Config(format!("subjects url {url:?}: {e}")))?;
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            let resp = client.get(url.clone()).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(IngestError::Remote {
                    status: status.as_u16(),
                    payload: serde_json::Value::String(url.to_string()),
                });
            }
            let html = resp.text().await?;
            extract_subjects(&html, selector)?
        }
    };

    info!(count = subjects.len(), "Loaded subjects");
    debug!(?subjects, "Subjects");
    Ok(subjects)
}

/// One subject per line; blank lines and `#` comments are skipped.
pub fn parse_subject_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or_default().trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// First non-blank text node of every element matching `selector`.
pub fn extract_subjects(html: &str, selector: &str) -> Result<Vec<String>> {
    let selector = Selector::parse(selector)
        .map_err(|e| IngestError::Config(format!("subjects selector {selector:?}: {e}")))?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .filter_map(|el| {
            el.text()
                .map(str::trim)
                .find(|t| !t.is_empty())
                .map(str::to_string)
        })
        .collect())
}
