//! Reddit submission feed.
//!
//! Reddit has no push API, so the feed polls the combined `/r/a+b+c/new`
//! listing with an application-only OAuth token and yields every submission
//! it has not yielded before, oldest first. The first poll replays whatever
//! the listing currently holds (up to 100 items).
//!
//! The feed does not reconnect. Once the token endpoint or the listing fails,
//! the stream yields one [`IngestError::Connection`] and ends.

use crate::error::{IngestError, Result};
use crate::stream::SubmissionFeed;
use futures::Stream;
use futures::stream;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const DEFAULT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com/";

const LISTING_LIMIT: &str = "100";
const SEEN_CAPACITY: usize = 301;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Application credentials. Always supplied from the environment or CLI.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RedditFeedConfig {
    pub token_url: String,
    pub api_base: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct RedditFeed {
    client: reqwest::Client,
    credentials: RedditCredentials,
    token_url: Url,
    listing_url: Url,
    topics: Vec<String>,
    poll_interval: Duration,
}

impl RedditFeed {
    pub fn new(
        credentials: RedditCredentials,
        topics: Vec<String>,
        config: &RedditFeedConfig,
    ) -> Result<Self> {
        if topics.is_empty() {
            return Err(IngestError::Config("no subreddits configured".into()));
        }
        let token_url = Url::parse(&config.token_url)
            .map_err(|e| IngestError::Config(format!("reddit token url: {e}")))?;
        let listing_url = Url::parse(&config.api_base)
            .and_then(|base| base.join(&format!("r/{}/new", topics.join("+"))))
            .map_err(|e| IngestError::Config(format!("reddit api base: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(credentials.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            credentials,
            token_url,
            listing_url,
            topics,
            poll_interval: config.poll_interval,
        })
    }
}

impl SubmissionFeed for RedditFeed {
    fn topics(&self) -> &[String] {
        &self.topics
    }

    fn submissions(self) -> impl Stream<Item = Result<Value>> {
        let poller = Poller {
            feed: self,
            token: None,
            seen: SeenIds::new(SEEN_CAPACITY),
            pending: VecDeque::new(),
            polled: false,
            done: false,
        };
        stream::unfold(poller, |mut p| async move {
            let item = p.next_item().await?;
            Some((item, p))
        })
    }
}

#[derive(Deserialize)]
struct TokenReply {
    access_token: String,
    expires_in: u64,
}

/// Insertion-ordered set that forgets its oldest ids past `capacity`.
#[derive(Debug)]
struct SeenIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `true` if `id` was not seen yet.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }
}

struct Poller {
    feed: RedditFeed,
    token: Option<(String, Instant)>,
    seen: SeenIds,
    pending: VecDeque<Value>,
    polled: bool,
    done: bool,
}

impl Poller {
    async fn next_item(&mut self) -> Option<Result<Value>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if self.polled {
                sleep(self.feed.poll_interval).await;
            }
            self.polled = true;

            match self.poll().await {
                Ok(items) => self.pending.extend(items),
                Err(e) => {
                    self.done = true;
                    return Some(Err(IngestError::Connection(e.to_string())));
                }
            }
        }
    }

    async fn bearer(&mut self) -> Result<String> {
        if let Some((token, expires)) = &self.token {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let resp = self
            .feed
            .client
            .post(self.feed.token_url.clone())
            .basic_auth(
                &self.feed.credentials.client_id,
                Some(&self.feed.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::Remote {
                status: status.as_u16(),
                payload: Value::String(resp.text().await.unwrap_or_default()),
            });
        }
        let reply: TokenReply = resp.json().await?;
        let lifetime = Duration::from_secs(reply.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        info!(expires_in = reply.expires_in, "Obtained reddit access token");

        self.token = Some((reply.access_token.clone(), Instant::now() + lifetime));
        Ok(reply.access_token)
    }

    /// One listing request. Returns unseen submissions, oldest first.
    #[instrument(level = "debug", skip_all)]
    async fn poll(&mut self) -> Result<Vec<Value>> {
        let token = self.bearer().await?;
        let resp = self
            .feed
            .client
            .get(self.feed.listing_url.clone())
            .bearer_auth(token)
            .query(&[("limit", LISTING_LIMIT), ("raw_json", "1")])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Reddit token rejected; re-authenticating on next poll");
            self.token = None;
            return Ok(Vec::new());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Reddit listing rate limited; waiting for next poll");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(IngestError::Remote {
                status: status.as_u16(),
                payload: Value::String(resp.text().await.unwrap_or_default()),
            });
        }

        let listing: Value = resp.json().await?;
        let fresh = unseen_oldest_first(&listing, &mut self.seen);
        debug!(count = fresh.len(), "Polled listing");
        Ok(fresh)
    }
}

/// Pull `data.children[*].data` out of a listing, drop already-seen ids and
/// flip reddit's newest-first order.
fn unseen_oldest_first(listing: &Value, seen: &mut SeenIds) -> Vec<Value> {
    let children = listing
        .pointer("/data/children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    children
        .iter()
        .rev()
        .map(|child| child.get("data").cloned().unwrap_or(Value::Null))
        .filter(|item| match item.get("id").and_then(Value::as_str) {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect()
}
