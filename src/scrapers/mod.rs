//! Adapters for the remote sources.
//!
//! | Source | Module | Role |
//! |--------|--------|------|
//! | NewsAPI `/v2/everything` | [`newsapi`] | paginated search endpoint for the batch fetcher |
//! | Reddit `/r/{topics}/new` | [`reddit`] | submission feed for the stream tailer |
//! | subject lists | [`subjects`] | ordered tickers/keywords for grouped batches |
//!
//! Adapters only speak HTTP and classify replies. Pacing, retries and
//! persistence live in the pipelines that drive them.

pub mod newsapi;
pub mod reddit;
pub mod subjects;
