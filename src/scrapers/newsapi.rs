//! NewsAPI `/v2/everything` search client.
//!
//! Implements [`SearchEndpoint`] for the batch fetcher. The API key travels in
//! the `X-Api-Key` header so it never appears in logged URLs.
//!
//! # Response classification
//!
//! | Reply | Status |
//! |-------|--------|
//! | HTTP 429, or body `code = "rateLimited"` | [`FetchStatus::RateLimited`] |
//! | HTTP 2xx with body `status = "ok"` | [`FetchStatus::Ok`] |
//! | anything else | [`FetchStatus::Failed`] with the HTTP status |

use crate::api::SearchEndpoint;
use crate::error::{IngestError, Result};
use crate::models::{FetchRequest, FetchResponse, FetchStatus, Record};
use crate::utils::truncate_for_log;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2/everything";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug)]
pub struct NewsApiClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl NewsApiClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| IngestError::Config(format!("news base url {base_url:?}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

fn query_params(request: &FetchRequest) -> Vec<(&'static str, String)> {
    vec![
        ("q", request.query.clone()),
        ("from", request.window.from.format(DATETIME_FORMAT).to_string()),
        ("to", request.window.to.format(DATETIME_FORMAT).to_string()),
        ("language", request.language.clone()),
        ("sortBy", request.sort_by.clone()),
        ("pageSize", request.page_size.to_string()),
        ("page", request.page.to_string()),
    ]
}

/// Turn an HTTP status and raw body into a [`FetchResponse`].
pub fn classify(http_status: u16, text: &str) -> Result<FetchResponse> {
    let success = (200..300).contains(&http_status);

    let body: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) if success => {
            return Err(IngestError::Decode(format!(
                "{e}: {}",
                truncate_for_log(text, 200)
            )));
        }
        Err(_) => Value::String(text.to_string()),
    };

    let code = body.get("code").and_then(Value::as_str);
    let ok = body.get("status").and_then(Value::as_str) == Some("ok");

    let status = if http_status == 429 || code == Some("rateLimited") {
        FetchStatus::RateLimited
    } else if success && ok {
        FetchStatus::Ok
    } else {
        FetchStatus::Failed(http_status)
    };

    let records: Vec<Record> = if status == FetchStatus::Ok {
        body.get("articles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| a.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(FetchResponse {
        status,
        total_results: body.get("totalResults").and_then(Value::as_u64),
        records,
        body,
    })
}

impl SearchEndpoint for NewsApiClient {
    #[instrument(level = "debug", skip_all, fields(page = request.page))]
    async fn search(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let resp = self
            .client
            .get(self.base_url.clone())
            .header("X-Api-Key", &self.api_key)
            .query(&query_params(request))
            .send()
            .await?;
        let http_status = resp.status().as_u16();
        let text = resp.text().await?;

        let response = classify(http_status, &text)?;
        debug!(
            http_status,
            status = ?response.status,
            count = response.records.len(),
            total = ?response.total_results,
            "NewsAPI reply"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{request_for_page, serve_canned};
    use serde_json::json;

    #[test]
    fn test_classify_ok_page() {
        let body = json!({
            "status": "ok",
            "totalResults": 2,
            "articles": [{"title": "a"}, {"title": "b"}]
        });
        let r = classify(200, &body.to_string()).unwrap();
        assert_eq!(r.status, FetchStatus::Ok);
        assert_eq!(r.records.len(), 2);
        assert_eq!(r.total_results, Some(2));
        assert_eq!(r.body, body);
    }

    #[test]
    fn test_classify_rate_limit_by_status_or_code() {
        let body = json!({"status": "error", "code": "rateLimited", "message": "slow down"});
        assert_eq!(
            classify(429, &body.to_string()).unwrap().status,
            FetchStatus::RateLimited
        );
        assert_eq!(
            classify(200, &body.to_string()).unwrap().status,
            FetchStatus::RateLimited
        );
        assert_eq!(
            classify(429, "Too Many Requests").unwrap().status,
            FetchStatus::RateLimited
        );
    }

    #[test]
    fn test_classify_other_errors() {
        let body = json!({"status": "error", "code": "maximumResultsReached"});
        let r = classify(426, &body.to_string()).unwrap();
        assert_eq!(r.status, FetchStatus::Failed(426));
        assert!(r.records.is_empty());

        let gateway = classify(502, "<html>bad gateway</html>").unwrap();
        assert_eq!(gateway.status, FetchStatus::Failed(502));
        assert_eq!(gateway.body, json!("<html>bad gateway</html>"));
    }

    #[test]
    fn test_classify_garbage_success_is_decode_error() {
        assert!(matches!(
            classify(200, "{not json"),
            Err(IngestError::Decode(_))
        ));
    }

    #[test]
    fn test_query_params_use_full_day_bounds() {
        let params = query_params(&request_for_page(3));
        assert!(params.contains(&("from", "2024-05-01T00:00:00".to_string())));
        assert!(params.contains(&("to", "2024-05-01T23:59:59".to_string())));
        assert!(params.contains(&("page", "3".to_string())));
        assert!(params.contains(&("pageSize", "100".to_string())));
        assert!(params.contains(&("sortBy", "publishedAt".to_string())));
    }

    #[tokio::test]
    async fn test_search_sends_key_header_and_query() {
        let body = json!({"status": "ok", "totalResults": 1, "articles": [{"title": "x"}]});
        let (base, server) = serve_canned(vec![(200, body.to_string())]).await;
        let client = NewsApiClient::new(
            &format!("{base}/v2/everything"),
            "secret-key".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        let r = client.search(&request_for_page(1)).await.unwrap();
        assert_eq!(r.records.len(), 1);

        let heads = server.await.unwrap();
        let head = heads[0].to_ascii_lowercase();
        assert!(head.starts_with("get /v2/everything?q=news&"));
        assert!(head.contains("x-api-key: secret-key"));
        assert!(!head.contains("apikey="));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = NewsApiClient::new("not a url", "k".into(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }
}
