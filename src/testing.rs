//! Scripted remotes shared by the unit tests.

use crate::api::SearchEndpoint;
use crate::error::Result;
use crate::models::{DayWindow, FetchRequest, FetchResponse, FetchStatus, Record};
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Endpoint that replays a fixed list of responses and records every call.
pub struct ScriptedEndpoint {
    replies: Mutex<VecDeque<Result<FetchResponse>>>,
    fallback: Option<FetchResponse>,
    calls: Mutex<Vec<(Instant, FetchRequest)>>,
}

impl ScriptedEndpoint {
    /// Replays `replies` in order; calling past the end panics.
    pub fn new(replies: Vec<FetchResponse>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<FetchResponse>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with `reply`.
    pub fn repeating(reply: FetchResponse) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Time elapsed between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1].0 - w[0].0).collect()
    }
}

impl SearchEndpoint for ScriptedEndpoint {
    async fn search(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => panic!("ScriptedEndpoint ran out of replies"),
        }
    }
}

pub fn article(n: usize) -> Record {
    match json!({
        "title": format!("Article {n}"),
        "publishedAt": "2024-05-01T12:00:00Z",
        "url": format!("https://example.com/{n}"),
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Successful page holding `len` articles.
pub fn ok_page(len: usize) -> FetchResponse {
    let records: Vec<Record> = (0..len).map(article).collect();
    FetchResponse {
        status: FetchStatus::Ok,
        body: json!({
            "status": "ok",
            "totalResults": 1000,
            "articles": records.clone(),
        }),
        records,
        total_results: Some(1000),
    }
}

pub fn rate_limited() -> FetchResponse {
    FetchResponse {
        status: FetchStatus::RateLimited,
        records: vec![],
        total_results: None,
        body: json!({"status": "error", "code": "rateLimited"}),
    }
}

pub fn failed(status: u16) -> FetchResponse {
    FetchResponse {
        status: FetchStatus::Failed(status),
        records: vec![],
        total_results: None,
        body: json!({"status": "error", "code": "unexpectedError"}),
    }
}

pub fn request_for_page(page: u32) -> FetchRequest {
    FetchRequest {
        query: "news".into(),
        window: DayWindow::utc(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
        page,
        page_size: 100,
        sort_by: "publishedAt".into(),
        language: "en".into(),
    }
}

/// Serve the canned `(status, body)` replies over HTTP/1.1, one connection
/// each, and hand back the raw request heads once all replies are sent.
pub async fn serve_canned(
    replies: Vec<(u16, String)>,
) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut heads = Vec::new();
        for (status, body) in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let head = String::from_utf8_lossy(&buf).into_owned();
            let head_len = buf.windows(4).position(|w| w == b"\r\n\r\n").map_or(buf.len(), |p| p + 4);
            let body_len: usize = head
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while buf.len() < head_len + body_len {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            heads.push(String::from_utf8_lossy(&buf).into_owned());

            let response = format!(
                "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
        heads
    });

    (base, handle)
}
