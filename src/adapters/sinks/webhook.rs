//! HTTP webhook sink.
//!
//! POSTs each result body to a fixed URL. Any non-2xx response is a delivery
//! failure; the response body is included in the error to aid debugging.

use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::ConfigSource;
use crate::core::{Context, EventSink};
use crate::domain::{InvocationResult, SinkError};

pub const MODULE_PATH: &str = "builtin/webhook";
pub const SYMBOL: &str = "WebhookSink";

pub const SINK_WEBHOOK_URL: &str = "SINK_WEBHOOK_URL";
pub const SINK_WEBHOOK_TIMEOUT_MILLIS: &str = "SINK_WEBHOOK_TIMEOUT_MILLIS";

const DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;
const INVOCATION_ID_HEADER: &str = "X-Invocation-Id";

pub struct WebhookSink {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: reqwest::Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: reqwest::Url, client: reqwest::Client) -> Self {
        Self { url, client }
    }

    pub fn from_source(config: &dyn ConfigSource) -> Result<Self> {
        let raw = config
            .value(SINK_WEBHOOK_URL)
            .with_context(|| format!("{} is required for {}", SINK_WEBHOOK_URL, MODULE_PATH))?;
        let url = reqwest::Url::parse(&raw)
            .with_context(|| format!("Invalid {}: {}", SINK_WEBHOOK_URL, raw))?;
        let timeout_millis = config
            .value(SINK_WEBHOOK_TIMEOUT_MILLIS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MILLIS);

        Self::new(url, Duration::from_millis(timeout_millis))
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn consume(&self, _ctx: &Context, result: &InvocationResult) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(INVOCATION_ID_HEADER, result.id.to_string())
            .body(result.data.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected(format!(
                "Webhook returned {}: {}",
                status,
                body.trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_requires_url() {
        let err = WebhookSink::from_source(&settings(&[])).err().unwrap();
        assert!(err.to_string().contains(SINK_WEBHOOK_URL));
    }

    #[test]
    fn test_rejects_malformed_url() {
        let err = WebhookSink::from_source(&settings(&[(SINK_WEBHOOK_URL, "not a url")]))
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("Invalid SINK_WEBHOOK_URL"));
    }

    #[test]
    fn test_parses_url() {
        let sink = WebhookSink::from_source(&settings(&[(
            SINK_WEBHOOK_URL,
            "http://localhost:9000/results",
        )]))
        .unwrap();
        assert_eq!(sink.url().path(), "/results");
    }

    /// Answer one HTTP request with `status` and hand back the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (reqwest::Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = reqwest::Url::parse(&format!("http://{}/hook", listener.local_addr().unwrap())).unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers ended");
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            while request.len() < header_end + content_length {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before body ended");
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    fn local_sink(url: reqwest::Url) -> WebhookSink {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        WebhookSink::with_client(url, client)
    }

    #[tokio::test]
    async fn test_consume_posts_result_with_invocation_id() {
        let (url, server) = serve_once("200 OK", "").await;
        let sink = local_sink(url);
        let result = InvocationResult::new(Uuid::new_v4(), "payload", Duration::ZERO);

        sink.consume(&Context::background(), &result).await.unwrap();

        let request = server.await.unwrap();
        let lowered = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /hook "));
        assert!(lowered.contains(&format!("x-invocation-id: {}", result.id)));
        assert!(lowered.contains("content-type: application/octet-stream"));
        assert!(request.ends_with("payload"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (url, server) = serve_once("500 Internal Server Error", "queue full\n").await;
        let sink = local_sink(url);
        let result = InvocationResult::new(Uuid::new_v4(), "payload", Duration::ZERO);

        let err = sink.consume(&Context::background(), &result).await.unwrap_err();

        match err {
            SinkError::Rejected(message) => {
                assert!(message.contains("500"));
                assert!(message.ends_with("queue full"));
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
        assert!(server.await.unwrap().to_ascii_lowercase().contains("x-invocation-id"));
    }
}
