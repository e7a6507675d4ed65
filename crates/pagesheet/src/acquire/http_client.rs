//! reqwest-based GET client used for static pages and image downloads.
//!
//! Sends a browser-like header set, follows redirects, and retries 5xx and
//! 429 responses a bounded number of times.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::StatusCode;
use tracing::debug;

use crate::types::AcquisitionError;

/// Default desktop Chrome user-agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

/// Successful response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client shared by page acquisition and image fetching.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
    timeout_ms: u64,
    max_retries: u32,
}

impl HttpClient {
    /// Create a client sending `user_agent` plus browser-like Accept headers.
    pub fn new(user_agent: &str, timeout_ms: u64, max_retries: u32) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let build = |h1_only: bool| {
            let mut builder = reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .redirect(reqwest::redirect::Policy::limited(5))
                .user_agent(user_agent)
                .default_headers(headers.clone());
            if h1_only {
                builder = builder.http1_only();
            }
            builder.build().unwrap_or_default()
        };

        Self {
            client: build(false),
            h1_client: build(true),
            timeout_ms,
            max_retries,
        }
    }

    /// GET a URL, failing on any non-2xx status.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    pub async fn get(&self, url: &str) -> Result<HttpResponse, AcquisitionError> {
        self.get_with_timeout(url, self.timeout_ms).await
    }

    /// Like [`get`](Self::get) with a per-request timeout.
    pub async fn get_with_timeout(
        &self,
        url: &str,
        timeout_ms: u64,
    ) -> Result<HttpResponse, AcquisitionError> {
        match self.get_inner(&self.client, url, timeout_ms).await {
            Err(AcquisitionError::Network { message, .. })
                if message.contains("http2")
                    || message.contains("protocol")
                    || message.contains("connection closed") =>
            {
                self.get_inner(&self.h1_client, url, timeout_ms).await
            }
            other => other,
        }
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        timeout_ms: u64,
    ) -> Result<HttpResponse, AcquisitionError> {
        let mut attempt = 0u32;

        loop {
            let sent = client
                .get(url)
                .timeout(Duration::from_millis(timeout_ms))
                .send()
                .await;
            let can_retry = attempt < self.max_retries;

            let r = match sent {
                Ok(r) => r,
                Err(e) if can_retry && !e.is_timeout() && (e.is_connect() || e.is_request()) => {
                    attempt += 1;
                    debug!(url, attempt, "request failed, retrying: {e}");
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                Err(e) => return Err(classify(url, timeout_ms, e)),
            };

            let status = r.status();
            if can_retry && (status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS) {
                attempt += 1;
                let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                    retry_after(&r).unwrap_or(Duration::from_secs(2))
                } else {
                    backoff(attempt)
                };
                debug!(url, attempt, status = status.as_u16(), "retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
            if !status.is_success() {
                return Err(AcquisitionError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let final_url = r.url().to_string();
            let body = r
                .bytes()
                .await
                .map_err(|e| classify(url, timeout_ms, e))?
                .to_vec();

            return Ok(HttpResponse { final_url, body });
        }
    }
}

/// 500ms, 1s, 2s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 << attempt.saturating_sub(1).min(6))
}

/// `Retry-After` in seconds, capped at 10s.
fn retry_after(r: &reqwest::Response) -> Option<Duration> {
    r.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(|s| Duration::from_secs(s.min(10)))
}

fn classify(url: &str, timeout_ms: u64, e: reqwest::Error) -> AcquisitionError {
    if e.is_timeout() {
        AcquisitionError::Timeout {
            url: url.to_string(),
            timeout_ms,
        }
    } else {
        AcquisitionError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "test-agent/1.0"))
            .and(header("accept-language", "en-US,en;q=0.9"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .mount(&server)
            .await;

        let client = HttpClient::new("test-agent/1.0", 5_000, 0);
        let resp = client
            .get(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.final_url, format!("{}/page", server.uri()));
        assert_eq!(resp.text(), "<p>ok</p>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT, 5_000, 0);
        let err = client
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT, 5_000, 1);
        let resp = client.get(&server.uri()).await.unwrap();
        assert_eq!(resp.text(), "recovered");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = HttpClient::new(DEFAULT_USER_AGENT, 2_000, 0);
        let err = client.get("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Network { .. }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(1_500)),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_USER_AGENT, 200, 0);
        let err = client.get(&server.uri()).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout { timeout_ms: 200, .. }));
    }
}
