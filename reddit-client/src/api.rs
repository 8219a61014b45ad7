use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use undertow_core::{CoreError, RedditApiError};
use url::Url;

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Fallback wait when a 429 arrives without usable reset metadata.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub modhash: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// Which listing of a subreddit to poll. Mirrors the two passes the
/// ingestion job makes over every subreddit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSort {
    /// Top posts of the last day.
    Top,
    /// Currently hot posts.
    Hot,
}

impl ListingSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSort::Top => "top",
            ListingSort::Hot => "hot",
        }
    }

    fn time_window(&self) -> Option<&'static str> {
        match self {
            ListingSort::Top => Some("day"),
            ListingSort::Hot => None,
        }
    }
}

/// Read-only client for the Reddit data API, constructed once per job run.
///
/// Every request passes the proactive token-bucket limiter; a 429 from the
/// API is waited out using the response's reset metadata and the request is
/// replayed, so callers never observe a rate-limit condition.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    user_agent: String,
    base_url: String,
    read_only: bool,
}

impl RedditApiClient {
    pub fn new(user_agent: String, read_only: bool) -> Self {
        Self::with_base_url(user_agent, read_only, REDDIT_API_BASE.to_string())
    }

    pub fn with_base_url(user_agent: String, read_only: bool, base_url: String) -> Self {
        let rate_config = RateLimitConfig::reddit_oauth();
        let rate_limiter = Arc::new(RateLimiter::new(rate_config));
        let metrics = Arc::new(MetricsCollector::new());

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            rate_limiter,
            metrics,
            user_agent,
            base_url,
            read_only,
        }
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        if self.read_only && method != Method::GET {
            return Err(CoreError::RedditApi(RedditApiError::ReadOnlyViolation {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
            }));
        }

        let url = Url::parse(&format!("{}{}", self.base_url, endpoint)).map_err(|e| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("invalid request url: {}", e),
            })
        })?;

        loop {
            let start_time = Instant::now();

            // Acquire rate limit permit
            let _permit = self.rate_limiter.acquire_permit().await;
            debug!("Acquired rate limit permit for {} {}", method, endpoint);

            let mut request_builder = self
                .http_client
                .request(method.clone(), url.clone())
                .bearer_auth(access_token)
                .header("User-Agent", &self.user_agent);

            if let Some(params) = query_params {
                request_builder = request_builder.query(params);
            }

            debug!("Making Reddit API request: {} {}", method, endpoint);
            let response = match request_builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    error!("Network error for {} {}: {}", method, endpoint, e);
                    self.record(endpoint, &method, None, start_time, false, false)
                        .await;

                    if e.is_timeout() {
                        return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                    }
                    return Err(CoreError::Network(e));
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                // Not an error from the caller's point of view: wait out the
                // window the API reports, then replay the same request.
                let wait = rate_limit_reset(response.headers());
                warn!(
                    "Rate limited on {} {}, waiting {:?} before replaying",
                    method, endpoint, wait
                );
                self.record(endpoint, &method, Some(429), start_time, false, true)
                    .await;
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_success() {
                debug!("Request successful: {} {}", status, endpoint);
                self.record(endpoint, &method, Some(status.as_u16()), start_time, true, false)
                    .await;
                return Ok(response);
            }

            error!("Request failed with status: {} for {}", status, endpoint);
            self.record(endpoint, &method, Some(status.as_u16()), start_time, false, false)
                .await;

            return Err(match status.as_u16() {
                401 => CoreError::RedditApi(RedditApiError::InvalidToken),
                403 => CoreError::RedditApi(RedditApiError::Forbidden {
                    resource: endpoint.to_string(),
                }),
                404 => match endpoint.strip_prefix("/r/").and_then(|r| r.split('/').next()) {
                    Some(name) => CoreError::RedditApi(RedditApiError::SubredditNotFound {
                        subreddit: name.to_string(),
                    }),
                    None => CoreError::RedditApi(RedditApiError::InvalidResponse {
                        details: "Resource not found".to_string(),
                    }),
                },
                code if status.is_server_error() => {
                    CoreError::RedditApi(RedditApiError::ServerError { status_code: code })
                }
                code => CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("Unexpected status {}", code),
                }),
            });
        }
    }

    async fn record(
        &self,
        endpoint: &str,
        method: &Method,
        status_code: Option<u16>,
        start_time: Instant,
        success: bool,
        rate_limited: bool,
    ) {
        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success,
                rate_limited,
            })
            .await;
    }

    /// One page of a subreddit listing. Children stay raw so the extractor
    /// can apply field-level tolerance.
    pub async fn get_subreddit_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        sort: ListingSort,
        limit: Option<u32>,
        after: Option<&str>,
    ) -> Result<RedditListing<Value>, CoreError> {
        let endpoint = format!("/r/{}/{}", subreddit, sort.as_str());
        let mut params = Vec::with_capacity(4);
        let limit_str = limit.map(|l| l.to_string());

        if let Some(window) = sort.time_window() {
            params.push(("t", window));
        }
        if let Some(ref limit_s) = limit_str {
            params.push(("limit", limit_s.as_str()));
        }
        if let Some(after_val) = after {
            params.push(("after", after_val));
        }
        params.push(("raw_json", "1"));

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(params.as_slice()))
            .await?;

        let listing: RedditListing<Value> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        info!(
            "Retrieved {} posts from r/{} ({})",
            listing.data.children.len(),
            subreddit,
            sort.as_str()
        );
        Ok(listing)
    }

    /// Follow the `after` cursor until `limit` raw items are collected or
    /// the listing runs out.
    pub async fn fetch_subreddit_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        sort: ListingSort,
        limit: usize,
    ) -> Result<Vec<Value>, CoreError> {
        let mut items: Vec<Value> = Vec::with_capacity(limit);
        let mut after: Option<String> = None;

        while items.len() < limit {
            let page_size = (limit - items.len()).min(100) as u32;
            let listing = self
                .get_subreddit_posts(
                    access_token,
                    subreddit,
                    sort,
                    Some(page_size),
                    after.as_deref(),
                )
                .await?;

            if listing.data.children.is_empty() {
                break;
            }

            for child in listing.data.children {
                items.push(child.data);
            }

            after = listing.data.after;
            if after.is_none() {
                break;
            }
        }

        items.truncate(limit);
        Ok(items)
    }

    /// Author profile lookup for best-effort post enrichment.
    pub async fn get_user_about(
        &self,
        access_token: &str,
        username: &str,
    ) -> Result<Value, CoreError> {
        let endpoint = format!("/user/{}/about", username);

        let response = self
            .make_request(Method::GET, &endpoint, access_token, None)
            .await?;

        let envelope: RedditListingChild<Value> = response.json().await.map_err(|e| {
            error!("Failed to parse user info: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse info for u/{}", username),
            })
        })?;

        debug!("Retrieved info for u/{}", username);
        Ok(envelope.data)
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

/// How long a 429 response asks us to wait: `Retry-After` first, then
/// Reddit's `x-ratelimit-reset`, then a conservative default.
fn rate_limit_reset(headers: &HeaderMap) -> Duration {
    for header in ["retry-after", "x-ratelimit-reset"] {
        if let Some(value) = headers.get(header) {
            if let Ok(seconds) = value.to_str().unwrap_or_default().parse::<u64>() {
                return Duration::from_secs(seconds);
            }
        }
    }
    DEFAULT_RATE_LIMIT_WAIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve each canned HTTP response to one connection, in order.
    async fn spawn_mock_server(responses: Vec<String>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };

                // Drain the request head before replying
                let mut buf = [0u8; 4096];
                let mut head = Vec::new();
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            head.extend_from_slice(&buf[..n]);
                            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        addr
    }

    fn http_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut response = format!("HTTP/1.1 {}\r\n", status_line);
        for (name, value) in headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        response
    }

    fn listing_body(ids_and_scores: &[(&str, i64)], after: Option<&str>) -> String {
        let children: Vec<String> = ids_and_scores
            .iter()
            .map(|(id, score)| {
                format!(
                    r#"{{"kind":"t3","data":{{"id":"{}","score":{}}}}}"#,
                    id, score
                )
            })
            .collect();
        let after = match after {
            Some(a) => format!(r#""{}""#, a),
            None => "null".to_string(),
        };
        format!(
            r#"{{"kind":"Listing","data":{{"children":[{}],"after":{},"before":null,"modhash":null,"dist":{}}}}}"#,
            children.join(","),
            after,
            ids_and_scores.len()
        )
    }

    fn test_client(addr: std::net::SocketAddr) -> RedditApiClient {
        RedditApiClient::with_base_url(
            "undertow-test/0.1".to_string(),
            true,
            format!("http://{}", addr),
        )
    }

    #[tokio::test]
    async fn test_rate_limit_wait_blocks_then_returns_data() {
        let responses = vec![
            http_response(
                "429 Too Many Requests",
                &[("Retry-After", "2")],
                "",
            ),
            http_response(
                "200 OK",
                &[("Content-Type", "application/json")],
                &listing_body(&[("abc123", 10)], None),
            ),
        ];
        let addr = spawn_mock_server(responses).await;
        let client = test_client(addr);

        let start = Instant::now();
        let listing = client
            .get_subreddit_posts("token", "rust", ListingSort::Hot, Some(25), None)
            .await
            .unwrap();

        // The call must not return before the reported reset window elapses,
        // and must deliver the originally requested data afterward.
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(listing.data.children.len(), 1);
        assert_eq!(
            listing.data.children[0].data.get("id").unwrap(),
            &serde_json::json!("abc123")
        );

        let metrics = client.get_metrics().await;
        assert_eq!(metrics.rate_limited_requests, 1);
        assert_eq!(metrics.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_pagination_follows_after_cursor() {
        let responses = vec![
            http_response(
                "200 OK",
                &[("Content-Type", "application/json")],
                &listing_body(&[("abc123", 10), ("def456", 3)], Some("t3_def456")),
            ),
            http_response(
                "200 OK",
                &[("Content-Type", "application/json")],
                &listing_body(&[("ghi789", 7)], None),
            ),
        ];
        let addr = spawn_mock_server(responses).await;
        let client = test_client(addr);

        let items = client
            .fetch_subreddit_posts("token", "rust", ListingSort::Top, 3)
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].get("id").unwrap(), &serde_json::json!("abc123"));
        assert_eq!(items[2].get("id").unwrap(), &serde_json::json!("ghi789"));
    }

    #[tokio::test]
    async fn test_invalid_token_is_fatal() {
        let responses = vec![http_response("401 Unauthorized", &[], "")];
        let addr = spawn_mock_server(responses).await;
        let client = test_client(addr);

        let result = client
            .get_subreddit_posts("bad-token", "rust", ListingSort::Hot, Some(25), None)
            .await;

        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::InvalidToken))
        ));
    }

    #[tokio::test]
    async fn test_read_only_client_rejects_writes() {
        let client = RedditApiClient::new("undertow-test/0.1".to_string(), true);

        let result = client
            .make_request(Method::POST, "/api/submit", "token", None)
            .await;

        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::ReadOnlyViolation { .. }))
        ));
    }

    #[test]
    fn test_rate_limit_reset_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "2".parse().unwrap());
        assert_eq!(rate_limit_reset(&headers), Duration::from_secs(2));

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", "30".parse().unwrap());
        assert_eq!(rate_limit_reset(&headers), Duration::from_secs(30));

        let headers = HeaderMap::new();
        assert_eq!(rate_limit_reset(&headers), DEFAULT_RATE_LIMIT_WAIT);
    }
}
