use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use undertow_core::{CoreError, TwitterApiError, TwitterCredentials};
use url::Url;

const TWITTER_API_BASE: &str = "https://api.twitter.com/1.1";

/// Fallback wait when a 429 arrives without a usable reset header.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Fixed pause between per-region trend fetches.
pub const REGION_FETCH_DELAY: Duration = Duration::from_secs(1);

/// Bearer-token client for the Twitter trends API, constructed once per job
/// run.
///
/// Twitter reports its limits through `x-rate-limit-*` headers; on a 429 the
/// client sleeps until the advertised reset and replays the same request, so
/// callers never observe a rate-limit condition.
#[derive(Debug)]
pub struct TwitterApiClient {
    http_client: Client,
    bearer_token: String,
    base_url: String,
}

impl TwitterApiClient {
    pub fn new(credentials: &TwitterCredentials) -> Self {
        Self::with_base_url(credentials, TWITTER_API_BASE.to_string())
    }

    pub fn with_base_url(credentials: &TwitterCredentials, base_url: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            bearer_token: credentials.bearer_token.clone(),
            base_url,
        }
    }

    async fn get_value(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        woeid: Option<i64>,
    ) -> Result<Value, CoreError> {
        let url = Url::parse(&format!("{}/{}", self.base_url, endpoint)).map_err(|e| {
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("invalid request url: {}", e),
            })
        })?;

        loop {
            debug!("Making Twitter API request: GET {}", endpoint);
            let response = match self
                .http_client
                .get(url.clone())
                .bearer_auth(&self.bearer_token)
                .query(params)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    error!("Network error for GET {}: {}", endpoint, e);
                    if e.is_timeout() {
                        return Err(CoreError::TwitterApi(TwitterApiError::RequestTimeout));
                    }
                    return Err(CoreError::Network(e));
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                // Wait out the advertised window, then replay the request
                let wait = reset_wait(response.headers());
                warn!(
                    "Rate limited on GET {}, waiting {:?} before replaying",
                    endpoint, wait
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_success() {
                debug!("Request successful: {} {}", status, endpoint);
                return self.parse_json(response, endpoint).await;
            }

            error!("Request failed with status: {} for {}", status, endpoint);

            return Err(match status.as_u16() {
                401 | 403 => CoreError::TwitterApi(TwitterApiError::AuthenticationFailed {
                    reason: format!("status {} from {}", status.as_u16(), endpoint),
                }),
                404 => match woeid {
                    Some(woeid) => {
                        CoreError::TwitterApi(TwitterApiError::RegionNotFound { woeid })
                    }
                    None => CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                        details: format!("Resource not found: {}", endpoint),
                    }),
                },
                code if status.is_server_error() => {
                    CoreError::TwitterApi(TwitterApiError::ServerError { status_code: code })
                }
                code => CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                    details: format!("Unexpected status {}", code),
                }),
            });
        }
    }

    async fn parse_json(&self, response: Response, endpoint: &str) -> Result<Value, CoreError> {
        response.json().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            })
        })
    }

    /// All trend locations the API can report on. Feed for the
    /// region-discovery job.
    pub async fn trends_available(&self) -> Result<Vec<Value>, CoreError> {
        let value = self.get_value("trends/available.json", &[], None).await?;

        match value {
            Value::Array(locations) => {
                info!("Retrieved {} trend locations", locations.len());
                Ok(locations)
            }
            other => Err(CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!(
                    "Expected array from trends/available, got {}",
                    if other.is_object() { "object" } else { "non-array" }
                ),
            })),
        }
    }

    /// The trends payload for one region. The API wraps it in a one-element
    /// array.
    pub async fn trends_for(&self, woeid: i64) -> Result<Value, CoreError> {
        let params = [("id", woeid.to_string())];
        let value = self
            .get_value("trends/place.json", &params, Some(woeid))
            .await?;

        match value {
            Value::Array(mut payloads) if !payloads.is_empty() => {
                debug!("Retrieved trends payload for WOEID {}", woeid);
                Ok(payloads.remove(0))
            }
            _ => Err(CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Empty trends payload for WOEID {}", woeid),
            })),
        }
    }
}

/// How long a 429 asks us to wait: `x-rate-limit-reset` carries an epoch
/// timestamp for the end of the current window.
fn reset_wait(headers: &HeaderMap) -> Duration {
    if let Some(value) = headers.get("x-rate-limit-reset") {
        if let Ok(reset_epoch) = value.to_str().unwrap_or_default().parse::<i64>() {
            let now = Utc::now().timestamp();
            if reset_epoch > now {
                return Duration::from_secs((reset_epoch - now) as u64);
            }
            return Duration::from_secs(1);
        }
    }
    DEFAULT_RATE_LIMIT_WAIT
}
