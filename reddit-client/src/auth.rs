use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, TokenResponse, TokenUrl};
use tracing::{debug, info};
use undertow_core::{CoreError, RedditApiError, RedditCredentials};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Application-only OAuth2 for the Reddit API.
///
/// Uses the client-credentials grant, which yields a read-only token tied to
/// the developer application rather than a user account. Constructed fresh
/// for each job run so no token state survives between scheduled ticks.
pub struct RedditAuthenticator {
    credentials: RedditCredentials,
}

impl RedditAuthenticator {
    pub fn new(credentials: RedditCredentials) -> Self {
        Self { credentials }
    }

    /// Exchange the developer credentials for a bearer token.
    ///
    /// An authentication failure here is fatal for the job run and is never
    /// retried; the caller surfaces it in the run report.
    pub async fn authenticate(&self) -> Result<String, CoreError> {
        let auth_url = AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: format!("invalid auth url: {}", e),
            })
        })?;
        let token_url = TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: format!("invalid token url: {}", e),
            })
        })?;

        let client = BasicClient::new(
            ClientId::new(self.credentials.client_id.clone()),
            Some(ClientSecret::new(self.credentials.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        debug!("Requesting application-only token from Reddit");
        let token = client
            .exchange_client_credentials()
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        info!("Authenticated with Reddit as {}", self.credentials.user_agent);
        Ok(token.access_token().secret().clone())
    }

    pub fn user_agent(&self) -> &str {
        &self.credentials.user_agent
    }
}
