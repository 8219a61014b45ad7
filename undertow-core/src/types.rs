use chrono::{DateTime, Utc};

/// External services the pipeline polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Reddit,
    Twitter,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Reddit => "reddit",
            Service::Twitter => "twitter",
        }
    }
}

/// Developer credentials for the Reddit application-only OAuth flow.
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

/// Developer credentials for the Twitter API. The pipeline only needs the
/// bearer token; the remaining keys are stored so operators can rotate the
/// whole set in one place.
#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub app_name: String,
    pub api_key: String,
    pub api_secret_key: String,
    pub bearer_token: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// A subreddit registered for polling. Scope entity for Reddit posts.
#[derive(Debug, Clone)]
pub struct Subreddit {
    pub name: String,
    pub description: Option<String>,
}

/// A Twitter trend location keyed by WOEID. Scope entity for trending
/// topics, created only by the region-discovery job.
#[derive(Debug, Clone)]
pub struct TwitterRegion {
    pub woeid: i64,
    pub name: Option<String>,
    pub location_type: Option<String>,
    pub parent_woeid: Option<i64>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

/// A normalized Reddit post. Natural key: the Reddit post id. Every field
/// other than the key is independently nullable so one malformed field never
/// costs the record.
#[derive(Debug, Clone)]
pub struct RedditPost {
    pub id: String,
    pub subreddit: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub upvote_ratio: Option<f64>,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
    pub created_on: Option<DateTime<Utc>>,
    pub stickied: Option<bool>,
    pub over_18: Option<bool>,
    pub spoiler: Option<bool>,
    pub permalink: Option<String>,
    pub author: Option<String>,
    pub author_is_gold: Option<bool>,
    pub author_mod: Option<bool>,
    pub author_has_verified_email: Option<bool>,
    pub author_created: Option<DateTime<Utc>>,
    pub comment_karma: Option<i64>,
}

/// A normalized trending topic. Trending topics have no stable external id,
/// so the natural key is the composite (name, woeid, retrieved_at).
#[derive(Debug, Clone)]
pub struct TrendingTopic {
    pub name: String,
    pub woeid: i64,
    pub retrieved_at: DateTime<Utc>,
    pub url: Option<String>,
    pub promoted_content: Option<bool>,
    pub topic_query: Option<String>,
    pub tweet_volume: Option<i64>,
}

/// Result of normalizing one page of raw API items. Every input item either
/// becomes a record or, when its natural key is absent, increments
/// `missing_key`; nothing disappears silently.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome<T> {
    pub records: Vec<T>,
    pub missing_key: usize,
}

impl<T> ExtractionOutcome<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            missing_key: 0,
        }
    }
}

impl<T> Default for ExtractionOutcome<T> {
    fn default() -> Self {
        Self::new()
    }
}
