//! The concrete ingestion jobs.
//!
//! Every run builds its API client from freshly read credentials and drops
//! it at the end, so no token or connection state survives between scheduled
//! ticks. Fetches go through the shared retry executor; an authentication
//! failure or exhausted retries fails the run, and the failure is reported
//! by the scheduler.

use crate::report::{JobPhase, JobStats, RunContext};
use crate::scheduler::Job;
use async_trait::async_trait;
use chrono::Utc;
use database::Database;
use reddit_client::{extract_posts, ListingSort, RedditApiClient, RedditAuthenticator};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};
use twitter_client::{
    regions_from_raw, topics_from_payload, TwitterApiClient, REGION_FETCH_DELAY,
};
use undertow_core::{CoreError, RetryConfig, RetryExecutor};

pub const REDDIT_POSTS_JOB: &str = "reddit-posts";
pub const TWITTER_REGIONS_JOB: &str = "twitter-regions";
pub const TWITTER_TRENDS_JOB: &str = "twitter-trends";

/// How many posts each listing pass collects per subreddit.
const POSTS_PER_LISTING: usize = 25;

/// Polls every registered subreddit for its top-of-day and hot listings and
/// upserts the normalized posts.
pub struct RedditPostsJob {
    db: Arc<Database>,
}

impl RedditPostsJob {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Job for RedditPostsJob {
    async fn run(&self, ctx: &mut RunContext) -> Result<JobStats, CoreError> {
        ctx.advance(JobPhase::Authenticating);
        let credentials = self.db.active_reddit_credentials().await?;
        let authenticator = RedditAuthenticator::new(credentials.clone());
        let access_token = authenticator.authenticate().await?;
        let client = RedditApiClient::new(credentials.user_agent.clone(), true);

        ctx.advance(JobPhase::Extracting);
        let subreddits = self.db.list_subreddits().await?;
        if subreddits.is_empty() {
            warn!("No subreddits registered, nothing to ingest");
            return Ok(JobStats::default());
        }

        let retry = RetryExecutor::new(RetryConfig::social_api());
        let mut batch = Vec::new();
        let mut missing_key = 0u64;

        for subreddit in &subreddits {
            for sort in [ListingSort::Top, ListingSort::Hot] {
                let raw_items = retry
                    .execute("reddit.fetch_subreddit_posts", || {
                        client.fetch_subreddit_posts(
                            &access_token,
                            &subreddit.name,
                            sort,
                            POSTS_PER_LISTING,
                        )
                    })
                    .await?;

                let outcome =
                    extract_posts(&client, &access_token, &subreddit.name, &raw_items).await;
                missing_key += outcome.missing_key as u64;
                batch.extend(outcome.records);
            }
        }

        ctx.advance(JobPhase::Writing);
        let report = self.db.upsert_reddit_posts(&batch).await?;

        let metrics = client.get_metrics().await;
        info!(
            "Reddit run issued {} API requests ({} rate-limit waits)",
            metrics.total_requests, metrics.rate_limited_requests
        );

        Ok(JobStats {
            written: report.written,
            dropped: report.dropped + missing_key,
        })
    }
}

/// Discovers the trend locations the Twitter API can report on and upserts
/// them as regions. The only job allowed to create scope entities.
pub struct TwitterRegionsJob {
    db: Arc<Database>,
}

impl TwitterRegionsJob {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Job for TwitterRegionsJob {
    async fn run(&self, ctx: &mut RunContext) -> Result<JobStats, CoreError> {
        ctx.advance(JobPhase::Authenticating);
        let credentials = self.db.active_twitter_credentials().await?;
        let client = TwitterApiClient::new(&credentials);

        ctx.advance(JobPhase::Extracting);
        let retry = RetryExecutor::new(RetryConfig::social_api());
        let locations = retry
            .execute("twitter.trends_available", || client.trends_available())
            .await?;
        let outcome = regions_from_raw(&locations);

        ctx.advance(JobPhase::Writing);
        let report = self.db.upsert_regions(&outcome.records).await?;

        Ok(JobStats {
            written: report.written,
            dropped: report.dropped + outcome.missing_key as u64,
        })
    }
}

/// Polls the trending topics of every discovered region and upserts them by
/// composite natural key.
pub struct TwitterTrendsJob {
    db: Arc<Database>,
}

impl TwitterTrendsJob {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Job for TwitterTrendsJob {
    async fn run(&self, ctx: &mut RunContext) -> Result<JobStats, CoreError> {
        ctx.advance(JobPhase::Authenticating);
        let credentials = self.db.active_twitter_credentials().await?;
        let client = TwitterApiClient::new(&credentials);

        ctx.advance(JobPhase::Extracting);
        let regions = self.db.list_regions().await?;
        if regions.is_empty() {
            warn!("No regions discovered yet; run {} first", TWITTER_REGIONS_JOB);
            return Ok(JobStats::default());
        }

        let retry = RetryExecutor::new(RetryConfig::social_api());
        let mut batch = Vec::new();
        let mut missing_key = 0u64;

        for (index, region) in regions.iter().enumerate() {
            if index > 0 {
                sleep(REGION_FETCH_DELAY).await;
            }

            let payload = retry
                .execute("twitter.trends_for", || client.trends_for(region.woeid))
                .await?;

            let outcome = topics_from_payload(&payload, region.woeid, Utc::now());
            missing_key += outcome.missing_key as u64;
            batch.extend(outcome.records);
        }

        ctx.advance(JobPhase::Writing);
        let report = self.db.upsert_trending_topics(&batch).await?;

        Ok(JobStats {
            written: report.written,
            dropped: report.dropped + missing_key,
        })
    }
}
