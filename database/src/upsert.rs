//! Natural-key upsert writers.
//!
//! Each record is applied as a single `INSERT ... ON CONFLICT DO UPDATE`
//! statement, in input order, so re-ingesting a key overwrites its mutable
//! fields and "last write wins" reflects the most recent poll. Records that
//! reference an unknown scope entity are dropped and accounted for in the
//! returned report; only the discovery writer may create scope entities.

use crate::Database;
use sqlx::Row;
use std::collections::HashSet;
use tracing::{info, warn};
use undertow_core::{CoreError, DatabaseError, RedditPost, TrendingTopic, TwitterRegion};

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub written: u64,
    pub dropped: u64,
    pub dropped_keys: Vec<String>,
}

impl UpsertReport {
    fn drop_record(&mut self, key: String) {
        self.dropped += 1;
        self.dropped_keys.push(key);
    }
}

impl Database {
    /// Upsert a batch of Reddit posts by post id. Posts whose subreddit has
    /// not been registered are dropped and reported.
    pub async fn upsert_reddit_posts(
        &self,
        posts: &[RedditPost],
    ) -> Result<UpsertReport, CoreError> {
        let known = self.known_subreddits().await?;
        let mut report = UpsertReport::default();

        for post in posts {
            if !known.contains(&post.subreddit) {
                report.drop_record(format!("{} (r/{})", post.id, post.subreddit));
                continue;
            }

            sqlx::query(
                r#"INSERT INTO reddit_posts
                   (id, subreddit, title, content, upvote_ratio, score, num_comments,
                    created_on, stickied, over_18, spoiler, permalink, author,
                    author_is_gold, author_mod, author_has_verified_email,
                    author_created, comment_karma)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                   ON CONFLICT(id) DO UPDATE SET
                     subreddit = excluded.subreddit,
                     title = excluded.title,
                     content = excluded.content,
                     upvote_ratio = excluded.upvote_ratio,
                     score = excluded.score,
                     num_comments = excluded.num_comments,
                     created_on = excluded.created_on,
                     stickied = excluded.stickied,
                     over_18 = excluded.over_18,
                     spoiler = excluded.spoiler,
                     permalink = excluded.permalink,
                     author = excluded.author,
                     author_is_gold = excluded.author_is_gold,
                     author_mod = excluded.author_mod,
                     author_has_verified_email = excluded.author_has_verified_email,
                     author_created = excluded.author_created,
                     comment_karma = excluded.comment_karma"#,
            )
            .bind(post.id.as_str())
            .bind(post.subreddit.as_str())
            .bind(post.title.as_deref())
            .bind(post.content.as_deref())
            .bind(post.upvote_ratio)
            .bind(post.score)
            .bind(post.num_comments)
            .bind(post.created_on)
            .bind(post.stickied)
            .bind(post.over_18)
            .bind(post.spoiler)
            .bind(post.permalink.as_deref())
            .bind(post.author.as_deref())
            .bind(post.author_is_gold)
            .bind(post.author_mod)
            .bind(post.author_has_verified_email)
            .bind(post.author_created)
            .bind(post.comment_karma)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

            report.written += 1;
        }

        self.log_report("reddit posts", &report);
        Ok(report)
    }

    /// Upsert a batch of trending topics by (name, woeid, retrieved_at).
    /// Topics referencing an undiscovered region are dropped and reported.
    pub async fn upsert_trending_topics(
        &self,
        topics: &[TrendingTopic],
    ) -> Result<UpsertReport, CoreError> {
        let known = self.known_woeids().await?;
        let mut report = UpsertReport::default();

        for topic in topics {
            if !known.contains(&topic.woeid) {
                report.drop_record(format!("{} (WOEID {})", topic.name, topic.woeid));
                continue;
            }

            sqlx::query(
                r#"INSERT INTO trending_topics
                   (name, woeid, retrieved_at, url, promoted_content, topic_query, tweet_volume)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                   ON CONFLICT(name, woeid, retrieved_at) DO UPDATE SET
                     url = excluded.url,
                     promoted_content = excluded.promoted_content,
                     topic_query = excluded.topic_query,
                     tweet_volume = excluded.tweet_volume"#,
            )
            .bind(topic.name.as_str())
            .bind(topic.woeid)
            .bind(topic.retrieved_at)
            .bind(topic.url.as_deref())
            .bind(topic.promoted_content)
            .bind(topic.topic_query.as_deref())
            .bind(topic.tweet_volume)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

            report.written += 1;
        }

        self.log_report("trending topics", &report);
        Ok(report)
    }

    /// Upsert discovered regions by WOEID. This is the discovery job's
    /// writer and the only path that creates scope entities.
    pub async fn upsert_regions(
        &self,
        regions: &[TwitterRegion],
    ) -> Result<UpsertReport, CoreError> {
        let mut report = UpsertReport::default();

        for region in regions {
            sqlx::query(
                r#"INSERT INTO twitter_regions
                   (woeid, name, location_type, parent_woeid, country, country_code)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(woeid) DO UPDATE SET
                     name = excluded.name,
                     location_type = excluded.location_type,
                     parent_woeid = excluded.parent_woeid,
                     country = excluded.country,
                     country_code = excluded.country_code"#,
            )
            .bind(region.woeid)
            .bind(region.name.as_deref())
            .bind(region.location_type.as_deref())
            .bind(region.parent_woeid)
            .bind(region.country.as_deref())
            .bind(region.country_code.as_deref())
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

            report.written += 1;
        }

        self.log_report("regions", &report);
        Ok(report)
    }

    async fn known_subreddits(&self) -> Result<HashSet<String>, CoreError> {
        let rows = sqlx::query("SELECT name FROM subreddits")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

        let mut known = HashSet::with_capacity(rows.len());
        for row in rows {
            known.insert(row.try_get("name").map_err(DatabaseError::Sql)?);
        }
        Ok(known)
    }

    async fn known_woeids(&self) -> Result<HashSet<i64>, CoreError> {
        let rows = sqlx::query("SELECT woeid FROM twitter_regions")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Sql)?;

        let mut known = HashSet::with_capacity(rows.len());
        for row in rows {
            known.insert(row.try_get("woeid").map_err(DatabaseError::Sql)?);
        }
        Ok(known)
    }

    fn log_report(&self, entity: &str, report: &UpsertReport) {
        if report.dropped > 0 {
            warn!(
                "Upserted {} {}, dropped {} referencing unknown scopes: {:?}",
                report.written, entity, report.dropped, report.dropped_keys
            );
        } else {
            info!("Upserted {} {}", report.written, entity);
        }
    }
}
