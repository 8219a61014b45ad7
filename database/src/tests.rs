use crate::Database;
use chrono::{TimeZone, Utc};
use sqlx::Row;
use std::env;
use undertow_core::{CoreError, RedditPost, TrendingTopic, TwitterRegion};

async fn setup_test_db() -> Database {
    let db_path = env::temp_dir().join(format!("undertow_test_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    db
}

fn sample_post(id: &str, subreddit: &str, score: i64) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        subreddit: subreddit.to_string(),
        title: Some(format!("Post {}", id)),
        content: Some("Body".to_string()),
        upvote_ratio: Some(0.9),
        score: Some(score),
        num_comments: Some(3),
        created_on: Some(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()),
        stickied: Some(false),
        over_18: Some(false),
        spoiler: None,
        permalink: Some(format!("/r/{}/comments/{}", subreddit, id)),
        author: Some("ferris".to_string()),
        author_is_gold: None,
        author_mod: None,
        author_has_verified_email: None,
        author_created: None,
        comment_karma: None,
    }
}

fn sample_topic(name: &str, woeid: i64, volume: Option<i64>) -> TrendingTopic {
    TrendingTopic {
        name: name.to_string(),
        woeid,
        retrieved_at: Utc.with_ymd_and_hms(2022, 1, 1, 12, 0, 0).unwrap(),
        url: Some(format!("http://twitter.com/search?q={}", name)),
        promoted_content: None,
        topic_query: Some(name.to_string()),
        tweet_volume: volume,
    }
}

fn sample_region(woeid: i64, name: &str) -> TwitterRegion {
    TwitterRegion {
        woeid,
        name: Some(name.to_string()),
        location_type: Some("Town".to_string()),
        parent_woeid: Some(23424775),
        country: Some("Canada".to_string()),
        country_code: Some("CA".to_string()),
    }
}

async fn count(db: &Database, table: &str) -> i64 {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(db.pool())
        .await
        .expect("count query failed");
    row.try_get("n").expect("count column missing")
}

#[tokio::test]
async fn test_connection_and_migrations() {
    let db = setup_test_db().await;
    assert_eq!(count(&db, "reddit_posts").await, 0);
    assert_eq!(count(&db, "trending_topics").await, 0);
}

#[tokio::test]
async fn test_missing_credentials_is_not_found() {
    let db = setup_test_db().await;

    let reddit = db.active_reddit_credentials().await;
    assert!(matches!(reddit, Err(CoreError::NotFound { .. })));

    let twitter = db.active_twitter_credentials().await;
    assert!(matches!(twitter, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_credentials_roundtrip() {
    let db = setup_test_db().await;

    sqlx::query(
        "INSERT INTO reddit_developer_accounts (client_id, client_secret, user_agent) \
         VALUES ('cid', 'secret', 'undertow-test/0.1')",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let creds = db.active_reddit_credentials().await.unwrap();
    assert_eq!(creds.client_id, "cid");
    assert_eq!(creds.user_agent, "undertow-test/0.1");
}

#[tokio::test]
async fn test_subreddit_seed_and_listing() {
    let db = setup_test_db().await;

    db.add_subreddit("rust", Some("The Rust programming language"))
        .await
        .unwrap();
    db.add_subreddit("rust", Some("Updated description"))
        .await
        .unwrap();

    let subreddits = db.list_subreddits().await.unwrap();
    assert_eq!(subreddits.len(), 1);
    assert_eq!(subreddits[0].name, "rust");
    assert_eq!(
        subreddits[0].description.as_deref(),
        Some("Updated description")
    );
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let db = setup_test_db().await;
    db.add_subreddit("rust", None).await.unwrap();

    let batch = vec![sample_post("abc123", "rust", 10), sample_post("def456", "rust", 7)];

    let first = db.upsert_reddit_posts(&batch).await.unwrap();
    let second = db.upsert_reddit_posts(&batch).await.unwrap();

    assert_eq!(first.written, 2);
    assert_eq!(second.written, 2);
    assert_eq!(count(&db, "reddit_posts").await, 2);

    let row = sqlx::query("SELECT score, title FROM reddit_posts WHERE id = 'abc123'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(row.try_get::<i64, _>("score").unwrap(), 10);
    assert_eq!(row.try_get::<String, _>("title").unwrap(), "Post abc123");
}

#[tokio::test]
async fn test_reingestion_overwrites_mutable_fields() {
    // The two-page scenario: abc123 appears in both pages with different
    // scores; the second write must win with a single stored row.
    let db = setup_test_db().await;
    db.add_subreddit("rust", None).await.unwrap();

    let page_one = vec![sample_post("abc123", "rust", 10)];
    db.upsert_reddit_posts(&page_one).await.unwrap();

    let page_two = vec![sample_post("abc123", "rust", 15)];
    db.upsert_reddit_posts(&page_two).await.unwrap();

    assert_eq!(count(&db, "reddit_posts").await, 1);
    let row = sqlx::query("SELECT score FROM reddit_posts WHERE id = 'abc123'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(row.try_get::<i64, _>("score").unwrap(), 15);
}

#[tokio::test]
async fn test_duplicate_key_within_batch_last_write_wins() {
    let db = setup_test_db().await;
    db.add_subreddit("rust", None).await.unwrap();

    let batch = vec![
        sample_post("abc123", "rust", 10),
        sample_post("abc123", "rust", 15),
    ];
    db.upsert_reddit_posts(&batch).await.unwrap();

    assert_eq!(count(&db, "reddit_posts").await, 1);
    let row = sqlx::query("SELECT score FROM reddit_posts WHERE id = 'abc123'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(row.try_get::<i64, _>("score").unwrap(), 15);
}

#[tokio::test]
async fn test_unknown_subreddit_is_dropped_and_reported() {
    let db = setup_test_db().await;
    db.add_subreddit("rust", None).await.unwrap();

    let batch = vec![
        sample_post("abc123", "rust", 10),
        sample_post("zzz999", "notregistered", 1),
    ];
    let report = db.upsert_reddit_posts(&batch).await.unwrap();

    assert_eq!(report.written, 1);
    assert_eq!(report.dropped, 1);
    assert!(report.dropped_keys[0].contains("zzz999"));
    assert_eq!(count(&db, "reddit_posts").await, 1);
    // The writer must not invent the missing scope entity
    assert_eq!(count(&db, "subreddits").await, 1);
}

#[tokio::test]
async fn test_undiscovered_region_drops_topics() {
    // Topics for WOEID 2459115 arrive before any region discovery: zero
    // rows written, one reported drop, no region row created.
    let db = setup_test_db().await;

    let batch = vec![sample_topic("Chelsea", 2459115, Some(798388))];
    let report = db.upsert_trending_topics(&batch).await.unwrap();

    assert_eq!(report.written, 0);
    assert_eq!(report.dropped, 1);
    assert!(report.dropped_keys[0].contains("2459115"));
    assert_eq!(count(&db, "trending_topics").await, 0);
    assert_eq!(count(&db, "twitter_regions").await, 0);
}

#[tokio::test]
async fn test_topics_upsert_after_discovery() {
    let db = setup_test_db().await;

    db.upsert_regions(&[sample_region(2459115, "New York")])
        .await
        .unwrap();

    let batch = vec![
        sample_topic("Chelsea", 2459115, Some(798388)),
        sample_topic("#rustlang", 2459115, None),
    ];
    let report = db.upsert_trending_topics(&batch).await.unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.dropped, 0);

    // A retried poll within the same tick collapses onto the same keys
    let retried = db.upsert_trending_topics(&batch).await.unwrap();
    assert_eq!(retried.written, 2);
    assert_eq!(count(&db, "trending_topics").await, 2);
}

#[tokio::test]
async fn test_topic_reingestion_updates_volume() {
    let db = setup_test_db().await;
    db.upsert_regions(&[sample_region(2459115, "New York")])
        .await
        .unwrap();

    db.upsert_trending_topics(&[sample_topic("Chelsea", 2459115, Some(100))])
        .await
        .unwrap();
    db.upsert_trending_topics(&[sample_topic("Chelsea", 2459115, Some(250))])
        .await
        .unwrap();

    assert_eq!(count(&db, "trending_topics").await, 1);
    let row = sqlx::query("SELECT tweet_volume FROM trending_topics WHERE name = 'Chelsea'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(row.try_get::<i64, _>("tweet_volume").unwrap(), 250);
}

#[tokio::test]
async fn test_region_discovery_upserts() {
    let db = setup_test_db().await;

    db.upsert_regions(&[sample_region(3369, "Ottawa")])
        .await
        .unwrap();

    let mut renamed = sample_region(3369, "Ottawa-Gatineau");
    renamed.country_code = None;
    db.upsert_regions(&[renamed]).await.unwrap();

    let regions = db.list_regions().await.unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].name.as_deref(), Some("Ottawa-Gatineau"));
    assert_eq!(regions[0].country_code, None);
}
