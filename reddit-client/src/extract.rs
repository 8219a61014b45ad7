//! Normalization of raw Reddit listing items.
//!
//! Extraction is tolerant at the field level: any missing or mistyped field
//! becomes `None`, and only an item with no post id at all fails to produce a
//! record (the skip is counted, never silent).

use crate::api::RedditApiClient;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use undertow_core::fields::{opt_bool, opt_epoch, opt_f64, opt_i64, opt_str};
use undertow_core::{ExtractionOutcome, RedditPost};

/// Fixed pause between per-post author lookups so enrichment alone cannot
/// trip the API's limits.
const AUTHOR_LOOKUP_DELAY: Duration = Duration::from_millis(500);

/// Normalize one raw listing child. Returns `None` only when the natural key
/// is absent.
pub fn post_from_raw(item: &Value, subreddit: &str) -> Option<RedditPost> {
    let id = opt_str(item, "id")?;

    Some(RedditPost {
        id,
        subreddit: subreddit.to_string(),
        title: opt_str(item, "title"),
        content: opt_str(item, "selftext"),
        upvote_ratio: opt_f64(item, "upvote_ratio"),
        score: opt_i64(item, "score"),
        num_comments: opt_i64(item, "num_comments"),
        created_on: opt_epoch(item, "created_utc"),
        stickied: opt_bool(item, "stickied"),
        over_18: opt_bool(item, "over_18"),
        spoiler: opt_bool(item, "spoiler"),
        permalink: opt_str(item, "permalink"),
        author: opt_str(item, "author"),
        // Author details come from a secondary lookup
        author_is_gold: None,
        author_mod: None,
        author_has_verified_email: None,
        author_created: None,
        comment_karma: None,
    })
}

/// Fill the author-derived fields from a `/user/{name}/about` payload. Each
/// field stays independently nullable.
pub fn apply_author_details(post: &mut RedditPost, about: &Value) {
    post.author_is_gold = opt_bool(about, "is_gold");
    post.author_mod = opt_bool(about, "is_mod");
    post.author_has_verified_email = opt_bool(about, "has_verified_email");
    post.author_created = opt_epoch(about, "created_utc");
    post.comment_karma = opt_i64(about, "comment_karma");
}

/// Normalize a page of raw items, enriching each record with a best-effort
/// author lookup. A failed lookup leaves the author fields `None` without
/// affecting the record.
pub async fn extract_posts(
    client: &RedditApiClient,
    access_token: &str,
    subreddit: &str,
    raw_items: &[Value],
) -> ExtractionOutcome<RedditPost> {
    let mut outcome = ExtractionOutcome::new();

    for item in raw_items {
        match post_from_raw(item, subreddit) {
            Some(mut post) => {
                if let Some(author) = post.author.clone() {
                    sleep(AUTHOR_LOOKUP_DELAY).await;
                    match client.get_user_about(access_token, &author).await {
                        Ok(about) => apply_author_details(&mut post, &about),
                        Err(e) => {
                            debug!("Author lookup failed for u/{}: {}", author, e);
                        }
                    }
                }
                outcome.records.push(post);
            }
            None => {
                warn!("Skipping listing item without an id in r/{}", subreddit);
                outcome.missing_key += 1;
            }
        }
    }

    outcome
}
