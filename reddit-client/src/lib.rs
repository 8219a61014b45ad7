pub mod api;
pub mod auth;
pub mod extract;
pub mod metrics;
pub mod rate_limiter;

pub use api::{ListingSort, RedditApiClient, RedditListing, RedditListingChild, RedditListingData};
pub use auth::RedditAuthenticator;
pub use extract::{extract_posts, post_from_raw};
pub use metrics::{ApiMetrics, MetricsCollector, RequestMetrics};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
