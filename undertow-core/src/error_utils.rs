use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::TwitterApi(e) => {
                error!("Twitter API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::TwitterApi(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::TwitterApi(TwitterApiError::RateLimitExceeded { reset_in }) => {
                Some(Duration::from_secs(*reset_in))
            }
            _ => None,
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            RedditApiError::InvalidResponse { .. } => true,
            // Authentication and permission problems never resolve by retrying
            RedditApiError::AuthenticationFailed { .. } => false,
            RedditApiError::InvalidToken => false,
            RedditApiError::Forbidden { .. } => false,
            RedditApiError::SubredditNotFound { .. } => false,
            RedditApiError::ReadOnlyViolation { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }
}

impl ErrorExt for TwitterApiError {
    fn log_error(&self) -> &Self {
        error!("TwitterApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("TwitterApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            TwitterApiError::RateLimitExceeded { .. } => true,
            TwitterApiError::RequestTimeout => true,
            TwitterApiError::ServerError { status_code } => *status_code >= 500,
            TwitterApiError::InvalidResponse { .. } => true,
            TwitterApiError::AuthenticationFailed { .. } => false,
            TwitterApiError::RegionNotFound { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TwitterApiError::RateLimitExceeded { reset_in } => {
                Some(Duration::from_secs(*reset_in))
            }
            _ => None,
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sql(sqlx::Error::PoolTimedOut) | DatabaseError::Sql(sqlx::Error::Io(_))
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
