use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // Reddit allows 100 requests per minute for OAuth2
            time_window: Duration::from_secs(60), // 1 minute window
            burst_allowance: 10, // Allow small bursts up to 10 requests
        }
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    tokens: Arc<Mutex<f64>>,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_refill: Arc<Mutex<Instant>>,
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            tokens: Arc::new(Mutex::new(capacity)),
            capacity,
            refill_rate,
            last_refill: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let now = Instant::now();

        // Refill tokens based on elapsed time
        {
            let mut tokens = self.tokens.lock().await;
            let mut last_refill = self.last_refill.lock().await;

            let elapsed = now.duration_since(*last_refill);
            let tokens_to_add = elapsed.as_secs_f64() * self.refill_rate;

            *tokens = (*tokens + tokens_to_add).min(self.capacity);
            *last_refill = now;
        }

        let mut tokens = self.tokens.lock().await;
        if *tokens >= tokens_needed {
            *tokens -= tokens_needed;
            Ok(())
        } else {
            // Calculate wait time for next token
            let tokens_short = tokens_needed - *tokens;
            let wait_time = Duration::from_secs_f64(tokens_short / self.refill_rate);
            Err(wait_time)
        }
    }

    pub async fn get_available_tokens(&self) -> f64 {
        let now = Instant::now();
        let mut tokens = self.tokens.lock().await;
        let mut last_refill = self.last_refill.lock().await;

        let elapsed = now.duration_since(*last_refill);
        let tokens_to_add = elapsed.as_secs_f64() * self.refill_rate;

        *tokens = (*tokens + tokens_to_add).min(self.capacity);
        *last_refill = now;

        *tokens
    }
}

/// Proactive limiter gating every Reddit request: a token bucket paced at the
/// OAuth request budget, behind a semaphore bounding in-flight bursts.
#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    semaphore: Arc<Semaphore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.burst_allowance as usize));
        let token_bucket = TokenBucket::new(&config);

        Self {
            token_bucket,
            semaphore,
            config,
        }
    }

    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore should not be closed");

        // Try to acquire token, wait if necessary
        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }

        let queue_wait_time = start_time.elapsed();
        RateLimitPermit {
            _permit,
            queue_wait_time,
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let available_tokens = self.token_bucket.get_available_tokens().await;
        let available_permits = self.semaphore.available_permits();

        let estimated_wait_time = if available_tokens < 1.0 {
            Some(Duration::from_secs_f64(
                self.config.time_window.as_secs_f64() / self.config.max_requests as f64,
            ))
        } else {
            None
        };

        RateLimitStatus {
            available_tokens: available_tokens as u32,
            max_tokens: self.config.burst_allowance,
            available_permits,
            max_permits: self.config.burst_allowance as usize,
            requests_per_minute: self.config.max_requests,
            estimated_wait_time,
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub available_permits: usize,
    pub max_permits: usize,
    pub requests_per_minute: u32,
    pub estimated_wait_time: Option<Duration>,
}

impl RateLimitStatus {
    pub fn utilization_percentage(&self) -> f64 {
        let used_tokens = self.max_tokens - self.available_tokens;
        (used_tokens as f64 / self.max_tokens as f64) * 100.0
    }

    pub fn is_near_limit(&self) -> bool {
        self.utilization_percentage() > 80.0
    }
}
