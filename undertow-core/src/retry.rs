use crate::error::CoreError;
use crate::error_utils::ErrorExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Circuit breaker failure threshold
    pub failure_threshold: u32,
    /// Circuit breaker recovery timeout (in seconds)
    pub recovery_timeout_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000, // 1 second
            max_delay_ms: 30000, // 30 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,     // 10% jitter
            failure_threshold: 5,   // Circuit breaker after 5 consecutive failures
            recovery_timeout_s: 60, // Try recovery after 1 minute
        }
    }
}

impl RetryConfig {
    /// Create retry config tuned for the social-media APIs the pipeline polls
    pub fn social_api() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000, // Start with 2 seconds
            max_delay_ms: 60000, // Max 1 minute delay
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,      // 20% jitter to prevent thundering herd
            failure_threshold: 3,    // More aggressive circuit breaking for APIs
            recovery_timeout_s: 120, // 2 minute recovery window
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Blocking requests
    HalfOpen, // Testing recovery
}

/// Circuit breaker for preventing cascading failures
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    config: RetryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            config,
        }
    }

    /// Check if a request should be allowed
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                if let Some(last_failure) = self.last_failure_time {
                    let recovery_duration = Duration::from_secs(self.config.recovery_timeout_s);
                    if last_failure.elapsed() >= recovery_duration {
                        debug!("Circuit breaker transitioning to half-open for recovery test");
                        self.state = CircuitBreakerState::HalfOpen;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CircuitBreakerState::HalfOpen => true,
        }
    }

    /// Record a successful request
    pub fn record_success(&mut self) {
        match self.state {
            CircuitBreakerState::HalfOpen => {
                info!("Circuit breaker recovery successful, returning to closed state");
                self.state = CircuitBreakerState::Closed;
                self.failure_count = 0;
                self.last_failure_time = None;
            }
            _ => {
                self.failure_count = 0;
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitBreakerState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker opening due to {} consecutive failures",
                        self.failure_count
                    );
                    self.state = CircuitBreakerState::Open;
                }
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.state = CircuitBreakerState::Open;
            }
            CircuitBreakerState::Open => {
                // Already open, just update failure time
            }
        }
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state.clone()
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after an API-specified delay (rate limits with explicit reset)
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error classification
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if let Some(delay) = error.retry_after() {
        RetryStrategy::RetryWithDelay(delay)
    } else if error.is_retryable() {
        RetryStrategy::Retry
    } else {
        RetryStrategy::NoRetry
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
    pub circuit_breaker_trips: u64,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        let circuit_breaker = Arc::new(Mutex::new(CircuitBreaker::new(config.clone())));
        let metrics = Arc::new(Mutex::new(RetryMetrics::default()));

        Self {
            config,
            circuit_breaker,
            metrics,
        }
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        // Check circuit breaker first
        {
            let mut breaker = self.circuit_breaker.lock().unwrap();
            if !breaker.allow_request() {
                let mut metrics = self.metrics.lock().unwrap();
                metrics.circuit_breaker_trips += 1;
                drop(metrics);
                drop(breaker);

                warn!(
                    "Circuit breaker is open, blocking request for {}",
                    operation_name
                );
                return Err(CoreError::Internal {
                    message: "Circuit breaker is open".to_string(),
                });
            }
        }

        let mut last_error: Option<CoreError> = None;
        let mut total_delay_ms = 0u64;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            match operation().await {
                Ok(result) => {
                    {
                        let mut breaker = self.circuit_breaker.lock().unwrap();
                        breaker.record_success();
                    }

                    if attempt > 0 {
                        let mut metrics = self.metrics.lock().unwrap();
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;

                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }

                    return Ok(result);
                }
                Err(error) => {
                    let strategy = get_retry_strategy(&error);
                    let should_retry = attempt + 1 < self.config.max_attempts;

                    match strategy {
                        RetryStrategy::NoRetry => {
                            debug!(
                                "Not retrying {} due to error type: {}",
                                operation_name, error
                            );
                            last_error = Some(error);
                            break;
                        }
                        RetryStrategy::Retry if should_retry => {
                            let delay = calculate_delay(attempt, &self.config);
                            total_delay_ms += delay.as_millis() as u64;

                            info!(
                                "Retrying {} in {:?} due to: {}",
                                operation_name, delay, error
                            );

                            last_error = Some(error);
                            sleep(delay).await;
                        }
                        RetryStrategy::RetryWithDelay(delay) if should_retry => {
                            total_delay_ms += delay.as_millis() as u64;

                            info!(
                                "Retrying {} after specified delay of {:?} due to: {}",
                                operation_name, delay, error
                            );

                            last_error = Some(error);
                            sleep(delay).await;
                        }
                        _ => {
                            debug!("Max retry attempts reached for {}", operation_name);
                            last_error = Some(error);
                            break;
                        }
                    }
                }
            }
        }

        // All retries failed
        {
            let mut breaker = self.circuit_breaker.lock().unwrap();
            breaker.record_failure();
        }

        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.failed_retries += 1;
        }

        error!(
            "Operation {} failed after {} attempts with total delay of {}ms",
            operation_name, self.config.max_attempts, total_delay_ms
        );

        Err(last_error.unwrap_or(CoreError::Internal {
            message: "Unknown error during retry execution".to_string(),
        }))
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Get current circuit breaker state
    pub fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        self.circuit_breaker.lock().unwrap().get_state()
    }
}
