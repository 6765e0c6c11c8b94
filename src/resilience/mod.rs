//! C12: retry with backoff/jitter and a per-operation circuit breaker,
//! composed so an open breaker short-circuits before a retry loop begins.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{is_retryable_message, retry, RetryConfig};

use crate::error::Error;

/// Wraps `op` with the breaker first (short-circuiting when open), then
/// retry/backoff for whatever calls the breaker does let through.
pub async fn call_with_resilience<T, F, Fut>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    retry::retry(retry_config, || async { breaker.call(|| op()).await }).await
}
