//! Bounded exponential backoff with jitter, plus the substring-based error
//! classifier that decides whether a failure is worth retrying.

use rand::Rng;

use crate::error::Error;

const RETRYABLE_SUBSTRINGS: [&str; 11] = [
    "timeout",
    "connection refused",
    "eof",
    "too many requests",
    "internal server error",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "connection reset",
    "i/o timeout",
    "context deadline exceeded",
];

/// Matches a lowercased error message against the known-transient substring
/// list; anything unmatched is treated as non-retryable.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: std::time::Duration,
    pub backoff_factor: f64,
    pub max_delay: std::time::Duration,
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: std::time::Duration::from_millis(100),
            backoff_factor: 2.0,
            max_delay: std::time::Duration::from_secs(10),
            randomization_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay before the `attempt`-th retry (0-indexed), with
    /// `± randomization_factor` jitter, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter_span = capped * self.randomization_factor;
        let jitter = rand::rng().random_range(-jitter_span..=jitter_span);
        std::time::Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// Retries `op` up to `config.max_retries` additional times while the error
/// classifies as retryable, sleeping with backoff+jitter between attempts.
/// With zero transient errors this degenerates to exactly one call.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                tokio::time::sleep(config.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classifies_known_transient_substrings() {
        assert!(is_retryable_message("Connection Refused by peer"));
        assert!(is_retryable_message("upstream returned 503 Service Unavailable"));
        assert!(!is_retryable_message("permission denied"));
    }

    #[tokio::test]
    async fn zero_transient_errors_is_a_single_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            ..Default::default()
        };
        let result = retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(Error::Transient("connection reset".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(Error::Forbidden("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
