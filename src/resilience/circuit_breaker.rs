//! Per-operation circuit breaker: opens after `failure_threshold` consecutive
//! failures, recovers through a half-open probe phase.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: chrono::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: chrono::Duration::seconds(30),
        }
    }
}

struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure_time: Option<DateTime<Utc>>,
}

/// Guards one named operation class (e.g. "resize" or "metrics-fetch").
/// A single mutex guards `state, failures, successes, last_failure_time`,
/// matching the concurrency model's single-lock-per-breaker requirement.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure_time: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns `Err` immediately (without calling `op`) when the breaker is
    /// open and has not yet reached `recovery_timeout`.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        if !self.allow_call() {
            return Err(Error::Transient(format!("circuit breaker '{}' is open", self.name)));
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed_ok = inner
                    .last_failure_time
                    .is_some_and(|t| self.clock.now() - t >= self.config.recovery_timeout);
                if elapsed_ok {
                    info!("circuit breaker '{}' half-opening for a recovery probe", self.name);
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    info!("circuit breaker '{}' closing after recovery", self.name);
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(self.clock.now());
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    warn!("circuit breaker '{}' opening after {} consecutive failures", self.name, inner.failures);
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker '{}' reopening after a failed recovery probe", self.name);
                inner.state = CircuitState::Open;
                inner.successes = 0;
            }
            CircuitState::Open => {}
        }
    }
}
