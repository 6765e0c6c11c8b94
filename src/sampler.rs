//! C3: periodically pulls from a [`MetricsProvider`] and writes into the
//! [`MetricStore`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;

use crate::clock::Clock;
use crate::model::{DataPoint, SeriesKey};
use crate::provider::MetricsProvider;
use crate::resilience::{call_with_resilience, CircuitBreaker, CircuitBreakerConfig, RetryConfig};
use crate::store::MetricStore;

/// One sampling pass over a fixed set of tracked containers.
pub struct Sampler {
    store: Arc<MetricStore>,
    provider: Arc<dyn MetricsProvider>,
    clock: Arc<dyn Clock>,
    breaker: CircuitBreaker,
    retry_config: RetryConfig,
    provider_errors: AtomicU64,
}

impl Sampler {
    pub fn new(store: Arc<MetricStore>, provider: Arc<dyn MetricsProvider>, clock: Arc<dyn Clock>) -> Self {
        let breaker = CircuitBreaker::new("metrics-fetch", CircuitBreakerConfig::default(), clock.clone());
        Self {
            store,
            provider,
            clock,
            breaker,
            retry_config: RetryConfig::default(),
            provider_errors: AtomicU64::new(0),
        }
    }

    /// For each tracked key: fetch usage, record on success, count and skip
    /// on failure. Runs sequentially per call; the reconciler schedules
    /// calls to this at `scrape_interval`.
    pub async fn sample_all(&self, keys: &[SeriesKey]) {
        for key in keys {
            let result = call_with_resilience(&self.breaker, &self.retry_config, || {
                self.provider.fetch(&key.namespace, &key.pod, &key.container)
            })
            .await;
            match result {
                Ok(usage) => {
                    let now = self.clock.now();
                    self.store.record(
                        key,
                        DataPoint::new(now, usage.cpu_milli, usage.mem_mb),
                        now,
                    );
                }
                Err(err) => {
                    self.provider_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("sampler: provider fetch failed for {key}: {err}");
                }
            }
        }
    }

    pub fn provider_error_count(&self) -> u64 {
        self.provider_errors.load(Ordering::Relaxed)
    }

    /// Runs [`Self::sample_all`] on a fixed interval until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        tracked: Arc<dyn Fn() -> Vec<SeriesKey> + Send + Sync>,
        interval: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let keys = tracked();
                    self.sample_all(&keys).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
