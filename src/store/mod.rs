//! C1: bounded, in-memory time-series store, one [`Series`] per
//! [`SeriesKey`], with retention and percentile/statistical queries.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::model::{percentile, DataPoint, Series, SeriesKey, Stats};

/// Per-series footprint bounds, shared by every key in a store.
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    pub max_samples_per_series: usize,
    pub retention: chrono::Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_samples_per_series: 10_080,
            retention: chrono::Duration::days(7),
        }
    }
}

/// Observability summary for one series, returned by [`MetricStore::stats`].
#[derive(Debug, Clone)]
pub struct SeriesStats {
    pub key: SeriesKey,
    pub len: usize,
}

/// Sharded, lock-per-series metrics store.
///
/// A coarse `DashMap` shard lock protects key creation/removal; each
/// series itself is guarded by its own [`parking_lot::Mutex`], so a writer
/// appending to one key never blocks a reader of another.
pub struct MetricStore {
    series: DashMap<SeriesKey, Arc<Mutex<Series>>>,
    limits: StoreLimits,
}

impl MetricStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            series: DashMap::new(),
            limits,
        }
    }

    /// Appends under the per-key lock; drops oldest if over
    /// `max_samples_per_series`; prunes points older than `now - retention`.
    pub fn record(&self, key: &SeriesKey, dp: DataPoint, now: chrono::DateTime<chrono::Utc>) {
        let entry = self.series.entry(key.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(Series::new(
                self.limits.max_samples_per_series,
                self.limits.retention,
            )))
        });
        entry.value().lock().insert(dp, now);
    }

    /// `None` when the key is missing or its window has zero samples.
    pub fn query(
        &self,
        key: &SeriesKey,
        window: chrono::Duration,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Stats> {
        let series = self.series.get(key)?;
        let points = series.value().lock().window(window, now);
        Stats::compute(&points)
    }

    /// Linear-interpolation nearest-rank percentile for cpu and memory over
    /// `window`. Requires >= 2 samples; with fewer, falls back to the
    /// latest recorded value for both resources.
    pub fn percentile(
        &self,
        key: &SeriesKey,
        window: chrono::Duration,
        p: f64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<(f64, f64)> {
        let series = self.series.get(key)?;
        let points = series.value().lock().window(window, now);
        if points.len() < 2 {
            return points.last().map(|dp| (dp.cpu_milli, dp.mem_mb));
        }
        let cpu: Vec<f64> = points.iter().map(|d| d.cpu_milli).collect();
        let mem: Vec<f64> = points.iter().map(|d| d.mem_mb).collect();
        Some((percentile(&cpu, p)?, percentile(&mem, p)?))
    }

    pub fn latest(&self, key: &SeriesKey) -> Option<DataPoint> {
        self.series.get(key)?.value().lock().latest()
    }

    /// All points currently retained for `key`, oldest first.
    pub fn all_points(&self, key: &SeriesKey) -> Vec<DataPoint> {
        self.series
            .get(key)
            .map(|s| s.value().lock().all())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Vec<SeriesStats> {
        self.series
            .iter()
            .map(|entry| SeriesStats {
                key: entry.key().clone(),
                len: entry.value().lock().len(),
            })
            .collect()
    }

    /// Drops keys whose series has been pruned down to zero points. Called
    /// periodically by the reconciler loop rather than on every query, so
    /// garbage collection does not contend with the hot write path.
    pub fn garbage_collect(&self) {
        self.series.retain(|_, s| !s.lock().is_garbage());
    }

    pub fn tracked_keys(&self) -> Vec<SeriesKey> {
        self.series.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn key() -> SeriesKey {
        SeriesKey::new("default", "pod-a", "app")
    }

    #[test]
    fn query_on_missing_key_is_none() {
        let store = MetricStore::new(StoreLimits::default());
        assert!(store
            .query(&key(), chrono::Duration::minutes(5), t(0))
            .is_none());
    }

    #[test]
    fn record_and_query_window() {
        let store = MetricStore::new(StoreLimits::default());
        let k = key();
        for i in 0..5 {
            store.record(&k, DataPoint::new(t(i * 10), 100.0, 200.0), t(i * 10));
        }
        let stats = store.query(&k, chrono::Duration::minutes(10), t(40)).unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.cpu_mean, 100.0);
    }

    #[test]
    fn percentile_falls_back_to_latest_below_two_samples() {
        let store = MetricStore::new(StoreLimits::default());
        let k = key();
        store.record(&k, DataPoint::new(t(0), 55.0, 66.0), t(0));
        let (cpu, mem) = store.percentile(&k, chrono::Duration::minutes(5), 0.95, t(0)).unwrap();
        assert_eq!((cpu, mem), (55.0, 66.0));
    }

    #[test]
    fn garbage_collection_drops_emptied_series() {
        let limits = StoreLimits {
            max_samples_per_series: 10,
            retention: chrono::Duration::seconds(1),
        };
        let store = MetricStore::new(limits);
        let k = key();
        store.record(&k, DataPoint::new(t(0), 1.0, 1.0), t(0));
        store.record(&k, DataPoint::new(t(100), 1.0, 1.0), t(100));
        store.garbage_collect();
        assert_eq!(store.tracked_keys().len(), 1);
    }

    #[test]
    fn independent_keys_do_not_block_each_other() {
        let store = MetricStore::new(StoreLimits::default());
        let a = SeriesKey::new("ns", "pod-a", "app");
        let b = SeriesKey::new("ns", "pod-b", "app");
        store.record(&a, DataPoint::new(t(0), 1.0, 1.0), t(0));
        store.record(&b, DataPoint::new(t(0), 2.0, 2.0), t(0));
        assert_eq!(store.latest(&a).unwrap().cpu_milli, 1.0);
        assert_eq!(store.latest(&b).unwrap().cpu_milli, 2.0);
    }
}
