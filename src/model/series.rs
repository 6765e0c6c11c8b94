use super::datapoint::DataPoint;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Ordered, bounded sequence of [`DataPoint`]s for one series key.
///
/// Insertion keeps the buffer sorted by timestamp (out-of-order samples by
/// up to one sample period are tolerated and re-sorted in), evicts the
/// oldest sample once `max_samples` is exceeded, and opportunistically
/// prunes samples older than the retention window.
#[derive(Debug, Clone)]
pub struct Series {
    points: VecDeque<DataPoint>,
    max_samples: usize,
    retention: chrono::Duration,
}

impl Series {
    pub fn new(max_samples: usize, retention: chrono::Duration) -> Self {
        Self {
            points: VecDeque::with_capacity(max_samples.min(1024)),
            max_samples,
            retention,
        }
    }

    /// Append a sample, trimming to `max_samples` and pruning anything older
    /// than `now - retention`. Out-of-order samples are inserted in place.
    pub fn insert(&mut self, dp: DataPoint, now: DateTime<Utc>) {
        match self.points.back() {
            Some(last) if dp.timestamp < last.timestamp => {
                let idx = self
                    .points
                    .iter()
                    .position(|p| p.timestamp > dp.timestamp)
                    .unwrap_or(self.points.len());
                self.points.insert(idx, dp);
            }
            _ => self.points.push_back(dp),
        }

        while self.points.len() > self.max_samples {
            self.points.pop_front();
        }

        let cutoff = now - self.retention;
        while matches!(self.points.front(), Some(p) if p.timestamp < cutoff) {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points with `timestamp >= now - window`, oldest first.
    pub fn window(&self, window: chrono::Duration, now: DateTime<Utc>) -> Vec<DataPoint> {
        let cutoff = now - window;
        self.points
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .copied()
            .collect()
    }

    pub fn all(&self) -> Vec<DataPoint> {
        self.points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<DataPoint> {
        self.points.back().copied()
    }

    /// `true` once the series has been pruned down to no points; callers use
    /// this to garbage-collect the key from the store.
    pub fn is_garbage(&self) -> bool {
        self.points.is_empty()
    }
}
