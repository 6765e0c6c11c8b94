//! C8: Z-score anomaly detection over a baseline vs. recent window, with an
//! alert manager that coalesces duplicates and fans out to subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::{Alert, AlertSource, Resource, Severity, Stats};

const MIN_BASELINE_SAMPLES: usize = 10;
const WARNING_THRESHOLD: f64 = 3.0;
const CRITICAL_THRESHOLD: f64 = 4.0;

/// A detected deviation, before it becomes an [`Alert`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyScore {
    pub z_score: f64,
    pub severity: Severity,
}

/// `stddev=0` in the baseline yields `z_score=0` (no alert); fewer than
/// [`MIN_BASELINE_SAMPLES`] in the baseline yields no decision at all.
///
/// CPU-specific entry point: computes Z over `cpu_mean`/`cpu_stddev`.
pub fn detect_cpu(baseline: &Stats, recent: &Stats) -> Option<AnomalyScore> {
    detect_resource(baseline.count, baseline.cpu_mean, baseline.cpu_stddev, recent.cpu_mean)
}

/// Memory-specific detection entry point.
pub fn detect_memory(baseline: &Stats, recent: &Stats) -> Option<AnomalyScore> {
    detect_resource(baseline.count, baseline.mem_mean, baseline.mem_stddev, recent.mem_mean)
}

fn detect_resource(baseline_count: usize, baseline_mean: f64, baseline_stddev: f64, recent_mean: f64) -> Option<AnomalyScore> {
    if baseline_count < MIN_BASELINE_SAMPLES {
        return None;
    }
    Some(compute_score(baseline_mean, recent_mean, baseline_stddev))
}

fn compute_score(baseline_mean: f64, recent_mean: f64, baseline_stddev: f64) -> AnomalyScore {
    let z = if baseline_stddev == 0.0 {
        0.0
    } else {
        (recent_mean - baseline_mean) / baseline_stddev
    };
    let severity = if z.abs() >= CRITICAL_THRESHOLD {
        Severity::Critical
    } else if z.abs() >= WARNING_THRESHOLD {
        Severity::Warning
    } else {
        Severity::Info
    };
    AnomalyScore { z_score: z, severity }
}

/// Subscriber callback invoked for every newly raised (not coalesced) alert.
pub type AlertSubscriber = Arc<dyn Fn(Alert) + Send + Sync>;

/// Owns live alerts, coalesces duplicates of the same `(pod, resource,
/// source)` condition within `max_age`, and notifies subscribers
/// asynchronously (fire-and-forget, never blocking the detector).
pub struct AlertManager {
    alerts: DashMap<uuid::Uuid, Alert>,
    max_age: chrono::Duration,
    subscribers: Mutex<Vec<AlertSubscriber>>,
}

impl AlertManager {
    pub fn new(max_age: chrono::Duration) -> Self {
        Self {
            alerts: DashMap::new(),
            max_age,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: AlertSubscriber) {
        self.subscribers.lock().push(callback);
    }

    /// Raises a new alert unless an unresolved alert for the same condition
    /// already exists within `max_age`; returns the alert (new or existing).
    pub fn raise(
        &self,
        namespace: &str,
        pod: &str,
        resource_type: Resource,
        severity: Severity,
        source: AlertSource,
        metric_value: f64,
        threshold: f64,
        z_score: Option<f64>,
        now: DateTime<Utc>,
    ) -> Alert {
        let candidate = Alert::new(namespace, pod, resource_type, severity, source, metric_value, threshold, z_score, now);

        if let Some(existing) = self.alerts.iter().find(|e| e.same_condition(&candidate) && !e.is_expired(now, self.max_age)) {
            return existing.clone();
        }

        self.alerts.insert(candidate.id, candidate.clone());
        for sub in self.subscribers.lock().iter() {
            sub(candidate.clone());
        }
        candidate
    }

    pub fn resolve(&self, id: uuid::Uuid, now: DateTime<Utc>) -> bool {
        if let Some(mut entry) = self.alerts.get_mut(&id) {
            entry.resolved_at = Some(now);
            true
        } else {
            false
        }
    }

    pub fn list(&self, namespace: Option<&str>) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|e| namespace.is_none_or(|ns| e.namespace == ns))
            .map(|e| e.clone())
            .collect()
    }

    /// Drops alerts that have exceeded `max_age` without being resolved.
    pub fn expire(&self, now: DateTime<Utc>) {
        self.alerts.retain(|_, a| !a.is_expired(now, self.max_age));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(count: usize, mean: f64, stddev: f64) -> Stats {
        Stats {
            count,
            cpu_min: mean,
            cpu_max: mean,
            cpu_mean: mean,
            cpu_stddev: stddev,
            mem_min: mean,
            mem_max: mean,
            mem_mean: mean,
            mem_stddev: stddev,
        }
    }

    #[test]
    fn insufficient_baseline_yields_no_decision() {
        let baseline = stats(5, 100.0, 10.0);
        let recent = stats(5, 200.0, 5.0);
        assert!(detect_cpu(&baseline, &recent).is_none());
    }

    #[test]
    fn zero_stddev_yields_zero_score() {
        let baseline = stats(20, 100.0, 0.0);
        let recent = stats(5, 500.0, 5.0);
        let score = detect_cpu(&baseline, &recent).unwrap();
        assert_eq!(score.z_score, 0.0);
        assert_eq!(score.severity, Severity::Info);
    }

    #[test]
    fn large_deviation_is_critical() {
        let baseline = stats(20, 100.0, 10.0);
        let recent = stats(5, 145.0, 10.0);
        let score = detect_cpu(&baseline, &recent).unwrap();
        assert!(score.z_score >= CRITICAL_THRESHOLD);
        assert_eq!(score.severity, Severity::Critical);
    }

    #[test]
    fn alert_manager_coalesces_duplicate_conditions() {
        let mgr = AlertManager::new(chrono::Duration::hours(24));
        let now = Utc::now();
        let a = mgr.raise("ns", "pod", Resource::Cpu, Severity::Warning, AlertSource::Anomaly, 500.0, 100.0, Some(3.5), now);
        let b = mgr.raise("ns", "pod", Resource::Cpu, Severity::Critical, AlertSource::Anomaly, 600.0, 100.0, Some(4.5), now);
        assert_eq!(a.id, b.id);
        assert_eq!(mgr.list(None).len(), 1);
    }

    #[test]
    fn resolve_marks_alert_resolved() {
        let mgr = AlertManager::new(chrono::Duration::hours(24));
        let now = Utc::now();
        let a = mgr.raise("ns", "pod", Resource::Memory, Severity::Warning, AlertSource::Anomaly, 1.0, 1.0, None, now);
        assert!(mgr.resolve(a.id, now));
        assert!(mgr.list(None)[0].is_resolved());
    }
}
