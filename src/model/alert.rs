use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prediction::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Anomaly,
    Prediction,
    Scaling,
}

/// A raised condition surfaced to operators. `z_score` is only present for
/// `source == Anomaly`; `resolved_at` is set once by [`crate::anomaly::AlertManager::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: uuid::Uuid,
    pub namespace: String,
    pub pod: String,
    pub resource_type: Resource,
    pub severity: Severity,
    pub source: AlertSource,
    pub metric_value: f64,
    pub threshold: f64,
    pub z_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        resource_type: Resource,
        severity: Severity,
        source: AlertSource,
        metric_value: f64,
        threshold: f64,
        z_score: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            namespace: namespace.into(),
            pod: pod.into(),
            resource_type,
            severity,
            source,
            metric_value,
            threshold,
            z_score,
            created_at,
            resolved_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.resolved_at.is_none() && now - self.created_at >= max_age
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Same underlying condition for coalescing purposes: same pod, resource,
    /// and source, still unresolved.
    pub fn same_condition(&self, other: &Alert) -> bool {
        self.namespace == other.namespace
            && self.pod == other.pod
            && self.resource_type == other.resource_type
            && self.source == other.source
            && !self.is_resolved()
    }
}
