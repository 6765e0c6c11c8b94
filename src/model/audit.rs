use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::Severity;
use super::prediction::Resource;
use super::series_key::SeriesKey;

/// Structured, typed events emitted by the decision/applier pipeline.
///
/// Every variant carries a `correlation_id` tying it to the pipeline run
/// that produced it, and a `sequence` that is monotonically non-decreasing
/// per `(key, resource)` — `ResizeAttempt` always precedes the
/// `ResourceChange`/`ResizeFailure` that follows it for the same pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    ResourceChange {
        correlation_id: uuid::Uuid,
        sequence: u64,
        key: SeriesKey,
        resource: Resource,
        old_value: u64,
        new_value: u64,
        at: DateTime<Utc>,
    },
    PolicyDecision {
        correlation_id: uuid::Uuid,
        sequence: u64,
        key: SeriesKey,
        applied_rules: Vec<String>,
        skipped: bool,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    AnomalyRaised {
        correlation_id: uuid::Uuid,
        sequence: u64,
        key: SeriesKey,
        resource: Resource,
        severity: Severity,
        z_score: f64,
        at: DateTime<Utc>,
    },
    AnomalyResolved {
        correlation_id: uuid::Uuid,
        sequence: u64,
        key: SeriesKey,
        resource: Resource,
        at: DateTime<Utc>,
    },
    ResizeAttempt {
        correlation_id: uuid::Uuid,
        sequence: u64,
        key: SeriesKey,
        resource: Resource,
        requested_value: u64,
        at: DateTime<Utc>,
    },
    ResizeFailure {
        correlation_id: uuid::Uuid,
        sequence: u64,
        key: SeriesKey,
        resource: Resource,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn sequence(&self) -> u64 {
        match self {
            AuditEvent::ResourceChange { sequence, .. }
            | AuditEvent::PolicyDecision { sequence, .. }
            | AuditEvent::AnomalyRaised { sequence, .. }
            | AuditEvent::AnomalyResolved { sequence, .. }
            | AuditEvent::ResizeAttempt { sequence, .. }
            | AuditEvent::ResizeFailure { sequence, .. } => *sequence,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        match self {
            AuditEvent::ResourceChange { key, .. }
            | AuditEvent::PolicyDecision { key, .. }
            | AuditEvent::AnomalyRaised { key, .. }
            | AuditEvent::AnomalyResolved { key, .. }
            | AuditEvent::ResizeAttempt { key, .. }
            | AuditEvent::ResizeFailure { key, .. } => key,
        }
    }
}
