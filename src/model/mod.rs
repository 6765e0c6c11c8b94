//! Core data types shared across the engine: series identity and samples,
//! statistics, predictions, recommendations, policy rules, alerts, audit
//! events, and pod/container descriptors.

mod alert;
mod audit;
mod datapoint;
mod pod;
mod prediction;
mod recommendation;
mod rule;
mod series;
mod series_key;
mod stats;

pub use alert::{Alert, AlertSource, Severity};
pub use audit::AuditEvent;
pub use datapoint::DataPoint;
pub use pod::{
    ContainerDescriptor, PodDescriptor, QosClass, ResizePolicy, ResourceRequirements,
    RestartPolicy,
};
pub use prediction::{Prediction, Resource};
pub use recommendation::{RecommendOutcome, Recommendation};
pub use rule::{Actions, Rule, Schedule, Selectors, TimeRange};
pub use series::Series;
pub use series_key::SeriesKey;
pub use stats::{percentile, Stats, SUPPORTED_PERCENTILES};
