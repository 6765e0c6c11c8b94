use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single resource-usage sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_milli: f64,
    pub mem_mb: f64,
    pub cpu_throttle: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, cpu_milli: f64, mem_mb: f64) -> Self {
        Self {
            timestamp,
            cpu_milli,
            mem_mb,
            cpu_throttle: 0.0,
        }
    }
}
