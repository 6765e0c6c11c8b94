use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compiled, priority-ordered policy rule.
///
/// `pod_name_regex` is stored as source text on the wire but compiled once
/// at load time via [`crate::policy::CompiledRule`]; this type is the
/// serializable, user-authored shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
    pub selectors: Selectors,
    pub actions: Actions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selectors {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub pod_name_regex: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default)]
    pub skip: bool,
    pub cpu_mult: Option<f64>,
    pub mem_mult: Option<f64>,
    pub min_cpu_request: Option<u64>,
    pub max_cpu_limit: Option<u64>,
    pub min_mem_request: Option<u64>,
    pub max_mem_limit: Option<u64>,
    pub target_utilization: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub time_ranges: Vec<TimeRange>,
    #[serde(default)]
    pub days_of_week: Vec<chrono::Weekday>,
    pub timezone: String,
}

/// Inclusive `HH:MM` wall-clock range within a day, in the schedule's
/// timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn parse_bounds(&self) -> Option<(chrono::NaiveTime, chrono::NaiveTime)> {
        let start = chrono::NaiveTime::parse_from_str(&self.start, "%H:%M").ok()?;
        let end = chrono::NaiveTime::parse_from_str(&self.end, "%H:%M").ok()?;
        Some((start, end))
    }
}

impl Rule {
    /// Compiles `pod_name_regex` if present, purely to validate it; used by
    /// rule-set load-time validation (§4.6).
    pub fn validate_regex(&self) -> Result<(), regex::Error> {
        if let Some(pattern) = &self.selectors.pod_name_regex {
            Regex::new(pattern)?;
        }
        Ok(())
    }
}
