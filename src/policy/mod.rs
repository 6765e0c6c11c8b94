//! C6: matches a workload against an ordered, validated rule set and
//! accumulates the actions of every matching rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use regex::Regex;

use crate::error::{Error, Result};
use crate::model::{PodDescriptor, Rule};

const MULTIPLIER_RANGE: std::ops::RangeInclusive<f64> = 0.1..=10.0;

struct CompiledRule {
    rule: Rule,
    pod_name_regex: Option<Regex>,
}

/// Accumulated actions from every matching rule, in match order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedActions {
    pub cpu_mult: Option<f64>,
    pub mem_mult: Option<f64>,
    pub min_cpu_request: Option<u64>,
    pub max_cpu_limit: Option<u64>,
    pub min_mem_request: Option<u64>,
    pub max_mem_limit: Option<u64>,
    pub target_utilization: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyResult {
    pub applied_rules: Vec<String>,
    pub skip: bool,
    pub actions: AccumulatedActions,
}

/// Read-mostly rule set behind an atomic pointer swap: loads replace the
/// whole snapshot, evaluations always see one consistent set.
pub struct PolicyEvaluator {
    rules: RwLock<Arc<Vec<CompiledRule>>>,
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Validates, compiles, and atomically replaces the active rule set.
    /// Sorted by priority descending; ties preserve insertion order (a
    /// stable sort on the original `Vec` ordering).
    pub fn load(&self, rules: Vec<Rule>) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for r in &rules {
            if r.name.trim().is_empty() {
                return Err(Error::Validation("rule name must not be empty".into()));
            }
            if !names.insert(r.name.clone()) {
                return Err(Error::Validation(format!("duplicate rule name: {}", r.name)));
            }
            r.validate_regex()
                .map_err(|e| Error::Validation(format!("rule {}: invalid pod_name_regex: {e}", r.name)))?;

            if let (Some(min), Some(max)) = (r.actions.min_cpu_request, r.actions.max_cpu_limit) {
                if min > max {
                    return Err(Error::Validation(format!("rule {}: min_cpu_request > max_cpu_limit", r.name)));
                }
            }
            if let (Some(min), Some(max)) = (r.actions.min_mem_request, r.actions.max_mem_limit) {
                if min > max {
                    return Err(Error::Validation(format!("rule {}: min_mem_request > max_mem_limit", r.name)));
                }
            }
            for mult in [r.actions.cpu_mult, r.actions.mem_mult].into_iter().flatten() {
                if !MULTIPLIER_RANGE.contains(&mult) {
                    return Err(Error::Validation(format!("rule {}: multiplier {mult} out of [0.1, 10]", r.name)));
                }
            }
            if let Some(schedule) = &r.selectors.schedule {
                for range in &schedule.time_ranges {
                    if range.parse_bounds().is_none() {
                        return Err(Error::Validation(format!(
                            "rule {}: schedule time range {}-{} is not HH:MM",
                            r.name, range.start, range.end
                        )));
                    }
                }
                schedule
                    .timezone
                    .parse::<chrono_tz::Tz>()
                    .map_err(|_| Error::Validation(format!("rule {}: unknown timezone {}", r.name, schedule.timezone)))?;
            }
        }

        let mut indexed: Vec<(usize, Rule)> = rules.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.priority.cmp(&a.priority).then(ia.cmp(ib)));

        let compiled = indexed
            .into_iter()
            .map(|(_, rule)| {
                let pod_name_regex = rule
                    .selectors
                    .pod_name_regex
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .expect("validated above");
                CompiledRule { rule, pod_name_regex }
            })
            .collect();

        *self.rules.write() = Arc::new(compiled);
        Ok(())
    }

    /// Matches `pod`/`container` against every enabled rule in priority
    /// order, accumulating actions until a `skip` rule short-circuits.
    pub fn evaluate(&self, pod: &PodDescriptor, container: &str, now: DateTime<Utc>) -> PolicyResult {
        let snapshot = self.rules.read().clone();
        let mut applied_rules = Vec::new();
        let mut actions = AccumulatedActions::default();

        for compiled in snapshot.iter() {
            let rule = &compiled.rule;
            if !rule.enabled {
                continue;
            }
            if !selectors_match(compiled, pod, container, now) {
                continue;
            }

            applied_rules.push(rule.name.clone());
            if rule.actions.skip {
                return PolicyResult {
                    applied_rules,
                    skip: true,
                    actions,
                };
            }

            if let Some(v) = rule.actions.cpu_mult {
                actions.cpu_mult = Some(v);
            }
            if let Some(v) = rule.actions.mem_mult {
                actions.mem_mult = Some(v);
            }
            if let Some(v) = rule.actions.min_cpu_request {
                actions.min_cpu_request = Some(v);
            }
            if let Some(v) = rule.actions.max_cpu_limit {
                actions.max_cpu_limit = Some(v);
            }
            if let Some(v) = rule.actions.min_mem_request {
                actions.min_mem_request = Some(v);
            }
            if let Some(v) = rule.actions.max_mem_limit {
                actions.max_mem_limit = Some(v);
            }
            if let Some(v) = rule.actions.target_utilization {
                actions.target_utilization = Some(v);
            }
        }

        PolicyResult {
            applied_rules,
            skip: false,
            actions,
        }
    }
}

fn selectors_match(compiled: &CompiledRule, pod: &PodDescriptor, container: &str, now: DateTime<Utc>) -> bool {
    let s = &compiled.rule.selectors;

    if !s.namespaces.is_empty() && !s.namespaces.iter().any(|ns| ns == &pod.namespace) {
        return false;
    }
    if s.exclude_namespaces.iter().any(|ns| ns == &pod.namespace) {
        return false;
    }
    if !is_superset(&pod.labels, &s.labels) {
        return false;
    }
    if !is_superset(&pod.annotations, &s.annotations) {
        return false;
    }
    if let Some(regex) = &compiled.pod_name_regex {
        if !regex.is_match(&pod.name) {
            return false;
        }
    }
    if let Some(name) = &s.container_name {
        if name != container {
            return false;
        }
    }
    if let Some(schedule) = &s.schedule {
        if !schedule_admits(schedule, now) {
            return false;
        }
    }
    true
}

fn is_superset(haystack: &BTreeMap<String, String>, needle: &BTreeMap<String, String>) -> bool {
    needle.iter().all(|(k, v)| haystack.get(k) == Some(v))
}

/// All `time_ranges` must admit `now` (converted into the schedule's
/// timezone), and `days_of_week` (if non-empty) must include the current
/// weekday. An empty `time_ranges` list always admits.
fn schedule_admits(schedule: &crate::model::Schedule, now: DateTime<Utc>) -> bool {
    let tz: chrono_tz::Tz = match schedule.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => return false,
    };
    let local = now.with_timezone(&tz);

    if !schedule.days_of_week.is_empty() && !schedule.days_of_week.contains(&local.weekday()) {
        return false;
    }

    if schedule.time_ranges.is_empty() {
        return true;
    }

    schedule.time_ranges.iter().all(|range| {
        range
            .parse_bounds()
            .map(|(start, end)| {
                let t = local.time();
                if start <= end {
                    t >= start && t <= end
                } else {
                    t >= start || t <= end
                }
            })
            .unwrap_or(false)
    })
}
