//! C7: merges current usage, historical percentiles, a forecast, and policy
//! actions into a target [`Recommendation`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::model::{Prediction, QosClass, RecommendOutcome, Recommendation, ResourceRequirements, SeriesKey};
use crate::policy::AccumulatedActions;

#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub request_multiplier: f64,
    pub request_addition: f64,
    pub limit_multiplier: f64,
    pub limit_addition: f64,
    pub min_request: u64,
    pub max_limit: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionConfig {
    pub cpu: ResourceLimits,
    pub memory: ResourceLimits,
    pub min_change_threshold: f64,
    pub max_change_percentage: f64,
    pub cooldown_period: chrono::Duration,
    pub preserve_guaranteed_qos: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            cpu: ResourceLimits {
                request_multiplier: 1.2,
                request_addition: 0.0,
                limit_multiplier: 2.0,
                limit_addition: 0.0,
                min_request: 10,
                max_limit: 4000,
            },
            memory: ResourceLimits {
                request_multiplier: 1.2,
                request_addition: 0.0,
                limit_multiplier: 2.0,
                limit_addition: 0.0,
                min_request: 64 * 1024 * 1024,
                max_limit: 8192 * 1024 * 1024,
            },
            min_change_threshold: 0.05,
            max_change_percentage: 0.50,
            cooldown_period: chrono::Duration::minutes(5),
            preserve_guaranteed_qos: true,
        }
    }
}

/// Inputs the engine needs to compute one container's target allocation.
pub struct DecisionInputs<'a> {
    pub current: ResourceRequirements,
    pub qos: QosClass,
    pub window_p95: (f64, f64),
    pub recent_max: (f64, f64),
    pub forecast: Option<&'a Prediction>,
    pub policy: &'a AccumulatedActions,
    pub applied_rules: &'a [String],
}

/// Tracks last-applied-change timestamps per `(key, resource)` for the
/// cooldown guard (§4.4 step 6).
#[derive(Default)]
pub struct CooldownTracker {
    last_change: DashMap<(SeriesKey, &'static str), DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn in_cooldown(&self, key: &SeriesKey, resource: &'static str, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        self.last_change
            .get(&(key.clone(), resource))
            .is_some_and(|t| now - *t < cooldown)
    }

    fn record_change(&self, key: &SeriesKey, resource: &'static str, now: DateTime<Utc>) {
        self.last_change.insert((key.clone(), resource), now);
    }
}

pub struct DecisionEngine {
    config: DecisionConfig,
    cooldown: CooldownTracker,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            cooldown: CooldownTracker::new(),
        }
    }

    pub fn recommend(&self, key: &SeriesKey, inputs: &DecisionInputs<'_>, now: DateTime<Utc>) -> RecommendOutcome {
        let cpu_forecast = inputs.forecast.map(|p| p.value).unwrap_or(0.0);
        let cpu = self.target_for_resource(
            key,
            "cpu",
            &self.config.cpu,
            inputs.current.cpu_request.unwrap_or(self.config.cpu.min_request),
            inputs.current.cpu_limit,
            inputs.window_p95.0,
            cpu_forecast,
            inputs.recent_max.0,
            inputs.policy.cpu_mult,
            inputs.policy.min_cpu_request,
            inputs.policy.max_cpu_limit,
            now,
        );
        let mem = self.target_for_resource(
            key,
            "memory",
            &self.config.memory,
            inputs.current.mem_request.unwrap_or(self.config.memory.min_request),
            inputs.current.mem_limit,
            inputs.window_p95.1,
            0.0,
            inputs.recent_max.1,
            inputs.policy.mem_mult,
            inputs.policy.min_mem_request,
            inputs.policy.max_mem_limit,
            now,
        );

        let (cpu_request, cpu_limit, cpu_changed) = cpu;
        let (mem_request, mem_limit, mem_changed) = mem;

        if !cpu_changed && !mem_changed {
            return RecommendOutcome::NoChange {
                reason: "no resource change exceeded min_change_threshold".into(),
            };
        }

        let (cpu_request, cpu_limit) = if inputs.qos == QosClass::Guaranteed && self.config.preserve_guaranteed_qos {
            (cpu_request, cpu_request)
        } else {
            (cpu_request, cpu_limit)
        };
        let (mem_request, mem_limit) = if inputs.qos == QosClass::Guaranteed && self.config.preserve_guaranteed_qos {
            (mem_request, mem_request)
        } else {
            (mem_request, mem_limit)
        };

        if cpu_changed {
            self.cooldown.record_change(key, "cpu", now);
        }
        if mem_changed {
            self.cooldown.record_change(key, "memory", now);
        }

        RecommendOutcome::Recommend(Recommendation::new(
            cpu_request,
            cpu_limit,
            mem_request,
            mem_limit,
            "usage/forecast/policy-derived target".into(),
            inputs.forecast.map(|p| p.confidence).unwrap_or(0.5),
            inputs.applied_rules.to_vec(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn target_for_resource(
        &self,
        key: &SeriesKey,
        resource: &'static str,
        limits: &ResourceLimits,
        current_request: u64,
        current_limit: Option<u64>,
        p95: f64,
        forecast: f64,
        recent_max: f64,
        policy_mult: Option<f64>,
        policy_min: Option<u64>,
        policy_max: Option<u64>,
        now: DateTime<Utc>,
    ) -> (u64, u64, bool) {
        // Step 1: usage_ref, falling back to the current request when every
        // observed signal is zero (no data yet).
        let mut usage_ref = p95.max(forecast).max(recent_max);
        if usage_ref <= 0.0 {
            usage_ref = current_request as f64;
        }

        let request_mult = policy_mult.unwrap_or(limits.request_multiplier);
        let min_request = policy_min.unwrap_or(limits.min_request);
        let max_limit = policy_max.unwrap_or(limits.max_limit);

        // Step 2
        let request_star = (usage_ref * request_mult + limits.request_addition)
            .clamp(min_request as f64, max_limit as f64) as u64;

        // Step 3: missing current limit is treated as +inf for the decrease
        // check, i.e. it never blocks an increase.
        let _ = current_limit;
        let limit_star = (request_star as f64)
            .max(usage_ref * limits.limit_multiplier + limits.limit_addition)
            .clamp(request_star as f64, max_limit as f64) as u64;

        // Step 5: thresholding against the current request.
        let delta_ratio = if current_request > 0 {
            (request_star as f64 - current_request as f64).abs() / current_request as f64
        } else {
            1.0
        };

        if delta_ratio < self.config.min_change_threshold {
            return (current_request, current_limit.unwrap_or(current_request), false);
        }

        let max_step = current_request as f64 * self.config.max_change_percentage;
        let clipped_request = if (request_star as f64 - current_request as f64).abs() > max_step {
            if request_star > current_request {
                current_request + max_step as u64
            } else {
                current_request.saturating_sub(max_step as u64)
            }
        } else {
            request_star
        };

        // Step 6: cooldown.
        if self.cooldown.in_cooldown(key, resource, now, self.config.cooldown_period) {
            return (current_request, current_limit.unwrap_or(current_request), false);
        }

        (clipped_request, limit_star.max(clipped_request), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AccumulatedActions;

    fn key() -> SeriesKey {
        SeriesKey::new("default", "pod", "app")
    }

    fn inputs(cpu_current: u64, cpu_p95: f64) -> DecisionInputs<'static> {
        DecisionInputs {
            current: ResourceRequirements {
                cpu_request: Some(cpu_current),
                cpu_limit: Some(cpu_current * 2),
                mem_request: Some(128 * 1024 * 1024),
                mem_limit: Some(256 * 1024 * 1024),
            },
            qos: QosClass::Burstable,
            window_p95: (cpu_p95, 128.0 * 1024.0 * 1024.0),
            recent_max: (cpu_p95, 128.0 * 1024.0 * 1024.0),
            forecast: None,
            policy: Box::leak(Box::new(AccumulatedActions::default())),
            applied_rules: &[],
        }
    }

    #[test]
    fn scales_up_past_threshold() {
        let engine = DecisionEngine::new(DecisionConfig::default());
        let outcome = engine.recommend(&key(), &inputs(100, 500.0), Utc::now());
        match outcome {
            RecommendOutcome::Recommend(rec) => {
                assert!(rec.cpu_request > 100);
                assert!(rec.cpu_limit >= rec.cpu_request);
            }
            RecommendOutcome::NoChange { .. } => panic!("expected a recommendation"),
        }
    }

    #[test]
    fn no_change_below_min_threshold() {
        let engine = DecisionEngine::new(DecisionConfig::default());
        // p95 close to current request * request_multiplier -> tiny delta
        let outcome = engine.recommend(&key(), &inputs(1000, 833.0), Utc::now());
        assert!(matches!(outcome, RecommendOutcome::NoChange { .. }));
    }

    #[test]
    fn guaranteed_qos_forces_limit_equals_request() {
        let engine = DecisionEngine::new(DecisionConfig::default());
        let mut inp = inputs(100, 500.0);
        inp.qos = QosClass::Guaranteed;
        let outcome = engine.recommend(&key(), &inp, Utc::now());
        if let RecommendOutcome::Recommend(rec) = outcome {
            assert_eq!(rec.cpu_request, rec.cpu_limit);
            assert_eq!(rec.mem_request, rec.mem_limit);
        } else {
            panic!("expected a recommendation");
        }
    }

    #[test]
    fn cooldown_suppresses_second_change() {
        let engine = DecisionEngine::new(DecisionConfig::default());
        let now = Utc::now();
        let first = engine.recommend(&key(), &inputs(100, 500.0), now);
        assert!(matches!(first, RecommendOutcome::Recommend(_)));

        let second = engine.recommend(&key(), &inputs(100, 900.0), now + chrono::Duration::seconds(30));
        assert!(matches!(second, RecommendOutcome::NoChange { .. }));
    }
}
