//! C9: scenario simulation over a proposed resource change, reusing C1
//! percentiles without touching the live decision/applier path.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn from_score(score: f64) -> Self {
        if score < 0.70 {
            RiskLevel::Low
        } else if score < 0.90 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioLabel {
    ScaleUp,
    ScaleDown,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub label: ScenarioLabel,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub cost_delta: f64,
}

/// Per-resource input to a scenario evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioInput {
    pub current: f64,
    pub proposed: f64,
    pub p95_7d: f64,
    pub observed_max: f64,
    pub samples: usize,
    pub unit_cost_per_hour: f64,
}

const HOURS_PER_MONTH: f64 = 730.0;
const CONFIDENCE_SAMPLE_CAP: f64 = 1440.0;

/// Scores one proposed change against observed peak usage.
pub fn evaluate(input: &ScenarioInput) -> ScenarioResult {
    let peak = input.p95_7d.max(input.observed_max);
    let risk_score = if input.proposed > 0.0 { peak / input.proposed } else { f64::INFINITY };
    let risk_level = RiskLevel::from_score(risk_score);
    let confidence = (input.samples as f64 / CONFIDENCE_SAMPLE_CAP).clamp(0.0, 1.0);
    let cost_delta = (input.proposed - input.current) * input.unit_cost_per_hour * HOURS_PER_MONTH;

    let label = if input.proposed > input.current {
        ScenarioLabel::ScaleUp
    } else if input.proposed < input.current {
        ScenarioLabel::ScaleDown
    } else {
        ScenarioLabel::NoChange
    };

    ScenarioResult {
        label,
        risk_score,
        risk_level,
        confidence,
        cost_delta,
    }
}

/// Evaluates a batch of proposals for the same resource.
pub fn evaluate_batch(current: f64, proposals: &[f64], p95_7d: f64, observed_max: f64, samples: usize, unit_cost_per_hour: f64) -> Vec<ScenarioResult> {
    proposals
        .iter()
        .map(|&proposed| {
            evaluate(&ScenarioInput {
                current,
                proposed,
                p95_7d,
                observed_max,
                samples,
                unit_cost_per_hour,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_down_with_low_headroom_is_high_risk() {
        let result = evaluate(&ScenarioInput {
            current: 1000.0,
            proposed: 500.0,
            p95_7d: 480.0,
            observed_max: 490.0,
            samples: 2000,
            unit_cost_per_hour: 0.01,
        });
        assert_eq!(result.label, ScenarioLabel::ScaleDown);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.cost_delta < 0.0);
    }

    #[test]
    fn scale_down_with_ample_headroom_is_low_risk() {
        // Matches the literal scenario from spec.md §8: current 600, proposed
        // 400, weekly peak 200 -> risk 0.5 -> low.
        let result = evaluate(&ScenarioInput {
            current: 600.0,
            proposed: 400.0,
            p95_7d: 200.0,
            observed_max: 150.0,
            samples: 2000,
            unit_cost_per_hour: 0.01,
        });
        assert_eq!(result.label, ScenarioLabel::ScaleDown);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.cost_delta < 0.0);
    }

    #[test]
    fn scale_down_past_peak_is_high_risk() {
        let result = evaluate(&ScenarioInput {
            current: 1000.0,
            proposed: 500.0,
            p95_7d: 480.0,
            observed_max: 495.0,
            samples: 500,
            unit_cost_per_hour: 0.01,
        });
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn batch_labels_each_proposal_independently() {
        let results = evaluate_batch(1000.0, &[500.0, 1000.0, 1500.0], 400.0, 420.0, 1440, 0.01);
        assert_eq!(results[0].label, ScenarioLabel::ScaleDown);
        assert_eq!(results[1].label, ScenarioLabel::NoChange);
        assert_eq!(results[2].label, ScenarioLabel::ScaleUp);
        assert_eq!(results[0].confidence, 1.0);
    }
}
