use chrono::{DateTime, Utc};

use super::{Observation, Predictor};
use crate::model::Prediction;

const ALPHA_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
const BETA_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Holt's linear (level + trend) exponential smoothing, with `alpha`/`beta`
/// auto-tuned by grid search over `[0.1, 0.9]` minimizing SSE on the last
/// 20% of history.
pub struct ExponentialSmoothingPredictor {
    min_points: usize,
}

impl ExponentialSmoothingPredictor {
    pub fn new() -> Self {
        Self { min_points: 10 }
    }
}

impl Default for ExponentialSmoothingPredictor {
    fn default() -> Self {
        Self::new()
    }
}

struct HoltFit {
    level: f64,
    trend: f64,
    residual_stddev: f64,
}

fn holt_run(values: &[f64], alpha: f64, beta: f64) -> (Vec<f64>, f64, f64) {
    let mut level = values[0];
    let mut trend = values[1] - values[0];
    let mut fitted = Vec::with_capacity(values.len());
    fitted.push(level);

    for &v in &values[1..] {
        let forecast = level + trend;
        let new_level = alpha * v + (1.0 - alpha) * (level + trend);
        let new_trend = beta * (new_level - level) + (1.0 - beta) * trend;
        level = new_level;
        trend = new_trend;
        fitted.push(forecast);
    }
    (fitted, level, trend)
}

fn fit(values: &[f64]) -> HoltFit {
    let holdout_len = (values.len() / 5).max(1);
    let mut best = (f64::INFINITY, 0.3, 0.1);

    for &alpha in &ALPHA_GRID {
        for &beta in &BETA_GRID {
            let (fitted, _, _) = holt_run(values, alpha, beta);
            let sse: f64 = fitted[values.len() - holdout_len..]
                .iter()
                .zip(&values[values.len() - holdout_len..])
                .map(|(f, v)| (f - v).powi(2))
                .sum();
            if sse < best.0 {
                best = (sse, alpha, beta);
            }
        }
    }

    let (fitted, level, trend) = holt_run(values, best.1, best.2);
    let residuals: Vec<f64> = fitted.iter().zip(values).map(|(f, v)| v - f).collect();
    let residual_mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
    let residual_stddev = (residuals.iter().map(|r| (r - residual_mean).powi(2)).sum::<f64>()
        / residuals.len() as f64)
        .sqrt();

    HoltFit {
        level,
        trend,
        residual_stddev,
    }
}

impl Predictor for ExponentialSmoothingPredictor {
    fn method_id(&self) -> &'static str {
        "exp_smoothing"
    }

    fn min_points(&self) -> usize {
        self.min_points
    }

    fn predict(&self, history: &[Observation], horizons: &[chrono::Duration], _now: DateTime<Utc>) -> Vec<Prediction> {
        if !self.validate(history) {
            return Vec::new();
        }
        let values: Vec<f64> = history.iter().map(|o| o.value).collect();
        let span_minutes = (history.last().unwrap().timestamp - history.first().unwrap().timestamp)
            .num_seconds() as f64
            / 60.0
            / (history.len() - 1) as f64;
        let minutes_per_step = span_minutes.max(1.0);

        let fit = fit(&values);

        horizons
            .iter()
            .map(|&horizon| {
                let steps = (horizon.num_minutes() as f64 / minutes_per_step).max(1.0);
                let value = fit.level + fit.trend * steps;
                let ci_half_width = fit.residual_stddev * steps.sqrt().max(1.0);
                Prediction::new(
                    horizon,
                    value,
                    0.8,
                    self.method_id(),
                    value - ci_half_width,
                    value + ci_half_width,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn history(n: usize, slope: f64) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                value: 100.0 + slope * i as f64,
            })
            .collect()
    }

    #[test]
    fn insufficient_history_yields_no_prediction() {
        let p = ExponentialSmoothingPredictor::new();
        assert!(p.predict(&history(5, 1.0), &[chrono::Duration::hours(1)], Utc::now()).is_empty());
    }

    #[test]
    fn forecasts_upward_trend() {
        let p = ExponentialSmoothingPredictor::new();
        let preds = p.predict(&history(30, 2.0), &[chrono::Duration::hours(1)], Utc::now());
        assert_eq!(preds.len(), 1);
        assert!(preds[0].value > 100.0);
        assert!(preds[0].ci_lower <= preds[0].value && preds[0].value <= preds[0].ci_upper);
    }
}
