use chrono::{DateTime, Utc};

use super::{Observation, Predictor};
use crate::model::Prediction;

/// Least-squares regression on minutes-since-start.
pub struct LinearRegressionPredictor {
    min_points: usize,
}

impl LinearRegressionPredictor {
    pub fn new() -> Self {
        Self { min_points: 5 }
    }
}

impl Default for LinearRegressionPredictor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fit output: `value = intercept + slope * minutes_since_start`.
pub struct Fit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub residual_stddev: f64,
}

impl Fit {
    /// `slope>0 ∧ R²≥0.5 ∧ |slope| ≥ 0.2` per the spec's positive-trend test.
    pub fn positive_trend(&self) -> bool {
        self.slope > 0.0 && self.r_squared >= 0.5 && self.slope.abs() >= 0.2
    }
}

pub fn least_squares(xs: &[f64], ys: &[f64]) -> Fit {
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean).powi(2);
    }
    let slope = if den.abs() > f64::EPSILON { num / den } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let predicted: Vec<f64> = xs.iter().map(|&x| intercept + slope * x).collect();
    let ss_res: f64 = ys.iter().zip(&predicted).map(|(y, p)| (y - p).powi(2)).sum();
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let r_squared = if ss_tot.abs() > f64::EPSILON { 1.0 - ss_res / ss_tot } else { 0.0 };
    let residual_stddev = (ss_res / n).sqrt();

    Fit {
        slope,
        intercept,
        r_squared,
        residual_stddev,
    }
}

impl Predictor for LinearRegressionPredictor {
    fn method_id(&self) -> &'static str {
        "linear_reg"
    }

    fn min_points(&self) -> usize {
        self.min_points
    }

    fn predict(&self, history: &[Observation], horizons: &[chrono::Duration], _now: DateTime<Utc>) -> Vec<Prediction> {
        if !self.validate(history) {
            return Vec::new();
        }
        let start = history.first().unwrap().timestamp;
        let xs: Vec<f64> = history
            .iter()
            .map(|o| (o.timestamp - start).num_seconds() as f64 / 60.0)
            .collect();
        let ys: Vec<f64> = history.iter().map(|o| o.value).collect();
        let fit = least_squares(&xs, &ys);
        let confidence = fit.r_squared.clamp(0.0, 1.0);

        horizons
            .iter()
            .map(|&horizon| {
                let x = xs.last().unwrap() + horizon.num_minutes() as f64;
                let value = fit.intercept + fit.slope * x;
                let ci_half_width = fit.residual_stddev.max(1e-6) * (1.0 + horizon.num_hours() as f64 * 0.1);
                Prediction::new(
                    horizon,
                    value,
                    confidence,
                    self.method_id(),
                    value - ci_half_width,
                    value + ci_half_width,
                )
                .with_metadata("slope", fit.slope.to_string())
                .with_metadata("r_squared", fit.r_squared.to_string())
            })
            .collect()
    }
}
