//! C4/C5: pluggable forecasters and the engine that routes to them.

mod engine;
mod exp_smoothing;
mod linear_regression;
mod moving_average;
mod seasonal;

pub use engine::PredictionEngine;
pub use exp_smoothing::ExponentialSmoothingPredictor;
pub use linear_regression::LinearRegressionPredictor;
pub use moving_average::MovingAveragePredictor;
pub use seasonal::SeasonalPredictor;

use chrono::{DateTime, Utc};

use crate::model::Prediction;

/// One scalar reading at a point in time — a single resource's value
/// extracted from a [`crate::model::DataPoint`] series, since each
/// predictor forecasts one resource at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A pluggable forecaster over a resource's observation history.
pub trait Predictor: Send + Sync {
    fn method_id(&self) -> &'static str;

    /// Minimum number of observations before this predictor will produce a
    /// forecast at all.
    fn min_points(&self) -> usize;

    fn validate(&self, history: &[Observation]) -> bool {
        history.len() >= self.min_points()
    }

    /// Empty when `validate` fails; one [`Prediction`] per horizon
    /// otherwise.
    fn predict(&self, history: &[Observation], horizons: &[chrono::Duration], now: DateTime<Utc>) -> Vec<Prediction>;
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn stddev(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
