use chrono::{DateTime, Utc};

use super::{ExponentialSmoothingPredictor, LinearRegressionPredictor, MovingAveragePredictor, Observation, Predictor, SeasonalPredictor};
use crate::error::{Error, Result};
use crate::model::Prediction;

/// Routes prediction requests to every registered predictor and selects the
/// best result by confidence.
pub struct PredictionEngine {
    predictors: Vec<Box<dyn Predictor>>,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self {
            predictors: vec![
                Box::new(MovingAveragePredictor::new()),
                Box::new(ExponentialSmoothingPredictor::new()),
                Box::new(LinearRegressionPredictor::new()),
                Box::new(SeasonalPredictor::new()),
            ],
        }
    }
}

impl PredictionEngine {
    pub fn new(predictors: Vec<Box<dyn Predictor>>) -> Self {
        Self { predictors }
    }

    /// Every predictor's forecast for every horizon, skipping predictors
    /// whose `validate` fails on this history.
    pub fn predict_all(&self, history: &[Observation], horizons: &[chrono::Duration], now: DateTime<Utc>) -> Vec<Prediction> {
        self.predictors
            .iter()
            .filter(|p| p.validate(history))
            .flat_map(|p| p.predict(history, horizons, now))
            .collect()
    }

    /// `argmax_confidence` over valid predictors for a single horizon. Ties
    /// are broken by the narrower horizon-scaled CI width. `Err` when no
    /// predictor has enough history.
    pub fn best(&self, history: &[Observation], horizon: chrono::Duration, now: DateTime<Utc>) -> Result<Prediction> {
        let candidates = self.predict_all(history, &[horizon], now);
        candidates
            .into_iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap()
                    .then_with(|| (b.ci_upper - b.ci_lower).partial_cmp(&(a.ci_upper - a.ci_lower)).unwrap())
            })
            .ok_or_else(|| Error::Unsupported("insufficient history for all predictors".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn history(n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| Observation {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                value: 100.0,
            })
            .collect()
    }

    #[test]
    fn best_returns_error_when_all_predictors_lack_data() {
        let engine = PredictionEngine::default();
        let err = engine.best(&history(1), chrono::Duration::hours(1), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn best_returns_a_valid_prediction_with_enough_history() {
        let engine = PredictionEngine::default();
        let pred = engine.best(&history(30), chrono::Duration::hours(1), Utc::now()).unwrap();
        assert!(pred.ci_lower <= pred.value && pred.value <= pred.ci_upper);
        assert!((0.0..=1.0).contains(&pred.confidence));
    }
}
