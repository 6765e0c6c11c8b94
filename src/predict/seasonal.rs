use chrono::{DateTime, Datelike, Timelike, Utc};

use super::{Observation, Predictor};
use crate::model::Prediction;

const HOURS_PER_DAY: usize = 24;
const DAYS_PER_WEEK: usize = 7;

/// Decomposes history into an overall trend plus hour-of-day and
/// day-of-week deviations. Requires >= 3 days of roughly hourly data.
pub struct SeasonalPredictor {
    min_points: usize,
}

impl SeasonalPredictor {
    pub fn new() -> Self {
        Self { min_points: 3 * HOURS_PER_DAY }
    }
}

impl Default for SeasonalPredictor {
    fn default() -> Self {
        Self::new()
    }
}

struct Decomposition {
    trend: f64,
    daily: [f64; HOURS_PER_DAY],
    weekly: [f64; DAYS_PER_WEEK],
    residual_stddev: f64,
}

fn decompose(history: &[Observation]) -> Decomposition {
    let overall = history.iter().map(|o| o.value).sum::<f64>() / history.len() as f64;

    let mut daily_sum = [0.0; HOURS_PER_DAY];
    let mut daily_count = [0usize; HOURS_PER_DAY];
    let mut weekly_sum = [0.0; DAYS_PER_WEEK];
    let mut weekly_count = [0usize; DAYS_PER_WEEK];

    for o in history {
        let h = o.timestamp.hour() as usize;
        daily_sum[h] += o.value - overall;
        daily_count[h] += 1;

        let d = o.timestamp.weekday().num_days_from_monday() as usize;
        weekly_sum[d] += o.value - overall;
        weekly_count[d] += 1;
    }

    let mut daily = [0.0; HOURS_PER_DAY];
    for h in 0..HOURS_PER_DAY {
        if daily_count[h] > 0 {
            daily[h] = daily_sum[h] / daily_count[h] as f64;
        }
    }
    let mut weekly = [0.0; DAYS_PER_WEEK];
    for d in 0..DAYS_PER_WEEK {
        if weekly_count[d] > 0 {
            weekly[d] = weekly_sum[d] / weekly_count[d] as f64;
        }
    }

    let residuals: Vec<f64> = history
        .iter()
        .map(|o| {
            let h = o.timestamp.hour() as usize;
            let d = o.timestamp.weekday().num_days_from_monday() as usize;
            o.value - (overall + daily[h] + weekly[d])
        })
        .collect();
    let residual_mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
    let residual_stddev = (residuals.iter().map(|r| (r - residual_mean).powi(2)).sum::<f64>()
        / residuals.len() as f64)
        .sqrt();

    Decomposition {
        trend: overall,
        daily,
        weekly,
        residual_stddev,
    }
}

impl Predictor for SeasonalPredictor {
    fn method_id(&self) -> &'static str {
        "seasonal"
    }

    fn min_points(&self) -> usize {
        self.min_points
    }

    fn predict(&self, history: &[Observation], horizons: &[chrono::Duration], now: DateTime<Utc>) -> Vec<Prediction> {
        if !self.validate(history) {
            return Vec::new();
        }
        let decomp = decompose(history);

        horizons
            .iter()
            .map(|&horizon| {
                let at = now + horizon;
                let h = at.hour() as usize;
                let d = at.weekday().num_days_from_monday() as usize;
                let value = decomp.trend + decomp.daily[h] + decomp.weekly[d];

                let horizon_hours = horizon.num_hours().max(1) as f64;
                let confidence = (1.0 - horizon_hours * 0.02).clamp(0.0, 1.0);
                let ci_half_width = decomp.residual_stddev.max(1e-6) * (1.0 + horizon_hours * 0.05);

                Prediction::new(
                    horizon,
                    value,
                    confidence,
                    self.method_id(),
                    value - ci_half_width,
                    value + ci_half_width,
                )
            })
            .collect()
    }
}
