use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which resource a prediction, recommendation, or rule action concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Cpu,
    Memory,
}

/// `chrono::Duration` has no `Serialize`/`Deserialize` impl (chrono's
/// `serde` feature only covers `DateTime`/`Naive*`/`Weekday`/`Month`), so
/// `Prediction::horizon` goes through this as whole seconds.
mod horizon_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &chrono::Duration, s: S) -> Result<S::Ok, S::Error> {
        d.num_seconds().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<chrono::Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Ok(chrono::Duration::seconds(secs))
    }
}

/// A horizon-indexed forecast produced by a predictor.
///
/// `ci_lower <= value <= ci_upper` is an invariant every predictor must
/// uphold; [`Prediction::new`] clamps the bounds to enforce it rather than
/// trusting callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(with = "horizon_seconds")]
    pub horizon: chrono::Duration,
    pub value: f64,
    pub confidence: f64,
    pub method: String,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub metadata: HashMap<String, String>,
}

impl Prediction {
    pub fn new(
        horizon: chrono::Duration,
        value: f64,
        confidence: f64,
        method: impl Into<String>,
        ci_lower: f64,
        ci_upper: f64,
    ) -> Self {
        let lower = ci_lower.min(value);
        let upper = ci_upper.max(value);
        Self {
            horizon,
            value,
            confidence: confidence.clamp(0.0, 1.0),
            method: method.into(),
            ci_lower: lower,
            ci_upper: upper,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
