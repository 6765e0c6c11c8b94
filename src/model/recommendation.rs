use serde::{Deserialize, Serialize};

/// A proposed new `ResourceRequirements` for one container, in engine-native
/// units (CPU millicores, memory bytes).
///
/// `cpu_limit >= cpu_request` and `mem_limit >= mem_request` are invariants;
/// construct via [`Recommendation::new`], which clamps rather than panics,
/// since an out-of-order input from a buggy caller should degrade to a safe
/// value, not crash the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub cpu_request: u64,
    pub cpu_limit: u64,
    pub mem_request: u64,
    pub mem_limit: u64,
    pub reason: String,
    pub confidence: f64,
    pub source_rules: Vec<String>,
}

impl Recommendation {
    pub fn new(
        cpu_request: u64,
        cpu_limit: u64,
        mem_request: u64,
        mem_limit: u64,
        reason: impl Into<String>,
        confidence: f64,
        source_rules: Vec<String>,
    ) -> Self {
        Self {
            cpu_request,
            cpu_limit: cpu_limit.max(cpu_request),
            mem_request,
            mem_limit: mem_limit.max(mem_request),
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source_rules,
        }
    }
}

/// Outcome of either [`crate::RightSizer::recommend`] or a policy skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecommendOutcome {
    Recommend(Recommendation),
    NoChange { reason: String },
}
