use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub request_multiplier: f64,
    pub limit_multiplier: f64,
    pub min_request_millicores: u64,
    pub max_limit_millicores: u64,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            request_multiplier: 1.2,
            limit_multiplier: 2.0,
            min_request_millicores: 10,
            max_limit_millicores: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub request_multiplier: f64,
    pub limit_multiplier: f64,
    pub min_request_bytes: u64,
    pub max_limit_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            request_multiplier: 1.2,
            limit_multiplier: 2.0,
            min_request_bytes: 64 * 1024 * 1024,
            max_limit_bytes: 8192 * 1024 * 1024,
        }
    }
}

pub type FeatureGates = BTreeMap<String, bool>;

/// The full set of recognized configuration keys from the external
/// interfaces contract, in engine-native units. Field names differ from
/// the wire's dotted keys (`cpu.request_multiplier` -> `cpu.request_multiplier`
/// inside [`CpuConfig`]) but every default matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub resize_interval_secs: u64,
    pub scrape_interval_secs: u64,
    pub history_retention_days: u64,
    pub max_samples_per_series: usize,
    pub max_concurrent_reconciles: usize,

    pub cpu: CpuConfig,
    pub memory: MemoryConfig,

    pub max_change_percentage: f64,
    pub min_change_threshold: f64,
    pub cooldown_period_secs: i64,

    pub preserve_guaranteed_qos: bool,
    pub update_resize_policy: bool,

    pub max_concurrent_resizes: usize,
    pub max_restarts_per_hour: u32,
    pub respect_pdb: bool,
    pub respect_hpa: bool,
    pub respect_vpa: bool,

    pub percentile: f64,
    pub dry_run: bool,
    pub log_level: String,
    pub feature_gates: FeatureGates,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resize_interval_secs: 60,
            scrape_interval_secs: 30,
            history_retention_days: 7,
            max_samples_per_series: 10_080,
            max_concurrent_reconciles: 3,

            cpu: CpuConfig::default(),
            memory: MemoryConfig::default(),

            max_change_percentage: 0.50,
            min_change_threshold: 0.05,
            cooldown_period_secs: 300,

            preserve_guaranteed_qos: true,
            update_resize_policy: false,

            max_concurrent_resizes: 10,
            max_restarts_per_hour: 5,
            respect_pdb: true,
            respect_hpa: true,
            respect_vpa: true,

            percentile: 0.95,
            dry_run: false,
            log_level: "info".to_string(),
            feature_gates: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.cpu.min_request_millicores > self.cpu.max_limit_millicores {
            return Err(Error::Validation("cpu.min_request exceeds cpu.max_limit".into()));
        }
        if self.memory.min_request_bytes > self.memory.max_limit_bytes {
            return Err(Error::Validation("memory.min_request exceeds memory.max_limit".into()));
        }
        if !(0.0..=1.0).contains(&self.max_change_percentage) {
            return Err(Error::Validation("max_change_percentage must be in [0,1]".into()));
        }
        if !(0.0..=1.0).contains(&self.min_change_threshold) {
            return Err(Error::Validation("min_change_threshold must be in [0,1]".into()));
        }
        if !crate::model::SUPPORTED_PERCENTILES.contains(&self.percentile) {
            return Err(Error::Validation(format!(
                "percentile {} is not one of {:?}",
                self.percentile,
                crate::model::SUPPORTED_PERCENTILES
            )));
        }
        Ok(())
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        self.feature_gates.get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn inverted_cpu_bounds_fail_validation() {
        let mut s = Settings::default();
        s.cpu.min_request_millicores = 5000;
        s.cpu.max_limit_millicores = 100;
        assert!(s.validate().is_err());
    }

    #[test]
    fn unrecognized_percentile_fails_validation() {
        let mut s = Settings::default();
        s.percentile = 0.75;
        assert!(s.validate().is_err());
    }
}
