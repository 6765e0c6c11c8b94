use super::datapoint::DataPoint;

/// Percentiles this engine computes on demand; anything else is rejected by
/// callers rather than silently rounded.
pub const SUPPORTED_PERCENTILES: [f64; 4] = [0.50, 0.90, 0.95, 0.99];

/// Materialized summary over a window of [`DataPoint`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub cpu_min: f64,
    pub cpu_max: f64,
    pub cpu_mean: f64,
    pub cpu_stddev: f64,
    pub mem_min: f64,
    pub mem_max: f64,
    pub mem_mean: f64,
    pub mem_stddev: f64,
}

impl Stats {
    /// `None` for an empty window; every field would be meaningless.
    pub fn compute(points: &[DataPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let (cpu_min, cpu_max, cpu_mean, cpu_stddev) =
            summarize(points.iter().map(|p| p.cpu_milli));
        let (mem_min, mem_max, mem_mean, mem_stddev) = summarize(points.iter().map(|p| p.mem_mb));

        Some(Self {
            count: points.len(),
            cpu_min,
            cpu_max,
            cpu_mean,
            cpu_stddev,
            mem_min,
            mem_max,
            mem_mean,
            mem_stddev,
        })
    }
}

fn summarize(values: impl Iterator<Item = f64> + Clone) -> (f64, f64, f64, f64) {
    let n = values.clone().count() as f64;
    let min = values.clone().fold(f64::INFINITY, f64::min);
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.clone().sum::<f64>() / n;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (min, max, mean, variance.sqrt())
}

/// Linear-interpolation nearest-rank percentile (the "R-7" method), matching
/// what most metrics backends report for `quantile()` queries.
///
/// `p` must be one of [`SUPPORTED_PERCENTILES`]; anything else returns
/// `None` rather than extrapolating.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !SUPPORTED_PERCENTILES.contains(&p) {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    if sorted.len() == 1 {
        return Some(sorted[0]);
    }

    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn points(cpu: &[f64]) -> Vec<DataPoint> {
        cpu.iter()
            .enumerate()
            .map(|(i, &c)| {
                DataPoint::new(Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(), c, c)
            })
            .collect()
    }

    #[test]
    fn empty_window_has_no_stats() {
        assert!(Stats::compute(&[]).is_none());
    }

    #[test]
    fn mean_and_stddev_over_uniform_data() {
        let pts = points(&[100.0, 100.0, 100.0]);
        let s = Stats::compute(&pts).unwrap();
        assert_eq!(s.cpu_mean, 100.0);
        assert_eq!(s.cpu_stddev, 0.0);
        assert_eq!(s.count, 3);
    }

    #[test]
    fn percentile_matches_known_values() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 0.50), Some(30.0));
        assert_eq!(percentile(&values, 0.99).unwrap().round(), 50.0);
    }

    #[test]
    fn percentile_rejects_unsupported_quantile() {
        assert_eq!(percentile(&[1.0, 2.0], 0.75), None);
    }

    #[test]
    fn percentile_single_point() {
        assert_eq!(percentile(&[42.0], 0.95), Some(42.0));
    }
}
