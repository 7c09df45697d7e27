//! Statistical outlier model over a bounded observation window.
//!
//! Keeps a per-feature mean/std-dev baseline fitted from the most recent
//! observations. Scoring is the maximum absolute Z-score across features.

use std::collections::VecDeque;

use crate::detect::{DetectError, Observation};

const FEATURES: usize = Observation::FEATURE_COUNT;

/// Fitted baseline for a single feature.
#[derive(Debug, Clone, Copy)]
struct FeatureBaseline {
    mean: f64,
    std_dev: f64,
}

impl FeatureBaseline {
    /// Z-score of `value` against this baseline. A constant baseline
    /// (std == 0) treats any deviation as infinitely anomalous.
    fn z_score(&self, value: f64) -> f64 {
        if self.std_dev < f64::EPSILON {
            if (value - self.mean).abs() > f64::EPSILON {
                return f64::INFINITY;
            }
            return 0.0;
        }
        (value - self.mean) / self.std_dev
    }
}

/// Bounded-window outlier model. Unfitted until `fit` succeeds; refit
/// replaces the previous baselines wholesale.
pub struct OutlierModel {
    window: VecDeque<[f64; FEATURES]>,
    capacity: usize,
    baselines: Option<[FeatureBaseline; FEATURES]>,
}

impl OutlierModel {
    /// Minimum samples needed for a statistically meaningful fit.
    pub const MIN_FIT_SAMPLES: usize = 3;

    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            baselines: None,
        }
    }

    /// Append a feature vector, evicting the oldest on overflow.
    pub fn push(&mut self, features: [f64; FEATURES]) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(features);
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_fitted(&self) -> bool {
        self.baselines.is_some()
    }

    /// Fit per-feature baselines over the whole current window.
    pub fn fit(&mut self) -> Result<(), DetectError> {
        let n = self.window.len();
        if n < Self::MIN_FIT_SAMPLES {
            return Err(DetectError::InsufficientBaseline {
                needed: Self::MIN_FIT_SAMPLES,
                have: n,
            });
        }

        let mut baselines = [FeatureBaseline {
            mean: 0.0,
            std_dev: 0.0,
        }; FEATURES];

        for (i, baseline) in baselines.iter_mut().enumerate() {
            let sum: f64 = self.window.iter().map(|v| v[i]).sum();
            let mean = sum / n as f64;
            let sum_sq_diff: f64 = self.window.iter().map(|v| (v[i] - mean).powi(2)).sum();
            // Sample variance
            let variance = if n > 1 {
                sum_sq_diff / (n - 1) as f64
            } else {
                0.0
            };
            *baseline = FeatureBaseline {
                mean,
                std_dev: variance.sqrt(),
            };
        }

        self.baselines = Some(baselines);
        Ok(())
    }

    /// Score a vector against the fitted baselines: the maximum absolute
    /// per-feature Z-score.
    pub fn score(&self, features: &[f64; FEATURES]) -> Result<f64, DetectError> {
        let baselines = self
            .baselines
            .as_ref()
            .ok_or(DetectError::InsufficientBaseline {
                needed: Self::MIN_FIT_SAMPLES,
                have: self.window.len(),
            })?;

        let mut max_abs_z: f64 = 0.0;
        for (i, baseline) in baselines.iter().enumerate() {
            let z = baseline.z_score(features[i]).abs();
            if z > max_abs_z {
                max_abs_z = z;
            }
        }
        Ok(max_abs_z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(latency: f64) -> [f64; 3] {
        [latency, 20.0, 1.0]
    }

    #[test]
    fn test_unfitted_score_errors() {
        let model = OutlierModel::new(100);
        assert!(model.score(&vec3(50.0)).is_err());
    }

    #[test]
    fn test_fit_requires_minimum_samples() {
        let mut model = OutlierModel::new(100);
        model.push(vec3(50.0));
        model.push(vec3(51.0));
        assert!(model.fit().is_err());
        model.push(vec3(52.0));
        assert!(model.fit().is_ok());
        assert!(model.is_fitted());
    }

    #[test]
    fn test_z_score_of_spike() {
        let mut model = OutlierModel::new(100);
        for v in [48.0, 49.0, 50.0, 51.0, 52.0] {
            model.push(vec3(v));
        }
        model.fit().unwrap();

        // Mean 50, sample std ~1.58. A 100ms latency is a huge spike.
        let score = model.score(&vec3(100.0)).unwrap();
        assert!(score > 10.0);

        // The mean itself scores ~0.
        let score = model.score(&vec3(50.0)).unwrap();
        assert!(score < 0.1);
    }

    #[test]
    fn test_constant_baseline_flags_any_deviation() {
        let mut model = OutlierModel::new(100);
        for _ in 0..10 {
            model.push(vec3(50.0));
        }
        model.fit().unwrap();

        assert_eq!(model.score(&vec3(50.0)).unwrap(), 0.0);
        assert!(model.score(&vec3(50.5)).unwrap().is_infinite());
    }

    #[test]
    fn test_window_eviction() {
        let mut model = OutlierModel::new(5);
        for v in 0..10 {
            model.push(vec3(v as f64));
        }
        assert_eq!(model.len(), 5);
    }
}
