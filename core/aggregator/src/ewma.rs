// sentinel/core/aggregator/src/ewma.rs

/// Standard deviation floor used when computing z-scores, so a flat
/// baseline cannot divide a deviation into infinity.
const MIN_STD: f64 = 1e-6;

/// Exponentially weighted mean/variance baseline.
///
/// The first observation seeds the mean; until then every z-score is 0, so
/// a key cannot be flagged anomalous on its first observation.
#[derive(Debug, Clone)]
pub struct Ewma {
    mean: Option<f64>,
    var: f64,
    alpha: f64,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        Self {
            mean: None,
            var: 1e-6,
            alpha,
        }
    }

    /// Roll the baseline forward with one observation.
    pub fn update(&mut self, x: f64) {
        match self.mean {
            None => self.mean = Some(x),
            Some(mean) => {
                let delta = x - mean;
                self.mean = Some(mean + self.alpha * delta);
                self.var = (1.0 - self.alpha) * (self.var + self.alpha * delta * delta);
            }
        }
    }

    /// Number of standard deviations `x` lies from the baseline mean.
    pub fn z(&self, x: f64) -> f64 {
        match self.mean {
            None => 0.0,
            Some(mean) => (x - mean) / self.std().max(MIN_STD),
        }
    }

    pub fn std(&self) -> f64 {
        self.var.max(0.0).sqrt()
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_is_zero_before_first_observation() {
        let ewma = Ewma::new(0.1);
        assert_eq!(ewma.z(1_000_000.0), 0.0);
    }

    #[test]
    fn test_first_update_seeds_mean() {
        let mut ewma = Ewma::new(0.1);
        ewma.update(42.0);
        assert_eq!(ewma.mean(), Some(42.0));
    }

    #[test]
    fn test_mean_tracks_observations() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(100.0);
        ewma.update(200.0);
        // mean moves half the distance toward the new observation
        assert!((ewma.mean().unwrap() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_deviation_yields_large_z() {
        let mut ewma = Ewma::new(0.1);
        for _ in 0..50 {
            ewma.update(100.0);
        }
        let z_far = ewma.z(10_000.0);
        let z_near = ewma.z(101.0);
        assert!(z_far > z_near);
        assert!(z_far > 4.0);
    }
}
