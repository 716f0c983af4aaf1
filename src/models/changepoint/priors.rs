//! Prior specifications and log-density helpers for the change-point model.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

/// Hyperparameters for the change-point prior set.
///
/// Both regime means share `Normal(m0, mean_scale)`, where `m0` is the
/// sample mean of the analysed series; `sigma ~ HalfNormal(sigma_scale)`
/// truncated below at `sigma_floor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// Standard deviation of the regime-mean priors.
    pub mean_scale: f64,
    /// Scale of the half-normal noise prior.
    pub sigma_scale: f64,
    /// Smallest noise scale with prior support. Keeps noise-free series
    /// (whose noise posterior would otherwise pile up at zero) finite.
    pub sigma_floor: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            mean_scale: 10.0,
            sigma_scale: 10.0,
            sigma_floor: 1.0e-8,
        }
    }
}

impl PriorConfig {
    /// Whether all prior hyperparameters are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.mean_scale.is_finite()
            && self.mean_scale > 0.0
            && self.sigma_scale.is_finite()
            && self.sigma_scale > 0.0
            && self.sigma_floor.is_finite()
            && self.sigma_floor > 0.0
            && self.sigma_floor < self.sigma_scale
    }
}

/// Log-density for `Normal(mean, scale)`.
#[must_use]
pub fn log_normal_density(value: f64, mean: f64, scale: f64) -> f64 {
    Normal::new(mean, scale).map_or(f64::NEG_INFINITY, |normal| normal.ln_pdf(value))
}

/// Log-density for `HalfNormal(scale)` on `[0, inf)`.
#[must_use]
pub fn log_half_normal_density(value: f64, scale: f64) -> f64 {
    if value < 0.0 || value.is_nan() {
        return f64::NEG_INFINITY;
    }
    std::f64::consts::LN_2 + log_normal_density(value, 0.0, scale)
}

/// Log-density of the uniform change-index prior over `0..len`.
#[must_use]
pub fn log_change_index_density(index: usize, len: usize) -> f64 {
    if index >= len {
        return f64::NEG_INFINITY;
    }
    -crate::utils::usize_to_f64(len).ln()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn prior_defaults_are_valid() {
        assert!(PriorConfig::default().is_valid());
    }

    #[test]
    fn floor_must_sit_below_scale() {
        let config = PriorConfig {
            sigma_floor: 20.0,
            ..PriorConfig::default()
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn half_normal_doubles_the_normal_density() {
        let half = log_half_normal_density(1.5, 2.0);
        let full = log_normal_density(1.5, 0.0, 2.0);
        assert_relative_eq!(half - full, std::f64::consts::LN_2, epsilon = 1e-12);
        assert!(log_half_normal_density(-0.1, 2.0).is_infinite());
    }

    #[test]
    fn invalid_normal_scale_has_no_density() {
        assert!(log_normal_density(0.0, 0.0, 0.0) == f64::NEG_INFINITY);
    }

    #[test]
    fn change_index_prior_is_uniform() {
        assert_relative_eq!(log_change_index_density(0, 4), -(4.0f64.ln()));
        assert_relative_eq!(log_change_index_density(3, 4), -(4.0f64.ln()));
        assert!(log_change_index_density(4, 4).is_infinite());
    }
}
