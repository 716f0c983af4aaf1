//! Single change-point model over an Observation Series.
//!
//! Indices `i < tau` belong to the pre-change regime with mean `mu_pre`;
//! indices `i >= tau` belong to the post-change regime with mean `mu_post`.
//! `tau` is therefore the first index of the new regime, and `tau = 0`
//! leaves the pre-change segment empty.
//!
//! Values are stored centred on the series mean `m0`, which is also the
//! prior mean of both regimes. The model only evaluates densities; the
//! sampler decides how to move through them.

use serde::{Deserialize, Serialize};

use super::priors::{
    PriorConfig, log_change_index_density, log_half_normal_density, log_normal_density,
};
use super::types::ChangePointError;
use crate::input::ObservationSeries;
use crate::utils::{mean, sample_std_dev, usize_to_f64};

/// Regime an index belongs to for a given change index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Pre,
    Post,
}

/// Segment assignment step function: `index < tau` is pre-change.
#[must_use]
pub const fn segment(index: usize, tau: usize) -> Regime {
    if index < tau { Regime::Pre } else { Regime::Post }
}

/// One point of the parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangePointParameters {
    pub tau: usize,
    pub mu_pre: f64,
    pub mu_post: f64,
    pub sigma: f64,
}

impl ChangePointParameters {
    /// Mean of the regime `index` falls in.
    #[must_use]
    pub const fn mean_at(&self, index: usize) -> f64 {
        match segment(index, self.tau) {
            Regime::Pre => self.mu_pre,
            Regime::Post => self.mu_post,
        }
    }
}

/// Normal conditional of a regime mean given the change index and noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionalNormal {
    pub mean: f64,
    pub std_dev: f64,
}

/// Prefix-sum view of the two segments induced by a change index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SegmentStats {
    pub pre_count: usize,
    pub pre_sum: f64,
    pub post_count: usize,
    pub post_sum: f64,
}

/// Explicit model object built once per analysis and shared read-only by
/// every chain.
#[derive(Debug, Clone)]
pub struct ChangePointModel {
    centered: Vec<f64>,
    prefix_sums: Vec<f64>,
    offset: f64,
    spread: f64,
    priors: PriorConfig,
}

impl ChangePointModel {
    /// # Errors
    ///
    /// Returns `ChangePointError` if the series or the prior configuration is
    /// invalid.
    pub fn new(series: &ObservationSeries, priors: PriorConfig) -> Result<Self, ChangePointError> {
        series.validate()?;
        if !priors.is_valid() {
            return Err(ChangePointError::InvalidPriorConfig);
        }

        let offset = mean(series.values());
        let centered: Vec<f64> = series.values().iter().map(|value| value - offset).collect();
        let mut prefix_sums = Vec::with_capacity(centered.len() + 1);
        prefix_sums.push(0.0);
        let mut running = 0.0;
        for value in &centered {
            running += value;
            prefix_sums.push(running);
        }

        Ok(Self {
            centered,
            prefix_sums,
            offset,
            spread: sample_std_dev(series.values()),
            priors,
        })
    }

    /// Number of observations, which is also the size of the change-index
    /// support.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.centered.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.centered.is_empty()
    }

    /// Prior mean of both regimes (the series mean).
    #[must_use]
    pub const fn prior_mean(&self) -> f64 {
        self.offset
    }

    /// Sample standard deviation of the series.
    #[must_use]
    pub const fn sample_std_dev(&self) -> f64 {
        self.spread
    }

    #[must_use]
    pub const fn priors(&self) -> PriorConfig {
        self.priors
    }

    pub(crate) fn segment_stats(&self, tau: usize) -> SegmentStats {
        let n = self.len();
        let tau = tau.min(n);
        let total = self.prefix_sums[n];
        let pre_sum = self.prefix_sums[tau];
        SegmentStats {
            pre_count: tau,
            pre_sum,
            post_count: n - tau,
            post_sum: total - pre_sum,
        }
    }

    /// Sum of squared residuals for the step function at `params`.
    #[must_use]
    pub fn residual_sum_of_squares(&self, params: &ChangePointParameters) -> f64 {
        let pre = params.mu_pre - self.offset;
        let post = params.mu_post - self.offset;
        let tau = params.tau.min(self.len());
        let pre_rss: f64 = self.centered[..tau]
            .iter()
            .map(|value| (value - pre) * (value - pre))
            .sum();
        let post_rss: f64 = self.centered[tau..]
            .iter()
            .map(|value| (value - post) * (value - post))
            .sum();
        pre_rss + post_rss
    }

    /// Gaussian log-likelihood of the series.
    #[must_use]
    pub fn log_likelihood(&self, params: &ChangePointParameters) -> f64 {
        if params.tau >= self.len() || !(params.sigma > 0.0) {
            return f64::NEG_INFINITY;
        }
        let n = usize_to_f64(self.len());
        let rss = self.residual_sum_of_squares(params);
        let variance = params.sigma * params.sigma;
        -0.5 * n * (std::f64::consts::TAU.ln() + variance.ln()) - rss / (2.0 * variance)
    }

    /// Joint log-prior density.
    #[must_use]
    pub fn log_prior(&self, params: &ChangePointParameters) -> f64 {
        if params.sigma < self.priors.sigma_floor {
            return f64::NEG_INFINITY;
        }
        log_change_index_density(params.tau, self.len())
            + log_normal_density(params.mu_pre, self.offset, self.priors.mean_scale)
            + log_normal_density(params.mu_post, self.offset, self.priors.mean_scale)
            + log_half_normal_density(params.sigma, self.priors.sigma_scale)
    }

    /// Unnormalized log-posterior density.
    #[must_use]
    pub fn log_posterior(&self, params: &ChangePointParameters) -> f64 {
        let prior = self.log_prior(params);
        if prior == f64::NEG_INFINITY {
            return prior;
        }
        prior + self.log_likelihood(params)
    }

    /// Log-density of `sigma` given the residual sum of squares, up to a
    /// constant.
    #[must_use]
    pub fn log_sigma_conditional(&self, rss: f64, sigma: f64) -> f64 {
        if sigma.is_nan() || sigma < self.priors.sigma_floor {
            return f64::NEG_INFINITY;
        }
        let n = usize_to_f64(self.len());
        -n * sigma.ln() - rss / (2.0 * sigma * sigma)
            + log_half_normal_density(sigma, self.priors.sigma_scale)
    }

    /// Log-weight of change index `tau` given `sigma`, with both regime
    /// means integrated out, up to a constant shared by all indices.
    #[must_use]
    pub fn change_index_log_weight(&self, tau: usize, sigma: f64) -> f64 {
        if tau >= self.len() {
            return f64::NEG_INFINITY;
        }
        let stats = self.segment_stats(tau);
        let variance = sigma * sigma;
        self.segment_log_weight(stats.pre_count, stats.pre_sum, variance)
            + self.segment_log_weight(stats.post_count, stats.post_sum, variance)
    }

    /// Fill `weights[tau]` with [`ChangePointModel::change_index_log_weight`]
    /// for every admissible index.
    pub fn change_index_log_weights(&self, sigma: f64, weights: &mut Vec<f64>) {
        weights.clear();
        weights.extend((0..self.len()).map(|tau| self.change_index_log_weight(tau, sigma)));
    }

    fn segment_log_weight(&self, count: usize, sum: f64, variance: f64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = usize_to_f64(count);
        let prior_variance = self.priors.mean_scale * self.priors.mean_scale;
        let shrinkage = variance / prior_variance;
        -0.5 * (n / shrinkage).ln_1p() + sum * sum / (2.0 * variance * (n + shrinkage))
    }

    /// Conditional posterior of a regime mean given `tau` and `sigma`.
    ///
    /// An empty segment falls back to the prior.
    #[must_use]
    pub fn mean_conditional(&self, regime: Regime, tau: usize, sigma: f64) -> ConditionalNormal {
        let stats = self.segment_stats(tau);
        let (count, sum) = match regime {
            Regime::Pre => (stats.pre_count, stats.pre_sum),
            Regime::Post => (stats.post_count, stats.post_sum),
        };
        let prior_variance = self.priors.mean_scale * self.priors.mean_scale;
        let shrinkage = sigma * sigma / prior_variance;
        let denominator = usize_to_f64(count) + shrinkage;
        ConditionalNormal {
            mean: self.offset + sum / denominator,
            std_dev: sigma / denominator.sqrt(),
        }
    }
}
