//! Posterior Summarizer: reduces a Posterior Sample Set to the Change-Point
//! Summary record.
//!
//! The change index is the mode of the sampled indices (smallest index wins
//! ties). Regime means are posterior means, and their intervals are empirical
//! highest-density intervals rather than normal approximations.

use chrono::NaiveDate;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::posterior::PosteriorSamples;
use super::types::{ChangePointError, Parameter, validate_credible_mass};
use crate::input::ObservationSeries;
use crate::utils::{mean, sorted_copy, usize_to_f64};

/// The externally visible result of one change-point analysis.
///
/// Dates serialize as ISO-8601 `YYYY-MM-DD`; intervals as `[low, high]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangePointSummary {
    /// First index of the post-change regime.
    pub change_index: usize,
    /// Timestamp of `change_index`.
    pub change_date: NaiveDate,
    pub pre_mean: f64,
    pub post_mean: f64,
    pub pre_mean_interval: (f64, f64),
    pub post_mean_interval: (f64, f64),
}

impl ChangePointSummary {
    /// `post_mean - pre_mean`.
    #[must_use]
    pub fn shift(&self) -> f64 {
        self.post_mean - self.pre_mean
    }

    /// # Errors
    ///
    /// Returns `ChangePointError::DivisionUndefined` when `pre_mean` is zero.
    pub fn percentage_change(&self) -> Result<f64, ChangePointError> {
        percentage_change(self.pre_mean, self.post_mean)
    }
}

/// `(post - pre) / pre * 100`.
///
/// # Errors
///
/// Returns `ChangePointError::DivisionUndefined` when `pre_mean` is exactly zero.
pub fn percentage_change(pre_mean: f64, post_mean: f64) -> Result<f64, ChangePointError> {
    if pre_mean == 0.0 {
        return Err(ChangePointError::DivisionUndefined { pre_mean });
    }
    Ok((post_mean - pre_mean) / pre_mean * 100.0)
}

/// Empirical distribution of the change index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeIndexPosterior {
    counts: Vec<usize>,
    total: usize,
    mode: usize,
}

impl ChangeIndexPosterior {
    /// Histogram of `indices` over `0..len`.
    ///
    /// # Errors
    ///
    /// Returns `ChangePointError::EmptyPosterior` for no draws and
    /// `ChangeIndexOutOfRange` if any index is `>= len`.
    pub fn from_indices(indices: &[usize], len: usize) -> Result<Self, ChangePointError> {
        if indices.is_empty() {
            return Err(ChangePointError::EmptyPosterior);
        }
        let mut counts = vec![0usize; len];
        for index in indices {
            let slot = counts
                .get_mut(*index)
                .ok_or(ChangePointError::ChangeIndexOutOfRange { index: *index, len })?;
            *slot += 1;
        }

        let mut mode = 0;
        for (index, count) in counts.iter().enumerate() {
            if *count > counts[mode] {
                mode = index;
            }
        }

        Ok(Self {
            counts,
            total: indices.len(),
            mode,
        })
    }

    /// Most frequently visited index; the smallest such index on ties.
    #[must_use]
    pub const fn mode(&self) -> usize {
        self.mode
    }

    /// Share of draws at the mode.
    #[must_use]
    pub fn mode_frequency(&self) -> f64 {
        self.probability(self.mode)
    }

    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn probability(&self, index: usize) -> f64 {
        self.counts
            .get(index)
            .map_or(0.0, |count| usize_to_f64(*count) / usize_to_f64(self.total))
    }

    #[must_use]
    pub fn probabilities(&self) -> Vec<f64> {
        (0..self.counts.len()).map(|index| self.probability(index)).collect()
    }
}

/// Narrowest interval containing `mass` of the empirical distribution.
///
/// With `n` sorted draws the interval spans `floor(mass * n)` steps; the
/// first (lowest) window wins ties.
///
/// # Errors
///
/// Returns `ChangePointError` if `values` is empty or `mass` is outside `(0, 1)`.
pub fn highest_density_interval(values: &[f64], mass: f64) -> Result<(f64, f64), ChangePointError> {
    validate_credible_mass(mass)?;
    if values.is_empty() {
        return Err(ChangePointError::EmptyPosterior);
    }

    let sorted = sorted_copy(values);
    let n = sorted.len();
    let span = (mass * usize_to_f64(n))
        .floor()
        .to_usize()
        .unwrap_or(0)
        .min(n - 1);

    let mut best = 0;
    let mut best_width = f64::INFINITY;
    for start in 0..n - span {
        let width = sorted[start + span] - sorted[start];
        if width < best_width {
            best_width = width;
            best = start;
        }
    }
    Ok((sorted[best], sorted[best + span]))
}

/// Reduce a Posterior Sample Set to the Change-Point Summary.
///
/// # Errors
///
/// Returns `ChangePointError` if `credible_mass` is invalid, the sample set
/// is empty, or a sampled index lies outside `series`.
pub fn summarize_change_point(
    samples: &PosteriorSamples,
    series: &ObservationSeries,
    credible_mass: f64,
) -> Result<ChangePointSummary, ChangePointError> {
    validate_credible_mass(credible_mass)?;
    let posterior = ChangeIndexPosterior::from_indices(&samples.change_indices(), series.len())?;
    let change_index = posterior.mode();
    let change_date =
        series
            .timestamp(change_index)
            .ok_or(ChangePointError::ChangeIndexOutOfRange {
                index: change_index,
                len: series.len(),
            })?;

    let pre = samples.column(Parameter::PreMean);
    let post = samples.column(Parameter::PostMean);

    Ok(ChangePointSummary {
        change_index,
        change_date,
        pre_mean: mean(&pre),
        post_mean: mean(&post),
        pre_mean_interval: highest_density_interval(&pre, credible_mass)?,
        post_mean_interval: highest_density_interval(&post, credible_mass)?,
    })
}
