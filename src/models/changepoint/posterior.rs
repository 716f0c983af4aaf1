//! Posterior storage and parameter summaries.

use faer::Mat;

use super::model::ChangePointParameters;
use super::summary::highest_density_interval;
use super::types::{ChangePointError, Parameter, validate_credible_mass};
use crate::utils::{mean, percentile, sample_std_dev, sorted_copy, usize_to_f64};

/// Posterior Sample Set: retained draws grouped by chain.
///
/// Chains are concatenated in chain order wherever a pooled view is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorSamples {
    chains: Vec<Vec<ChangePointParameters>>,
}

impl PosteriorSamples {
    /// # Errors
    ///
    /// Returns `ChangePointError::EmptyPosterior` if no draws are supplied and
    /// `InconsistentPosteriorDimensions` if chains differ in length.
    pub fn from_chains(chains: Vec<Vec<ChangePointParameters>>) -> Result<Self, ChangePointError> {
        let Some(first) = chains.first() else {
            return Err(ChangePointError::EmptyPosterior);
        };
        if first.is_empty() {
            return Err(ChangePointError::EmptyPosterior);
        }
        if chains.iter().any(|chain| chain.len() != first.len()) {
            return Err(ChangePointError::InconsistentPosteriorDimensions);
        }
        Ok(Self { chains })
    }

    /// Total draws across chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn chain_count(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn draws_per_chain(&self) -> usize {
        self.chains.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn chains(&self) -> &[Vec<ChangePointParameters>] {
        &self.chains
    }

    /// Pooled draws in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &ChangePointParameters> + '_ {
        self.chains.iter().flatten()
    }

    /// Pooled change indices.
    #[must_use]
    pub fn change_indices(&self) -> Vec<usize> {
        self.iter().map(|draw| draw.tau).collect()
    }

    /// Pooled values of one parameter.
    #[must_use]
    pub fn column(&self, parameter: Parameter) -> Vec<f64> {
        self.iter().map(|draw| parameter_value(draw, parameter)).collect()
    }

    /// Values of one parameter within a single chain.
    #[must_use]
    pub fn chain_column(&self, chain: usize, parameter: Parameter) -> Vec<f64> {
        self.chains.get(chain).map_or_else(Vec::new, |draws| {
            draws.iter().map(|draw| parameter_value(draw, parameter)).collect()
        })
    }

    /// Pooled draws as an `S x 4` matrix with columns `tau, mu_pre, mu_post, sigma`.
    #[must_use]
    pub fn to_matrix(&self) -> Mat<f64> {
        let draws: Vec<&ChangePointParameters> = self.iter().collect();
        Mat::from_fn(draws.len(), Parameter::ALL.len(), |row, col| {
            parameter_value(draws[row], Parameter::ALL[col])
        })
    }
}

/// Value of `parameter` in one draw; the change index is widened to `f64`.
#[must_use]
pub fn parameter_value(draw: &ChangePointParameters, parameter: Parameter) -> f64 {
    match parameter {
        Parameter::ChangeIndex => usize_to_f64(draw.tau),
        Parameter::PreMean => draw.mu_pre,
        Parameter::PostMean => draw.mu_post,
        Parameter::Sigma => draw.sigma,
    }
}

/// Scalar posterior summary statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSummary {
    pub parameter: Parameter,
    pub mean: f64,
    pub std_dev: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
}

/// Summaries for every parameter in [`Parameter::ALL`] order.
///
/// # Errors
///
/// Returns `ChangePointError` if `credible_mass` is outside `(0, 1)`.
pub fn summarize_parameters(
    samples: &PosteriorSamples,
    credible_mass: f64,
) -> Result<Vec<ParameterSummary>, ChangePointError> {
    validate_credible_mass(credible_mass)?;
    Parameter::ALL
        .iter()
        .map(|parameter| summarize_scalar(*parameter, &samples.column(*parameter), credible_mass))
        .collect()
}

fn summarize_scalar(
    parameter: Parameter,
    values: &[f64],
    credible_mass: f64,
) -> Result<ParameterSummary, ChangePointError> {
    let (hdi_low, hdi_high) = highest_density_interval(values, credible_mass)?;
    let sorted = sorted_copy(values);
    Ok(ParameterSummary {
        parameter,
        mean: mean(values),
        std_dev: sample_std_dev(values),
        hdi_low,
        hdi_high,
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
    })
}
