//! Core public types for the change-point module.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::priors::PriorConfig;
use crate::inference::{InferenceError, SamplerConfig};
use crate::input::InputError;

/// Errors returned by change-point configuration, sampling and summarization.
#[derive(Debug, Error)]
pub enum ChangePointError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    InvalidSchedule(#[from] InferenceError),
    #[error("invalid change-point prior configuration")]
    InvalidPriorConfig,
    #[error("invalid change-point proposal tuning configuration")]
    InvalidProposalTuning,
    #[error("invalid sampler stability thresholds")]
    InvalidStabilityThresholds,
    #[error("credible mass must lie strictly between 0 and 1; found {mass}")]
    InvalidCredibleMass { mass: f64 },
    #[error("posterior draws are required")]
    EmptyPosterior,
    #[error("posterior chains must hold the same number of draws")]
    InconsistentPosteriorDimensions,
    #[error("change index {index} is outside a series of length {len}")]
    ChangeIndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    NumericalInstability(#[from] InstabilityError),
    #[error("percentage change is undefined for a pre-change mean of {pre_mean}")]
    DivisionUndefined { pre_mean: f64 },
    #[error("change-point analysis was cancelled")]
    Cancelled,
    #[error("a sampling worker panicked")]
    WorkerPanicked,
    #[error("invalid analysis configuration document: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Scalar parameters tracked by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    /// Change index `tau`.
    ChangeIndex,
    /// Pre-change mean `mu_pre`.
    PreMean,
    /// Post-change mean `mu_post`.
    PostMean,
    /// Shared noise scale `sigma`.
    Sigma,
}

impl Parameter {
    /// Column order used by matrix exports and summary tables.
    pub const ALL: [Self; 4] = [Self::ChangeIndex, Self::PreMean, Self::PostMean, Self::Sigma];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ChangeIndex => "tau",
            Self::PreMean => "mu_pre",
            Self::PostMean => "mu_post",
            Self::Sigma => "sigma",
        }
    }

    #[must_use]
    pub const fn column(self) -> usize {
        match self {
            Self::ChangeIndex => 0,
            Self::PreMean => 1,
            Self::PostMean => 2,
            Self::Sigma => 3,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detail attached to a failed sampling run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstabilityError {
    #[error(
        "acceptance for {parameter} collapsed to {acceptance:.4} (< {threshold}) in chain {chain} after {iterations} iterations"
    )]
    AcceptanceCollapse {
        parameter: Parameter,
        chain: usize,
        iterations: usize,
        acceptance: f64,
        threshold: f64,
    },
    #[error(
        "effective sample size for {parameter} is {effective_sample_size:.1} (< {threshold}) in chain {chain} after {iterations} iterations"
    )]
    LowEffectiveSampleSize {
        parameter: Parameter,
        chain: usize,
        iterations: usize,
        effective_sample_size: f64,
        threshold: f64,
    },
    #[error(
        "chain {chain} hit {divergences} divergent transitions (max {max_divergences}) in {iterations} iterations"
    )]
    Divergence {
        chain: usize,
        iterations: usize,
        divergences: usize,
        max_divergences: usize,
    },
    #[error("non-finite draw for {parameter} in chain {chain} at iteration {iteration}")]
    NonFiniteDraw {
        parameter: Parameter,
        chain: usize,
        iteration: usize,
    },
}

impl InstabilityError {
    /// Chain that triggered the failure.
    #[must_use]
    pub const fn chain(&self) -> usize {
        match self {
            Self::AcceptanceCollapse { chain, .. }
            | Self::LowEffectiveSampleSize { chain, .. }
            | Self::Divergence { chain, .. }
            | Self::NonFiniteDraw { chain, .. } => *chain,
        }
    }
}

/// How the sampler moves the discrete change index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeIndexUpdate {
    /// Exact draw from the change-index conditional with both means
    /// integrated out.
    #[default]
    Marginal,
    /// Metropolis-Hastings step of at most `max_step` indices against the
    /// same mean-integrated target.
    RandomWalk { max_step: usize },
}

/// Proposal-scale and adaptation controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalTuning {
    pub change_index_update: ChangeIndexUpdate,
    /// Minimum allowed proposal scale.
    pub min_draw_scale: f64,
    /// Initial random-walk scale for `log(sigma)`.
    pub log_sigma_draw_scale: f64,
    /// Adapt every `adaptation_interval` iterations during warm-up.
    pub adaptation_interval: usize,
    /// Half-width of the acceptance band around the target acceptance.
    pub acceptance_tolerance: f64,
    /// Multiplicative scale decrease when acceptance is below the band.
    pub scale_decrease_factor: f64,
    /// Multiplicative scale increase when acceptance is above the band.
    pub scale_increase_factor: f64,
}

impl Default for ProposalTuning {
    fn default() -> Self {
        Self {
            change_index_update: ChangeIndexUpdate::Marginal,
            min_draw_scale: 1.0e-3,
            log_sigma_draw_scale: 0.2,
            adaptation_interval: 50,
            acceptance_tolerance: 0.1,
            scale_decrease_factor: 0.9,
            scale_increase_factor: 1.1,
        }
    }
}

impl ProposalTuning {
    /// Whether proposal tuning settings are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        let step_ok = match self.change_index_update {
            ChangeIndexUpdate::Marginal => true,
            ChangeIndexUpdate::RandomWalk { max_step } => max_step > 0,
        };
        step_ok
            && self.min_draw_scale > 0.0
            && self.log_sigma_draw_scale > 0.0
            && self.adaptation_interval > 0
            && (0.0..1.0).contains(&self.acceptance_tolerance)
            && self.scale_decrease_factor > 0.0
            && self.scale_decrease_factor <= 1.0
            && self.scale_increase_factor >= 1.0
            && self.scale_increase_factor.is_finite()
    }
}

/// Limits a chain must satisfy for its draws to be returned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityThresholds {
    /// Minimum post-warm-up acceptance of the `log(sigma)` random walk.
    pub min_acceptance_rate: f64,
    /// Minimum per-chain effective sample size for every parameter, capped
    /// at the number of retained draws.
    pub min_effective_sample_size: f64,
    /// Maximum divergent transitions tolerated per chain.
    pub max_divergences: usize,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            min_acceptance_rate: 0.01,
            min_effective_sample_size: 10.0,
            max_divergences: 0,
        }
    }
}

impl StabilityThresholds {
    #[must_use]
    pub fn is_valid(self) -> bool {
        (0.0..1.0).contains(&self.min_acceptance_rate)
            && self.min_effective_sample_size.is_finite()
            && self.min_effective_sample_size >= 0.0
    }
}

/// Full configuration of one change-point analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sampler: SamplerConfig,
    pub priors: PriorConfig,
    pub proposals: ProposalTuning,
    pub stability: StabilityThresholds,
    /// Probability mass of the reported highest-density intervals.
    pub credible_mass: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            priors: PriorConfig::default(),
            proposals: ProposalTuning::default(),
            stability: StabilityThresholds::default(),
            credible_mass: 0.95,
        }
    }
}

impl AnalysisConfig {
    /// Parse a (possibly partial) JSON document; omitted fields keep their
    /// defaults. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns `ChangePointError::InvalidConfig` for malformed JSON and any
    /// validation error otherwise.
    pub fn from_json(document: &str) -> Result<Self, ChangePointError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ChangePointError` if any configuration block is invalid.
    pub fn validate(self) -> Result<(), ChangePointError> {
        self.sampler.validate()?;
        if !self.priors.is_valid() {
            return Err(ChangePointError::InvalidPriorConfig);
        }
        if !self.proposals.is_valid() {
            return Err(ChangePointError::InvalidProposalTuning);
        }
        if !self.stability.is_valid() {
            return Err(ChangePointError::InvalidStabilityThresholds);
        }
        validate_credible_mass(self.credible_mass)
    }
}

pub(crate) fn validate_credible_mass(mass: f64) -> Result<(), ChangePointError> {
    if mass > 0.0 && mass < 1.0 {
        Ok(())
    } else {
        Err(ChangePointError::InvalidCredibleMass { mass })
    }
}

/// Per-block acceptance rates of one chain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AcceptanceRates {
    /// Random-walk acceptance, or the fraction of iterations that moved the
    /// index under [`ChangeIndexUpdate::Marginal`].
    pub change_index: f64,
    /// Post-warm-up acceptance of the `log(sigma)` random walk.
    pub sigma: f64,
}

/// Effective sample size per parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffectiveSampleSizes {
    pub change_index: f64,
    pub pre_mean: f64,
    pub post_mean: f64,
    pub sigma: f64,
}

impl EffectiveSampleSizes {
    #[must_use]
    pub const fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::ChangeIndex => self.change_index,
            Parameter::PreMean => self.pre_mean,
            Parameter::PostMean => self.post_mean,
            Parameter::Sigma => self.sigma,
        }
    }

    /// Smallest value across parameters.
    #[must_use]
    pub fn min(&self) -> f64 {
        [self.change_index, self.pre_mean, self.post_mean, self.sigma]
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }
}

/// Diagnostics of a single chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainDiagnostics {
    pub chain: usize,
    pub seed: u64,
    pub iterations_completed: usize,
    pub retained_draws: usize,
    pub acceptance_rates: AcceptanceRates,
    pub divergences: usize,
    /// Final `log(sigma)` proposal scale after warm-up adaptation.
    pub log_sigma_draw_scale: f64,
    pub effective_sample_size: EffectiveSampleSizes,
}

/// Multi-chain split-R-hat diagnostics summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceSummary {
    /// Number of chains included.
    pub chain_count: usize,
    /// Draws per chain used after truncation to an even length.
    pub draws_per_chain_used: usize,
    pub change_index_split_rhat: Option<f64>,
    pub pre_mean_split_rhat: Option<f64>,
    pub post_mean_split_rhat: Option<f64>,
    pub sigma_split_rhat: Option<f64>,
    /// Maximum split-R-hat across all tracked parameters.
    pub max_split_rhat: Option<f64>,
}

/// Output report of one sampling run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerReport {
    /// Chain-specific diagnostics in execution order.
    pub chains: Vec<ChainDiagnostics>,
    pub convergence: ConvergenceSummary,
}

impl SamplerReport {
    #[must_use]
    pub fn total_divergences(&self) -> usize {
        self.chains.iter().map(|chain| chain.divergences).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(ProposalTuning::default().is_valid());
        assert!(StabilityThresholds::default().is_valid());
    }

    #[test]
    fn validate_rejects_invalid_prior() {
        let config = AnalysisConfig {
            priors: PriorConfig {
                mean_scale: 0.0,
                ..PriorConfig::default()
            },
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ChangePointError::InvalidPriorConfig)
        ));
    }

    #[test]
    fn validate_rejects_zero_random_walk_step() {
        let config = AnalysisConfig {
            proposals: ProposalTuning {
                change_index_update: ChangeIndexUpdate::RandomWalk { max_step: 0 },
                ..ProposalTuning::default()
            },
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ChangePointError::InvalidProposalTuning)
        ));
    }

    #[test]
    fn validate_rejects_credible_mass_outside_unit_interval() {
        for mass in [0.0, 1.0, -0.5, f64::NAN] {
            let config = AnalysisConfig {
                credible_mass: mass,
                ..AnalysisConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ChangePointError::InvalidCredibleMass { .. })
            ));
        }
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let config = AnalysisConfig::from_json(
            r#"{
                "sampler": { "draws": 500, "chains": 2 },
                "proposals": { "change_index_update": { "kind": "random_walk", "max_step": 3 } },
                "credible_mass": 0.9
            }"#,
        )
        .expect("partial document should parse");
        assert_eq!(config.sampler.draws, 500);
        assert_eq!(config.sampler.chains, 2);
        assert_eq!(config.sampler.tune, SamplerConfig::default().tune);
        assert_eq!(
            config.proposals.change_index_update,
            ChangeIndexUpdate::RandomWalk { max_step: 3 }
        );
        assert!((config.priors.mean_scale - 10.0).abs() < 1e-12);
        assert!((config.credible_mass - 0.9).abs() < 1e-12);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            AnalysisConfig::from_json("{ not json"),
            Err(ChangePointError::InvalidConfig(_))
        ));
    }

    #[test]
    fn json_values_still_validated() {
        assert!(matches!(
            AnalysisConfig::from_json(r#"{ "sampler": { "draws": 0 } }"#),
            Err(ChangePointError::InvalidSchedule(InferenceError::InvalidDraws))
        ));
    }

    #[test]
    fn parameter_columns_follow_declaration_order() {
        for (column, parameter) in Parameter::ALL.iter().enumerate() {
            assert_eq!(parameter.column(), column);
        }
        assert_eq!(Parameter::Sigma.to_string(), "sigma");
    }
}
