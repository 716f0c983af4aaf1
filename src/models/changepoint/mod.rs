//! Bayesian single change-point model for daily price series.
//!
//! The model places a discrete uniform prior on the change index `tau`,
//! normal priors centred on the series mean for the two regime means and a
//! half-normal prior on the shared noise scale. Sampling integrates the
//! means out when moving `tau`, so the discrete index is updated directly
//! rather than through gradient-based proposals.

pub mod diagnostics;
pub mod model;
pub mod posterior;
pub mod priors;
pub mod sampler;
pub mod summary;
pub mod types;
pub mod workflow;

pub use diagnostics::{
    autocorrelation, check_chain_stability, draw_effective_sample_sizes, effective_sample_size,
    parameter_correlation, split_rhat, summarize_convergence,
};
pub use model::{ChangePointModel, ChangePointParameters, ConditionalNormal, Regime, segment};
pub use posterior::{ParameterSummary, PosteriorSamples, summarize_parameters};
pub use priors::PriorConfig;
pub use sampler::{sample_posterior, sample_posterior_with_cancellation};
pub use summary::{
    ChangeIndexPosterior, ChangePointSummary, highest_density_interval, percentage_change,
    summarize_change_point,
};
pub use types::{
    AcceptanceRates, AnalysisConfig, ChainDiagnostics, ChangeIndexUpdate, ChangePointError,
    ConvergenceSummary, EffectiveSampleSizes, InstabilityError, Parameter, ProposalTuning,
    SamplerReport, StabilityThresholds,
};
pub use workflow::{
    AnalysisHandle, ChangePointAnalysis, analyze_change_point,
    analyze_change_point_with_cancellation, spawn_analysis,
};
