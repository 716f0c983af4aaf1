#![forbid(unsafe_code)]

//! # `changepoint_models`
//!
//! Bayesian single change-point detection for daily price series. The model
//! assumes the series has one mean level before an unknown index `tau` and
//! another from `tau` onward, with a shared noise scale, and reports where the
//! level shifted together with credible intervals for both regime means.
//!
//! Inputs are validated [`ObservationSeries`]; loaders for mixed-format price
//! exports and event catalogues live in [`input::loader`]. Results can be
//! rendered as text tables or persisted as a flat record via [`report`].

pub mod inference;
pub mod input;
pub mod models;
pub mod preprocess;
pub mod report;
pub mod utils;

pub use inference::{CancellationToken, InferenceError, ProposalStats, SamplerConfig};
pub use input::loader::{
    LoadError, LoadedSeries, load_event_catalogue, load_event_catalogue_or_empty,
    load_price_series, parse_date, read_event_catalogue, read_price_series,
};
pub use input::{CalendarEvent, EventCatalogue, InputError, Observation, ObservationSeries};
pub use preprocess::{SeriesDiagnostics, daily_returns, series_diagnostics, series_has_variation};

pub use models::changepoint::{
    AcceptanceRates, AnalysisConfig, AnalysisHandle, ChainDiagnostics, ChangeIndexPosterior,
    ChangeIndexUpdate, ChangePointAnalysis, ChangePointError, ChangePointModel,
    ChangePointParameters, ChangePointSummary, ConvergenceSummary, EffectiveSampleSizes,
    InstabilityError, Parameter, ParameterSummary, PosteriorSamples, PriorConfig,
    ProposalTuning, Regime, SamplerReport, StabilityThresholds, analyze_change_point,
    analyze_change_point_with_cancellation, highest_density_interval, parameter_correlation,
    percentage_change, sample_posterior, sample_posterior_with_cancellation, spawn_analysis,
    summarize_change_point, summarize_convergence, summarize_parameters,
};

pub use report::{
    AnalysisTables, ChangePointRecord, RecordError, SeriesIndicators, change_point_payload,
    load_summary_record, load_summary_record_or_default, render_analysis_tables,
    render_change_index_table, save_summary_record,
};
