//! End-to-end analysis: validate, build the model, sample, summarize.
//!
//! [`spawn_analysis`] runs the same pipeline on a worker thread so an
//! interactive caller can poll or cancel it.

use std::thread::JoinHandle;

use tracing::{info, warn};

use super::model::ChangePointModel;
use super::posterior::PosteriorSamples;
use super::sampler::sample_posterior_with_cancellation;
use super::summary::{ChangePointSummary, summarize_change_point};
use super::types::{AnalysisConfig, ChangePointError, SamplerReport};
use crate::inference::CancellationToken;
use crate::input::ObservationSeries;
use crate::preprocess::{DEFAULT_VARIATION_TOLERANCE, series_has_variation};

/// Result of a completed analysis.
#[derive(Debug, Clone)]
pub struct ChangePointAnalysis {
    pub summary: ChangePointSummary,
    pub samples: PosteriorSamples,
    pub report: SamplerReport,
}

/// Run a full change-point analysis.
///
/// # Errors
///
/// Returns `ChangePointError` for invalid input or configuration, numerical
/// instability, or a failed summary.
pub fn analyze_change_point(
    series: &ObservationSeries,
    config: &AnalysisConfig,
) -> Result<ChangePointAnalysis, ChangePointError> {
    analyze_change_point_with_cancellation(series, config, &CancellationToken::new())
}

/// [`analyze_change_point`] with a cancellation hook.
///
/// # Errors
///
/// Returns `ChangePointError::Cancelled` if `cancel` fires before sampling
/// completes, plus the errors of [`analyze_change_point`].
pub fn analyze_change_point_with_cancellation(
    series: &ObservationSeries,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<ChangePointAnalysis, ChangePointError> {
    config.validate()?;
    series.validate()?;
    if !series_has_variation(series, DEFAULT_VARIATION_TOLERANCE) {
        warn!(
            observations = series.len(),
            "series has no variation; the change index will be poorly identified"
        );
    }

    info!(
        observations = series.len(),
        chains = config.sampler.chains,
        draws = config.sampler.draws,
        tune = config.sampler.tune,
        seed = config.sampler.seed,
        "starting change-point analysis"
    );

    let model = ChangePointModel::new(series, config.priors)?;
    let (samples, report) = sample_posterior_with_cancellation(&model, config, cancel)?;
    let summary = summarize_change_point(&samples, series, config.credible_mass)?;

    info!(
        change_index = summary.change_index,
        change_date = %summary.change_date,
        pre_mean = summary.pre_mean,
        post_mean = summary.post_mean,
        max_split_rhat = report.convergence.max_split_rhat,
        "change-point analysis finished"
    );

    Ok(ChangePointAnalysis {
        summary,
        samples,
        report,
    })
}

/// Handle to an analysis running on a worker thread.
#[derive(Debug)]
pub struct AnalysisHandle {
    cancel: CancellationToken,
    worker: JoinHandle<Result<ChangePointAnalysis, ChangePointError>>,
}

impl AnalysisHandle {
    /// Ask the worker to stop at its next iteration boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the worker finishes.
    ///
    /// # Errors
    ///
    /// Returns the analysis error, `Cancelled` after [`AnalysisHandle::cancel`],
    /// or `WorkerPanicked` if the worker thread panicked.
    pub fn join(self) -> Result<ChangePointAnalysis, ChangePointError> {
        self.worker
            .join()
            .map_err(|_| ChangePointError::WorkerPanicked)?
    }
}

/// Start [`analyze_change_point`] on a background thread.
#[must_use]
pub fn spawn_analysis(series: ObservationSeries, config: AnalysisConfig) -> AnalysisHandle {
    let cancel = CancellationToken::new();
    let worker_token = cancel.clone();
    let worker = std::thread::spawn(move || {
        analyze_change_point_with_cancellation(&series, &config, &worker_token)
    });
    AnalysisHandle { cancel, worker }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::inference::SamplerConfig;

    fn step_series() -> ObservationSeries {
        let start = NaiveDate::from_ymd_opt(2019, 6, 1).expect("valid date");
        let values = (0..40)
            .map(|i| {
                let wiggle = if i % 3 == 0 { 0.2 } else { -0.1 };
                if i < 15 { 5.0 + wiggle } else { 9.0 + wiggle }
            })
            .collect();
        ObservationSeries::daily(start, values).expect("series should build")
    }

    fn quick_config() -> AnalysisConfig {
        AnalysisConfig {
            sampler: SamplerConfig {
                draws: 300,
                tune: 300,
                chains: 2,
                ..SamplerConfig::default()
            },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn analysis_reports_change_date() {
        let analysis = analyze_change_point(&step_series(), &quick_config()).expect("analysis runs");
        assert_eq!(analysis.summary.change_index, 15);
        assert_eq!(
            analysis.summary.change_date,
            NaiveDate::from_ymd_opt(2019, 6, 16).expect("valid date")
        );
        assert_eq!(analysis.samples.len(), 600);
        assert_eq!(analysis.report.chains.len(), 2);
    }

    #[test]
    fn invalid_config_fails_before_sampling() {
        let mut config = quick_config();
        config.credible_mass = 1.5;
        assert!(matches!(
            analyze_change_point(&step_series(), &config),
            Err(ChangePointError::InvalidCredibleMass { .. })
        ));
    }

    #[test]
    fn spawned_analysis_joins_with_result() {
        let handle = spawn_analysis(step_series(), quick_config());
        let analysis = handle.join().expect("background analysis runs");
        assert_eq!(analysis.summary.change_index, 15);
    }
}
