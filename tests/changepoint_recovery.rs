use chrono::NaiveDate;
use changepoint_models::{
    AnalysisConfig, ChangeIndexPosterior, ChangePointError, ChangePointModel, ObservationSeries,
    SamplerConfig, analyze_change_point, sample_posterior, spawn_analysis,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 1, 3).expect("valid date")
}

fn noisy_step(n: usize, k: usize, before: f64, after: f64, seed: u64) -> ObservationSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let values = (0..n)
        .map(|i| {
            let level = if i < k { before } else { after };
            level + sample_standard_normal(&mut rng)
        })
        .collect();
    ObservationSeries::daily(start(), values).expect("series should build")
}

fn config(draws: usize, tune: usize, chains: usize) -> AnalysisConfig {
    AnalysisConfig {
        sampler: SamplerConfig {
            draws,
            tune,
            chains,
            ..SamplerConfig::default()
        },
        ..AnalysisConfig::default()
    }
}

#[test]
fn noisy_step_is_recovered() {
    let series = noisy_step(200, 100, 20.0, 70.0, 2_005);
    let analysis = analyze_change_point(&series, &config(1_000, 1_000, 4)).expect("analysis runs");
    let summary = analysis.summary;

    assert!(summary.change_index.abs_diff(100) <= 3, "tau = {}", summary.change_index);
    assert!((summary.pre_mean - 20.0).abs() < 3.0, "pre = {}", summary.pre_mean);
    assert!((summary.post_mean - 70.0).abs() < 3.0, "post = {}", summary.post_mean);
    assert!(summary.pre_mean_interval.0 <= summary.pre_mean);
    assert!(summary.pre_mean <= summary.pre_mean_interval.1);
    assert!(summary.post_mean_interval.0 <= summary.post_mean);
    assert!(summary.post_mean <= summary.post_mean_interval.1);

    let max_rhat = analysis
        .report
        .convergence
        .max_split_rhat
        .expect("four chains give split-R-hat");
    assert!(max_rhat < 1.1, "max split-R-hat = {max_rhat}");
    assert_eq!(analysis.report.total_divergences(), 0);
}

/// Indices within this distance of either end hold one-point (or empty)
/// segments whose integrated weights absorb the outlying noise draws.
const EDGE_BAND: usize = 20;

#[test]
fn flat_noisy_series_has_diffuse_interior_change_index() {
    let series = noisy_step(200, 200, 50.0, 50.0, 50);
    let analysis =
        analyze_change_point(&series, &AnalysisConfig::default()).expect("analysis runs");

    let posterior =
        ChangeIndexPosterior::from_indices(&analysis.samples.change_indices(), series.len())
            .expect("posterior builds");
    let (busiest, frequency) = (EDGE_BAND..series.len() - EDGE_BAND)
        .map(|index| (index, posterior.probability(index)))
        .fold((EDGE_BAND, 0.0), |best, candidate| {
            if candidate.1 > best.1 { candidate } else { best }
        });
    assert!(frequency < 0.10, "interior index {busiest} holds {frequency:.3} of draws");

    let visited = (EDGE_BAND..series.len() - EDGE_BAND)
        .filter(|index| posterior.counts()[*index] > 0)
        .count();
    assert!(visited >= 40, "only {visited} interior indices visited");
}

#[test]
fn level_series_with_alternating_deviations_has_diffuse_change_index() {
    let values = (0..200)
        .map(|i| if i % 2 == 0 { 55.0 } else { 45.0 })
        .collect();
    let series = ObservationSeries::daily(start(), values).expect("series should build");
    let analysis = analyze_change_point(&series, &config(1_000, 1_000, 4)).expect("analysis runs");

    let posterior =
        ChangeIndexPosterior::from_indices(&analysis.samples.change_indices(), series.len())
            .expect("posterior builds");
    assert!(
        posterior.mode_frequency() < 0.10,
        "mode {} holds {:.3} of draws",
        posterior.mode(),
        posterior.mode_frequency()
    );
}

#[test]
fn fixed_seed_reproduces_samples() {
    let series = noisy_step(80, 30, 40.0, 35.0, 7);
    let config = config(300, 300, 3);
    let model = ChangePointModel::new(&series, config.priors).expect("model builds");

    let (first, _) = sample_posterior(&model, &config).expect("first run");
    let (second, _) = sample_posterior(&model, &config).expect("second run");
    assert_eq!(first, second);

    let mut reseeded = config;
    reseeded.sampler.seed += 1;
    let (third, _) = sample_posterior(&model, &reseeded).expect("reseeded run");
    assert_ne!(first, third);
}

#[test]
fn two_observations_do_not_crash() {
    let series = ObservationSeries::daily(start(), vec![10.0, 12.0]).expect("series builds");
    let analysis =
        analyze_change_point(&series, &AnalysisConfig::default()).expect("analysis runs");

    assert!(analysis.samples.iter().all(|draw| draw.tau < 2));
    let posterior = ChangeIndexPosterior::from_indices(&analysis.samples.change_indices(), 2)
        .expect("posterior builds");
    assert!(posterior.counts().iter().all(|count| *count > 0), "{:?}", posterior.counts());
    assert!(analysis.summary.change_index < 2);
    assert!(analysis.summary.pre_mean.is_finite());
    assert!(analysis.summary.post_mean.is_finite());
}

#[test]
fn noise_free_step_end_to_end() {
    let values = (0..100)
        .map(|i| if i < 50 { 20.0 } else { 80.0 })
        .collect();
    let series = ObservationSeries::daily(start(), values).expect("series builds");
    let analysis = analyze_change_point(&series, &AnalysisConfig::default()).expect("analysis runs");
    let summary = analysis.summary;

    assert!(summary.change_index == 49 || summary.change_index == 50);
    assert_eq!(summary.change_date, series.timestamp(summary.change_index).expect("in range"));
    assert!((summary.pre_mean - 20.0).abs() < 1e-3);
    assert!((summary.post_mean - 80.0).abs() < 1e-3);

    let (low, high) = summary.pre_mean_interval;
    assert!(low <= 20.0 + 1e-3 && high >= 20.0 - 1e-3);
    assert!(high - low < 1e-2, "interval [{low}, {high}] is not tight");
}

#[test]
fn background_analysis_can_be_cancelled() {
    let series = noisy_step(200, 120, 60.0, 30.0, 11);
    let handle = spawn_analysis(series, config(200_000, 1_000, 2));
    handle.cancel();
    assert!(matches!(handle.join(), Err(ChangePointError::Cancelled)));
}

#[test]
fn invalid_configuration_is_rejected_before_sampling() {
    let series = noisy_step(20, 10, 1.0, 2.0, 3);
    let error = AnalysisConfig::from_json(r#"{"sampler": {"draws": 0}}"#)
        .expect_err("zero draws are invalid");
    assert!(matches!(error, ChangePointError::InvalidSchedule(_)));

    let mut config = AnalysisConfig::default();
    config.priors.sigma_floor = -1.0;
    assert!(matches!(
        analyze_change_point(&series, &config),
        Err(ChangePointError::InvalidPriorConfig)
    ));
}
