//! Convergence and stability diagnostics for change-point chains.

use faer::Mat;

use super::model::ChangePointParameters;
use super::posterior::{PosteriorSamples, parameter_value};
use super::types::{
    ChainDiagnostics, ConvergenceSummary, EffectiveSampleSizes, InstabilityError, Parameter,
    StabilityThresholds,
};
use crate::utils::{mean, sample_variance, usize_to_f64};

/// Sample autocorrelation at `lag`.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.is_empty() || lag >= series.len() {
        return 0.0;
    }
    let center = mean(series);
    let denominator: f64 = series.iter().map(|value| (value - center).powi(2)).sum();
    if denominator <= 0.0 {
        return 0.0;
    }
    lagged_covariance(series, center, lag) / denominator
}

fn lagged_covariance(series: &[f64], center: f64, lag: usize) -> f64 {
    series
        .iter()
        .zip(&series[lag..])
        .map(|(a, b)| (a - center) * (b - center))
        .sum()
}

/// Heuristic effective sample size using positive autocorrelation truncation.
///
/// A constant series counts as fully independent.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return usize_to_f64(n);
    }

    let center = mean(series);
    let denominator: f64 = series.iter().map(|value| (value - center).powi(2)).sum();
    if denominator <= 0.0 {
        return usize_to_f64(n);
    }

    let mut rho_sum = 0.0;
    for lag in 1..n {
        let rho = lagged_covariance(series, center, lag) / denominator;
        if rho <= 0.0 {
            break;
        }
        rho_sum += rho;
    }

    usize_to_f64(n) / (2.0f64.mul_add(rho_sum, 1.0)).max(1.0)
}

/// Per-parameter effective sample sizes of one chain's draws.
#[must_use]
pub fn draw_effective_sample_sizes(draws: &[ChangePointParameters]) -> EffectiveSampleSizes {
    let ess = |parameter| {
        let values: Vec<f64> = draws
            .iter()
            .map(|draw| parameter_value(draw, parameter))
            .collect();
        effective_sample_size(&values)
    };
    EffectiveSampleSizes {
        change_index: ess(Parameter::ChangeIndex),
        pre_mean: ess(Parameter::PreMean),
        post_mean: ess(Parameter::PostMean),
        sigma: ess(Parameter::Sigma),
    }
}

/// Split-R-hat over equal-length chains, or `None` with fewer than two
/// chains or four draws per chain.
///
/// Chains are truncated to an even length and each half treated as its own
/// chain.
#[must_use]
pub fn split_rhat(chains: &[Vec<f64>]) -> Option<f64> {
    if chains.len() < 2 {
        return None;
    }
    let min_draws = chains.iter().map(Vec::len).min().unwrap_or(0);
    let used = min_draws - min_draws % 2;
    if used < 4 {
        return None;
    }

    let half = used / 2;
    let split_chains: Vec<&[f64]> = chains
        .iter()
        .flat_map(|chain| [&chain[..half], &chain[half..used]])
        .collect();
    Some(split_rhat_scalar(&split_chains))
}

fn split_rhat_scalar(chains: &[&[f64]]) -> f64 {
    let n = chains.first().map_or(0, |chain| chain.len());
    let m = chains.len();
    let chain_means: Vec<f64> = chains.iter().map(|chain| mean(chain)).collect();
    let within = chains
        .iter()
        .zip(&chain_means)
        .map(|(chain, center)| sample_variance(chain, *center))
        .sum::<f64>()
        / usize_to_f64(m);
    let mean_of_means = mean(&chain_means);
    let between = usize_to_f64(n)
        * chain_means
            .iter()
            .map(|center| (center - mean_of_means).powi(2))
            .sum::<f64>()
        / usize_to_f64(m - 1);

    if !(within.is_finite() && within > 0.0 && between.is_finite()) {
        return 1.0;
    }

    let n_f64 = usize_to_f64(n);
    let var_plus = ((n_f64 - 1.0) / n_f64).mul_add(within, between / n_f64);
    if !var_plus.is_finite() || var_plus <= 0.0 {
        return 1.0;
    }
    (var_plus / within).sqrt().max(1.0)
}

/// Split-R-hat for every parameter across the chains of `samples`.
#[must_use]
pub fn summarize_convergence(samples: &PosteriorSamples) -> ConvergenceSummary {
    let draws = samples.draws_per_chain();
    let rhat = |parameter| {
        let chains: Vec<Vec<f64>> = (0..samples.chain_count())
            .map(|chain| samples.chain_column(chain, parameter))
            .collect();
        split_rhat(&chains)
    };

    let change_index_split_rhat = rhat(Parameter::ChangeIndex);
    let pre_mean_split_rhat = rhat(Parameter::PreMean);
    let post_mean_split_rhat = rhat(Parameter::PostMean);
    let sigma_split_rhat = rhat(Parameter::Sigma);
    let max_split_rhat = [
        change_index_split_rhat,
        pre_mean_split_rhat,
        post_mean_split_rhat,
        sigma_split_rhat,
    ]
    .into_iter()
    .flatten()
    .reduce(f64::max);

    ConvergenceSummary {
        chain_count: samples.chain_count(),
        draws_per_chain_used: if max_split_rhat.is_some() {
            draws - draws % 2
        } else {
            0
        },
        change_index_split_rhat,
        pre_mean_split_rhat,
        post_mean_split_rhat,
        sigma_split_rhat,
        max_split_rhat,
    }
}

/// Check a finished chain against the stability thresholds.
///
/// Checks run in order: divergences, `log(sigma)` acceptance, then effective
/// sample size per parameter. The ESS floor is capped at the number of
/// retained draws so short runs are not rejected outright.
///
/// # Errors
///
/// Returns the first `InstabilityError` encountered.
pub fn check_chain_stability(
    diagnostics: &ChainDiagnostics,
    thresholds: StabilityThresholds,
) -> Result<(), InstabilityError> {
    if diagnostics.divergences > thresholds.max_divergences {
        return Err(InstabilityError::Divergence {
            chain: diagnostics.chain,
            iterations: diagnostics.iterations_completed,
            divergences: diagnostics.divergences,
            max_divergences: thresholds.max_divergences,
        });
    }

    let acceptance = diagnostics.acceptance_rates.sigma;
    if acceptance < thresholds.min_acceptance_rate {
        return Err(InstabilityError::AcceptanceCollapse {
            parameter: Parameter::Sigma,
            chain: diagnostics.chain,
            iterations: diagnostics.iterations_completed,
            acceptance,
            threshold: thresholds.min_acceptance_rate,
        });
    }

    let threshold = thresholds
        .min_effective_sample_size
        .min(usize_to_f64(diagnostics.retained_draws));
    for parameter in Parameter::ALL {
        let ess = diagnostics.effective_sample_size.get(parameter);
        if ess < threshold {
            return Err(InstabilityError::LowEffectiveSampleSize {
                parameter,
                chain: diagnostics.chain,
                iterations: diagnostics.iterations_completed,
                effective_sample_size: ess,
                threshold,
            });
        }
    }
    Ok(())
}

/// Pearson correlation matrix of the pooled draws, ordered as
/// [`Parameter::ALL`]. Constant columns correlate as zero off the diagonal.
#[must_use]
pub fn parameter_correlation(samples: &PosteriorSamples) -> Mat<f64> {
    let draws = samples.to_matrix();
    let k = draws.ncols();
    let n = draws.nrows();

    let columns: Vec<Vec<f64>> = (0..k)
        .map(|col| (0..n).map(|row| draws[(row, col)]).collect())
        .collect();
    let centers: Vec<f64> = columns.iter().map(|column| mean(column)).collect();
    let norms: Vec<f64> = columns
        .iter()
        .zip(&centers)
        .map(|(column, center)| {
            column
                .iter()
                .map(|value| (value - center).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .collect();

    Mat::from_fn(k, k, |i, j| {
        if i == j {
            return 1.0;
        }
        let denominator = norms[i] * norms[j];
        if denominator <= 0.0 {
            return 0.0;
        }
        columns[i]
            .iter()
            .zip(&columns[j])
            .map(|(a, b)| (a - centers[i]) * (b - centers[j]))
            .sum::<f64>()
            / denominator
    })
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    use super::*;
    use crate::models::changepoint::types::AcceptanceRates;

    fn healthy_chain() -> ChainDiagnostics {
        ChainDiagnostics {
            chain: 1,
            iterations_completed: 300,
            retained_draws: 200,
            acceptance_rates: AcceptanceRates {
                change_index: 0.8,
                sigma: 0.4,
            },
            effective_sample_size: EffectiveSampleSizes {
                change_index: 150.0,
                pre_mean: 180.0,
                post_mean: 170.0,
                sigma: 90.0,
            },
            ..ChainDiagnostics::default()
        }
    }

    #[test]
    fn autocorrelation_of_alternating_series_is_negative() {
        let series = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        assert!(autocorrelation(&series, 1) < 0.0);
        assert!(autocorrelation(&series, 2) > 0.0);
        assert!(autocorrelation(&series, 10).abs() < 1e-12);
    }

    #[test]
    fn effective_sample_size_of_independent_draws_is_large() {
        let mut rng = StdRng::seed_from_u64(11);
        let draws: Vec<f64> = (0..500).map(|_| rng.random::<f64>()).collect();
        assert!(effective_sample_size(&draws) > 250.0);
    }

    #[test]
    fn effective_sample_size_of_random_walk_is_small() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut level = 0.0;
        let draws: Vec<f64> = (0..500)
            .map(|_| {
                level += rng.random::<f64>() - 0.5;
                level
            })
            .collect();
        assert!(effective_sample_size(&draws) < 50.0);
    }

    #[test]
    fn draw_ess_treats_fixed_index_as_independent() {
        let mut rng = StdRng::seed_from_u64(13);
        let draws: Vec<ChangePointParameters> = (0..200)
            .map(|_| ChangePointParameters {
                tau: 7,
                mu_pre: rng.random::<f64>(),
                mu_post: rng.random::<f64>(),
                sigma: 1.0 + rng.random::<f64>(),
            })
            .collect();
        let ess = draw_effective_sample_sizes(&draws);
        assert!((ess.change_index - 200.0).abs() < 1e-12);
        assert!(ess.min() > 100.0);
    }

    #[test]
    fn constant_series_is_fully_effective() {
        assert!((effective_sample_size(&[3.0; 40]) - 40.0).abs() < 1e-12);
    }

    #[test]
    fn split_rhat_flags_disagreeing_chains() {
        let agree = vec![
            vec![0.1, -0.2, 0.3, -0.1, 0.2, 0.0],
            vec![-0.1, 0.2, -0.3, 0.1, 0.0, -0.2],
        ];
        let disagree = vec![
            vec![0.1, -0.2, 0.3, -0.1, 0.2, 0.0],
            vec![9.9, 10.2, 9.7, 10.1, 10.0, 9.8],
        ];
        let agreeing = split_rhat(&agree).expect("enough draws");
        let disagreeing = split_rhat(&disagree).expect("enough draws");
        assert!(agreeing < 1.5);
        assert!(disagreeing > 2.0);
        assert!(split_rhat(&agree[..1]).is_none());
    }

    #[test]
    fn stability_check_order_reports_divergence_first() {
        let mut chain = healthy_chain();
        assert!(check_chain_stability(&chain, StabilityThresholds::default()).is_ok());

        chain.divergences = 2;
        chain.acceptance_rates.sigma = 0.0;
        assert!(matches!(
            check_chain_stability(&chain, StabilityThresholds::default()),
            Err(InstabilityError::Divergence { divergences: 2, .. })
        ));

        chain.divergences = 0;
        assert!(matches!(
            check_chain_stability(&chain, StabilityThresholds::default()),
            Err(InstabilityError::AcceptanceCollapse {
                parameter: Parameter::Sigma,
                ..
            })
        ));
    }

    #[test]
    fn stability_check_reports_low_ess_parameter() {
        let mut chain = healthy_chain();
        chain.effective_sample_size.post_mean = 2.0;
        let error = check_chain_stability(&chain, StabilityThresholds::default())
            .expect_err("low ESS should fail");
        assert!(matches!(
            error,
            InstabilityError::LowEffectiveSampleSize {
                parameter: Parameter::PostMean,
                chain: 1,
                ..
            }
        ));
        assert_eq!(error.chain(), 1);
    }

    #[test]
    fn ess_floor_is_capped_by_retained_draws() {
        let mut chain = healthy_chain();
        chain.retained_draws = 5;
        chain.effective_sample_size = EffectiveSampleSizes {
            change_index: 5.0,
            pre_mean: 5.0,
            post_mean: 5.0,
            sigma: 5.0,
        };
        assert!(check_chain_stability(&chain, StabilityThresholds::default()).is_ok());
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let draws = (0..6)
            .map(|i| {
                let x = f64::from(i);
                ChangePointParameters {
                    tau: 3,
                    mu_pre: x,
                    mu_post: -2.0 * x,
                    sigma: 1.0 + x * x,
                }
            })
            .collect();
        let samples = PosteriorSamples::from_chains(vec![draws]).expect("samples");
        let correlation = parameter_correlation(&samples);
        assert_eq!(correlation.nrows(), 4);
        assert!((correlation[(1, 1)] - 1.0).abs() < 1e-12);
        assert!((correlation[(1, 2)] + 1.0).abs() < 1e-12);
        assert!((correlation[(1, 2)] - correlation[(2, 1)]).abs() < 1e-12);
        assert!(correlation[(0, 1)].abs() < 1e-12);
    }
}
