//! Posterior Sampler: collapsed Metropolis-within-Gibbs for the change-point
//! model.
//!
//! Each iteration updates, in order:
//! 1. `tau` given `sigma`, with both regime means integrated out (exact draw
//!    or index random walk, see [`ChangeIndexUpdate`]);
//! 2. `mu_pre` and `mu_post` exactly from their normal conditionals;
//! 3. `sigma` by a random walk on `log(sigma)`, adapted during warm-up.
//!
//! Chains run on scoped threads with seeds `seed + i * seed_stride` and are
//! concatenated in chain order. Cancellation is checked every iteration and
//! discards all draws.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing::debug;

use super::diagnostics::{check_chain_stability, draw_effective_sample_sizes, summarize_convergence};
use super::model::{ChangePointModel, ChangePointParameters, ConditionalNormal, Regime};
use super::posterior::PosteriorSamples;
use super::types::{
    AcceptanceRates, AnalysisConfig, ChainDiagnostics, ChangeIndexUpdate, ChangePointError,
    InstabilityError, Parameter, ProposalTuning, SamplerReport,
};
use crate::inference::{CancellationToken, ProposalStats, sample_standard_normal, should_accept};

struct ChainRequest<'a> {
    model: &'a ChangePointModel,
    config: &'a AnalysisConfig,
    chain: usize,
    seed: u64,
    cancel: &'a CancellationToken,
}

struct ChainOutput {
    draws: Vec<ChangePointParameters>,
    diagnostics: ChainDiagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigmaMove {
    Accepted,
    Rejected,
    Diverged,
}

/// Draw a Posterior Sample Set for `model`.
///
/// # Errors
///
/// Returns `ChangePointError` if the configuration is invalid or a chain
/// fails its stability checks.
pub fn sample_posterior(
    model: &ChangePointModel,
    config: &AnalysisConfig,
) -> Result<(PosteriorSamples, SamplerReport), ChangePointError> {
    sample_posterior_with_cancellation(model, config, &CancellationToken::new())
}

/// [`sample_posterior`] with a cooperative cancellation hook.
///
/// # Errors
///
/// Returns `ChangePointError::Cancelled` if `cancel` fires before every chain
/// finishes, plus the errors of [`sample_posterior`].
pub fn sample_posterior_with_cancellation(
    model: &ChangePointModel,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<(PosteriorSamples, SamplerReport), ChangePointError> {
    config.validate()?;
    let chains = config.sampler.chains;

    let results = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..chains)
            .map(|chain| {
                let request = ChainRequest {
                    model,
                    config,
                    chain,
                    seed: config.sampler.chain_seed(chain),
                    cancel,
                };
                scope.spawn(move || run_chain(&request))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| ChangePointError::WorkerPanicked))
            .collect::<Vec<_>>()
    });

    if cancel.is_cancelled() {
        return Err(ChangePointError::Cancelled);
    }

    let mut chain_draws = Vec::with_capacity(chains);
    let mut chain_diagnostics = Vec::with_capacity(chains);
    for result in results {
        let output = result??;
        chain_draws.push(output.draws);
        chain_diagnostics.push(output.diagnostics);
    }

    let samples = PosteriorSamples::from_chains(chain_draws)?;
    let convergence = summarize_convergence(&samples);
    Ok((
        samples,
        SamplerReport {
            chains: chain_diagnostics,
            convergence,
        },
    ))
}

fn run_chain(request: &ChainRequest<'_>) -> Result<ChainOutput, ChangePointError> {
    let ChainRequest {
        model,
        config,
        chain,
        seed,
        cancel,
    } = *request;
    let schedule = config.sampler;
    let tuning = config.proposals;
    let iterations = schedule.iterations_per_chain();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = initial_state(model, &mut rng);
    let mut log_sigma_scale = tuning.log_sigma_draw_scale;
    let mut weights = Vec::with_capacity(model.len());
    let mut index_stats = ProposalStats::default();
    let mut sigma_window = ProposalStats::default();
    let mut sigma_retained = ProposalStats::default();
    let mut divergences = 0usize;
    let mut draws = Vec::with_capacity(schedule.draws);

    for iter in 0..iterations {
        if cancel.is_cancelled() {
            return Err(ChangePointError::Cancelled);
        }

        let index_move = match tuning.change_index_update {
            ChangeIndexUpdate::Marginal => {
                update_change_index_marginal(model, &mut state, &mut weights, &mut rng)
            }
            ChangeIndexUpdate::RandomWalk { max_step } => {
                update_change_index_random_walk(model, &mut state, max_step, &mut rng)
            }
        };
        match index_move {
            Some(moved) => index_stats.record(moved),
            None => divergences += 1,
        }

        update_regime_means(model, &mut state, &mut rng);

        let sigma_move = update_sigma_block(model, &mut state, log_sigma_scale, &mut rng);
        if sigma_move == SigmaMove::Diverged {
            divergences += 1;
        }
        let accepted = sigma_move == SigmaMove::Accepted;
        if iter < schedule.tune {
            sigma_window.record(accepted);
            if (iter + 1).is_multiple_of(tuning.adaptation_interval) {
                log_sigma_scale = adapt_scalar_scale(
                    log_sigma_scale,
                    sigma_window.acceptance_rate(),
                    schedule.target_acceptance,
                    tuning,
                );
                sigma_window.reset();
            }
        } else {
            sigma_retained.record(accepted);
        }

        if let Some(parameter) = first_non_finite(&state) {
            return Err(InstabilityError::NonFiniteDraw {
                parameter,
                chain,
                iteration: iter,
            }
            .into());
        }

        if iter >= schedule.tune && (iter - schedule.tune).is_multiple_of(schedule.thin) {
            draws.push(state);
        }
    }

    let diagnostics = ChainDiagnostics {
        chain,
        seed,
        iterations_completed: iterations,
        retained_draws: draws.len(),
        acceptance_rates: AcceptanceRates {
            change_index: index_stats.acceptance_rate(),
            sigma: sigma_retained.acceptance_rate(),
        },
        divergences,
        log_sigma_draw_scale: log_sigma_scale,
        effective_sample_size: draw_effective_sample_sizes(&draws),
    };
    debug!(
        chain,
        seed,
        sigma_acceptance = diagnostics.acceptance_rates.sigma,
        change_index_rate = diagnostics.acceptance_rates.change_index,
        divergences,
        min_ess = diagnostics.effective_sample_size.min(),
        "change-point chain finished"
    );

    check_chain_stability(&diagnostics, config.stability)?;
    Ok(ChainOutput { draws, diagnostics })
}

fn initial_state(model: &ChangePointModel, rng: &mut StdRng) -> ChangePointParameters {
    let priors = model.priors();
    let tau = rng.random_range(0..model.len());
    let sigma = model.sample_std_dev().max(priors.sigma_floor);
    let mut state = ChangePointParameters {
        tau,
        mu_pre: model.prior_mean(),
        mu_post: model.prior_mean(),
        sigma,
    };
    update_regime_means(model, &mut state, rng);
    state
}

/// Exact draw of `tau` from its mean-integrated conditional. Returns whether
/// the index moved, or `None` if the weights are not finite.
fn update_change_index_marginal(
    model: &ChangePointModel,
    state: &mut ChangePointParameters,
    weights: &mut Vec<f64>,
    rng: &mut StdRng,
) -> Option<bool> {
    model.change_index_log_weights(state.sigma, weights);
    let next = sample_log_categorical(weights, rng)?;
    let moved = next != state.tau;
    state.tau = next;
    Some(moved)
}

/// Metropolis step of at most `max_step` indices. Out-of-range proposals are
/// rejected.
fn update_change_index_random_walk(
    model: &ChangePointModel,
    state: &mut ChangePointParameters,
    max_step: usize,
    rng: &mut StdRng,
) -> Option<bool> {
    let magnitude = rng.random_range(1..=max_step);
    let proposed = if rng.random::<bool>() {
        state.tau.checked_add(magnitude)
    } else {
        state.tau.checked_sub(magnitude)
    };
    let Some(proposed) = proposed.filter(|tau| *tau < model.len()) else {
        return Some(false);
    };

    let current = model.change_index_log_weight(state.tau, state.sigma);
    let candidate = model.change_index_log_weight(proposed, state.sigma);
    let log_acceptance = candidate - current;
    if log_acceptance.is_nan() || candidate == f64::INFINITY {
        return None;
    }
    let accepted = should_accept(log_acceptance, rng);
    if accepted {
        state.tau = proposed;
    }
    Some(accepted)
}

fn update_regime_means(model: &ChangePointModel, state: &mut ChangePointParameters, rng: &mut StdRng) {
    state.mu_pre = draw_normal(model.mean_conditional(Regime::Pre, state.tau, state.sigma), rng);
    state.mu_post = draw_normal(model.mean_conditional(Regime::Post, state.tau, state.sigma), rng);
}

fn draw_normal(conditional: ConditionalNormal, rng: &mut StdRng) -> f64 {
    conditional
        .std_dev
        .mul_add(sample_standard_normal(rng), conditional.mean)
}

fn update_sigma_block(
    model: &ChangePointModel,
    state: &mut ChangePointParameters,
    scale: f64,
    rng: &mut StdRng,
) -> SigmaMove {
    let rss = model.residual_sum_of_squares(state);
    let previous = state.sigma;
    let proposed = scale.mul_add(sample_standard_normal(rng), previous.ln()).exp();

    let current_target = model.log_sigma_conditional(rss, previous);
    let candidate_target = model.log_sigma_conditional(rss, proposed);
    if candidate_target.is_nan() || candidate_target == f64::INFINITY {
        return SigmaMove::Diverged;
    }

    let log_acceptance = candidate_target + proposed.ln() - (current_target + previous.ln());
    if should_accept(log_acceptance, rng) {
        state.sigma = proposed;
        SigmaMove::Accepted
    } else {
        SigmaMove::Rejected
    }
}

/// Sample an index with probability proportional to `exp(log_weights[i])`.
fn sample_log_categorical(log_weights: &[f64], rng: &mut StdRng) -> Option<usize> {
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || log_weights.iter().any(|weight| weight.is_nan()) {
        return None;
    }

    let total: f64 = log_weights.iter().map(|weight| (weight - max).exp()).sum();
    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (index, weight) in log_weights.iter().enumerate() {
        cumulative += (weight - max).exp();
        if target < cumulative {
            return Some(index);
        }
    }
    log_weights.iter().rposition(|weight| *weight > f64::NEG_INFINITY)
}

fn first_non_finite(state: &ChangePointParameters) -> Option<Parameter> {
    if !state.mu_pre.is_finite() {
        Some(Parameter::PreMean)
    } else if !state.mu_post.is_finite() {
        Some(Parameter::PostMean)
    } else if !(state.sigma.is_finite() && state.sigma > 0.0) {
        Some(Parameter::Sigma)
    } else {
        None
    }
}

fn adapt_scalar_scale(scale: f64, acceptance: f64, target: f64, tuning: ProposalTuning) -> f64 {
    (scale * adaptation_factor(acceptance, target, tuning)).max(tuning.min_draw_scale)
}

fn adaptation_factor(acceptance: f64, target: f64, tuning: ProposalTuning) -> f64 {
    if acceptance < target - tuning.acceptance_tolerance {
        tuning.scale_decrease_factor
    } else if acceptance > target + tuning.acceptance_tolerance {
        tuning.scale_increase_factor
    } else {
        1.0
    }
}
