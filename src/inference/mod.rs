//! Reusable inference and MCMC utility types.
//!
//! The run schedule, acceptance counters and cancellation token defined here
//! are model-agnostic; the change-point sampler threads them through every
//! chain it runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::RngExt;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::usize_to_f64;

/// Errors for generic MCMC schedule configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum InferenceError {
    #[error("retained draws per chain must be positive")]
    InvalidDraws,
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error("at least {min} chain is required; found {found}")]
    InvalidChainCount { min: usize, found: usize },
    #[error("multi-chain seed stride must be positive")]
    InvalidSeedStride,
    #[error("target acceptance must lie strictly between 0 and 1; found {found}")]
    InvalidTargetAcceptance { found: f64 },
}

/// MCMC run schedule shared by every chain of one sampling run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Retained draws per chain, after warm-up and thinning.
    pub draws: usize,
    /// Warm-up iterations discarded before retention; proposal scales adapt here.
    pub tune: usize,
    /// Keep every `thin`-th post-warm-up iteration.
    pub thin: usize,
    /// Number of independent chains.
    pub chains: usize,
    /// RNG seed of the first chain.
    pub seed: u64,
    /// Seed increment between adjacent chains.
    ///
    /// Chain `i` uses `seed + i * seed_stride` with wrapping arithmetic.
    pub seed_stride: u64,
    /// Acceptance rate the warm-up adaptation steers Metropolis blocks toward.
    pub target_acceptance: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            draws: 2_000,
            tune: 1_000,
            thin: 1,
            chains: 4,
            seed: 42,
            seed_stride: 10_000,
            target_acceptance: 0.44,
        }
    }
}

impl SamplerConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub fn validate(self) -> Result<(), InferenceError> {
        if self.draws == 0 {
            return Err(InferenceError::InvalidDraws);
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        if self.chains == 0 {
            return Err(InferenceError::InvalidChainCount {
                min: 1,
                found: self.chains,
            });
        }
        if self.chains > 1 && self.seed_stride == 0 {
            return Err(InferenceError::InvalidSeedStride);
        }
        if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
            return Err(InferenceError::InvalidTargetAcceptance {
                found: self.target_acceptance,
            });
        }
        Ok(())
    }

    /// Total iterations one chain runs, warm-up included.
    #[must_use]
    pub const fn iterations_per_chain(self) -> usize {
        self.tune + self.draws * self.thin
    }

    /// Retained draws across all chains.
    #[must_use]
    pub const fn total_draws(self) -> usize {
        self.draws * self.chains
    }

    /// Seed used by chain `chain_index`.
    #[must_use]
    pub fn chain_seed(self, chain_index: usize) -> u64 {
        let index_u64 = u64::try_from(chain_index).unwrap_or(u64::MAX);
        self.seed
            .wrapping_add(index_u64.wrapping_mul(self.seed_stride))
    }
}

/// Proposal counters for a single Metropolis-Hastings block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl ProposalStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Acceptance rate in `[0, 1]`, or `0` if no proposals were made.
    #[must_use]
    pub fn acceptance_rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            usize_to_f64(self.accepted) / usize_to_f64(self.proposed)
        }
    }

    /// Clear the counters, e.g. at the start of a new adaptation window.
    pub const fn reset(&mut self) {
        self.proposed = 0;
        self.accepted = 0;
    }
}

/// Cooperative cancellation flag shared between a caller and running chains.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Chains stop at their next iteration boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Metropolis acceptance test on the log scale.
pub(crate) fn should_accept(log_acceptance: f64, rng: &mut StdRng) -> bool {
    log_acceptance >= 0.0 || rng.random::<f64>().ln() < log_acceptance
}

/// Box-Muller standard normal draw.
pub(crate) fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
