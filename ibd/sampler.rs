//! Metropolis-Hastings sampling of strictly positive parameters.
//!
//! The engine only talks to the [`Sampler`] trait, so a different step rule
//! can be dropped in without touching the chain bookkeeping. The shipped
//! implementation, [`AdaptiveMetropolis`], updates one coordinate at a time
//! with a log-normal proposal centered on the current value (a Gaussian random
//! walk on the log scale) and tunes each coordinate's proposal scale during
//! burn-in. Proposal draws and the Hastings correction both come from
//! `statrs`'s log-normal distribution.

use rand::distributions::{Distribution, Open01};
use rand::{Rng, RngCore};
use statrs::distribution::{Continuous, LogNormal};

/// Default log-scale proposal standard deviation.
pub const DEFAULT_PROPOSAL_SCALE: f64 = 0.5;

/// Bounds on a tuned proposal scale.
const MIN_PROPOSAL_SCALE: f64 = 1e-6;
const MAX_PROPOSAL_SCALE: f64 = 5.0;

/// Unnormalized log posterior at one position, split into its parts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogDensity {
    pub log_prior: f64,
    pub log_likelihood: f64,
}

impl LogDensity {
    pub fn new(log_prior: f64, log_likelihood: f64) -> Self {
        Self {
            log_prior,
            log_likelihood,
        }
    }

    pub fn total(&self) -> f64 {
        self.log_prior + self.log_likelihood
    }
}

/// An unnormalized log posterior over positive coordinates.
pub trait Posterior: Sync {
    fn dim(&self) -> usize;

    /// Log density, or `None` when the position is outside the support or
    /// cannot be evaluated. `None` always rejects a proposal.
    fn log_density(&self, position: &[f64]) -> Option<LogDensity>;
}

/// Current position of a chain together with its log density.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    pub position: Vec<f64>,
    pub density: LogDensity,
}

impl ChainState {
    /// Starts a chain at `position`; `None` when the posterior there is zero
    /// or cannot be evaluated.
    pub fn new(posterior: &dyn Posterior, position: Vec<f64>) -> Option<Self> {
        let density = posterior.log_density(&position)?;
        density.total().is_finite().then_some(Self { position, density })
    }

    pub fn log_density(&self) -> f64 {
        self.density.total()
    }
}

/// A single-chain MCMC transition kernel.
pub trait Sampler {
    /// Advances the chain by one iteration.
    fn step(&mut self, posterior: &dyn Posterior, state: &mut ChainState, rng: &mut dyn RngCore);

    /// Adjusts proposal scales from the acceptance seen since the last call.
    fn tune(&mut self);

    /// Acceptance rate of each coordinate over the whole run so far.
    fn acceptance_rates(&self) -> Vec<f64>;

    /// Current proposal scale of each coordinate.
    fn scales(&self) -> Vec<f64>;
}

/// Multiplicative change applied to a proposal scale for a given acceptance
/// rate.
pub fn tuning_factor(acceptance_rate: f64) -> f64 {
    if acceptance_rate < 0.001 {
        0.1
    } else if acceptance_rate < 0.05 {
        0.5
    } else if acceptance_rate < 0.2 {
        0.9
    } else if acceptance_rate > 0.95 {
        10.0
    } else if acceptance_rate > 0.75 {
        2.0
    } else if acceptance_rate > 0.5 {
        1.1
    } else {
        1.0
    }
}

/// Log-normal proposal centered (on the log scale) at `from`.
fn proposal_from(from: f64, scale: f64) -> Option<LogNormal> {
    if !(from.is_finite() && from > 0.0) {
        return None;
    }
    LogNormal::new(from.ln(), scale).ok()
}

/// `ln q(current | proposal) - ln q(proposal | current)` for the log-normal
/// proposal. Analytically `ln proposal - ln current`.
pub fn log_hastings_ratio(current: f64, proposal: f64, scale: f64) -> Option<f64> {
    let forward = proposal_from(current, scale)?;
    let backward = proposal_from(proposal, scale)?;
    let ratio = backward.ln_pdf(current) - forward.ln_pdf(proposal);
    ratio.is_finite().then_some(ratio)
}

/// Componentwise log-normal Metropolis-Hastings with burn-in tuning.
#[derive(Debug, Clone)]
pub struct AdaptiveMetropolis {
    scales: Vec<f64>,
    window_accepted: Vec<u64>,
    window_proposed: Vec<u64>,
    accepted: Vec<u64>,
    proposed: Vec<u64>,
}

impl AdaptiveMetropolis {
    pub fn new(dim: usize, initial_scale: f64) -> Self {
        Self::with_scales(vec![initial_scale; dim])
    }

    pub fn with_scales(scales: Vec<f64>) -> Self {
        let dim = scales.len();
        Self {
            scales,
            window_accepted: vec![0; dim],
            window_proposed: vec![0; dim],
            accepted: vec![0; dim],
            proposed: vec![0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.scales.len()
    }
}

impl Sampler for AdaptiveMetropolis {
    fn step(&mut self, posterior: &dyn Posterior, state: &mut ChainState, rng: &mut dyn RngCore) {
        let mut candidate = state.position.clone();
        for i in 0..self.scales.len() {
            let current = state.position[i];
            let scale = self.scales[i];
            self.proposed[i] += 1;
            self.window_proposed[i] += 1;

            let Some(proposal) = proposal_from(current, scale).map(|q| q.sample(rng)) else {
                log::trace!("No proposal for coordinate {i} at {current}");
                continue;
            };
            candidate[i] = proposal;

            let accepted = match (
                posterior.log_density(&candidate),
                log_hastings_ratio(current, proposal, scale),
            ) {
                (Some(density), Some(hastings)) if density.total().is_finite() => {
                    let log_ratio = density.total() - state.log_density() + hastings;
                    let u: f64 = rng.sample(Open01);
                    if u.ln() < log_ratio {
                        state.density = density;
                        true
                    } else {
                        false
                    }
                }
                _ => {
                    log::trace!("Rejected unevaluable proposal {candidate:?}");
                    false
                }
            };

            if accepted {
                state.position[i] = proposal;
                self.accepted[i] += 1;
                self.window_accepted[i] += 1;
            } else {
                candidate[i] = current;
            }
        }
    }

    fn tune(&mut self) {
        for i in 0..self.scales.len() {
            if self.window_proposed[i] == 0 {
                continue;
            }
            let rate = self.window_accepted[i] as f64 / self.window_proposed[i] as f64;
            let previous = self.scales[i];
            self.scales[i] =
                (previous * tuning_factor(rate)).clamp(MIN_PROPOSAL_SCALE, MAX_PROPOSAL_SCALE);
            log::debug!(
                "Coordinate {i}: acceptance {rate:.3}, proposal scale {previous:.4} -> {:.4}",
                self.scales[i]
            );
            self.window_accepted[i] = 0;
            self.window_proposed[i] = 0;
        }
    }

    fn acceptance_rates(&self) -> Vec<f64> {
        self.accepted
            .iter()
            .zip(&self.proposed)
            .map(|(&a, &p)| if p == 0 { 0.0 } else { a as f64 / p as f64 })
            .collect()
    }

    fn scales(&self) -> Vec<f64> {
        self.scales.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::LogNormalPrior;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct IndependentLogNormals(Vec<LogNormalPrior>);

    impl Posterior for IndependentLogNormals {
        fn dim(&self) -> usize {
            self.0.len()
        }

        fn log_density(&self, position: &[f64]) -> Option<LogDensity> {
            let total: f64 = self
                .0
                .iter()
                .zip(position)
                .map(|(prior, &x)| prior.ln_pdf(x))
                .sum();
            total.is_finite().then_some(LogDensity::new(total, 0.0))
        }
    }

    #[test]
    fn tuning_factors_follow_acceptance() {
        assert_eq!(tuning_factor(0.0), 0.1);
        assert_eq!(tuning_factor(0.01), 0.5);
        assert_eq!(tuning_factor(0.1), 0.9);
        assert_eq!(tuning_factor(0.3), 1.0);
        assert_eq!(tuning_factor(0.6), 1.1);
        assert_eq!(tuning_factor(0.8), 2.0);
        assert_eq!(tuning_factor(0.99), 10.0);
    }

    #[test]
    fn recovers_log_normal_target() {
        let target = IndependentLogNormals(vec![
            LogNormalPrior::new(1.0, 4.0).unwrap(),
            LogNormalPrior::new(-0.5, 1.0).unwrap(),
        ]);
        let mut sampler = AdaptiveMetropolis::new(target.dim(), DEFAULT_PROPOSAL_SCALE);
        let mut rng = StdRng::seed_from_u64(42);
        let mut state = ChainState::new(&target, vec![1.0, 1.0]).unwrap();

        let burn_in = 2_000;
        let mut logs = vec![Vec::new(), Vec::new()];
        for t in 0..40_000 {
            sampler.step(&target, &mut state, &mut rng);
            if t < burn_in && (t + 1) % 100 == 0 {
                sampler.tune();
            }
            if t >= burn_in {
                for (i, &x) in state.position.iter().enumerate() {
                    logs[i].push(x.ln());
                }
            }
        }

        for (i, (mu, sd)) in [(1.0, 0.5), (-0.5, 1.0)].into_iter().enumerate() {
            let n = logs[i].len() as f64;
            let mean = logs[i].iter().sum::<f64>() / n;
            let var = logs[i].iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
            assert_relative_eq!(mean, mu, epsilon = 0.1 * sd);
            assert_relative_eq!(var.sqrt(), sd, max_relative = 0.15);
        }

        for rate in sampler.acceptance_rates() {
            assert!(rate > 0.05 && rate < 0.95, "acceptance rate {rate}");
        }
    }

    #[test]
    fn unevaluable_proposals_are_rejected() {
        struct Wall;
        impl Posterior for Wall {
            fn dim(&self) -> usize {
                1
            }
            fn log_density(&self, position: &[f64]) -> Option<LogDensity> {
                (position[0] <= 1.0).then_some(LogDensity::default())
            }
        }

        let mut sampler = AdaptiveMetropolis::new(1, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = ChainState::new(&Wall, vec![0.5]).unwrap();
        for _ in 0..2_000 {
            sampler.step(&Wall, &mut state, &mut rng);
            assert!(state.position[0] <= 1.0);
        }
        assert!(sampler.acceptance_rates()[0] < 1.0);
    }

    #[test]
    fn tuning_shrinks_scale_when_everything_is_rejected() {
        struct Nowhere;
        impl Posterior for Nowhere {
            fn dim(&self) -> usize {
                1
            }
            fn log_density(&self, _: &[f64]) -> Option<LogDensity> {
                None
            }
        }

        let mut sampler = AdaptiveMetropolis::new(1, 1.0);
        let mut rng = StdRng::seed_from_u64(9);
        assert!(ChainState::new(&Nowhere, vec![2.0]).is_none());
        let mut state = ChainState {
            position: vec![2.0],
            density: LogDensity::default(),
        };
        for _ in 0..10 {
            sampler.step(&Nowhere, &mut state, &mut rng);
        }
        sampler.tune();
        assert_relative_eq!(sampler.scales()[0], 0.1);
        assert_eq!(state.position, vec![2.0]);
        assert_eq!(sampler.acceptance_rates(), vec![0.0]);
    }

    #[test]
    fn hastings_ratio_is_the_log_jacobian() {
        for &(current, proposal, scale) in &[(1.0, 2.5, 0.5), (3.0, 0.2, 1.0), (0.01, 0.011, 0.05)] {
            let ratio = log_hastings_ratio(current, proposal, scale).unwrap();
            assert_relative_eq!(ratio, proposal.ln() - current.ln(), epsilon = 1e-10);
        }
        assert!(log_hastings_ratio(0.0, 1.0, 0.5).is_none());
        assert!(log_hastings_ratio(1.0, 1.0, 0.0).is_none());
    }

    #[test]
    fn proposals_are_log_normal_around_the_current_value() {
        let mut rng = StdRng::seed_from_u64(17);
        let proposal = proposal_from(4.0, 0.3).unwrap();
        let logs: Vec<f64> = (0..20_000).map(|_| proposal.sample(&mut rng).ln()).collect();
        let n = logs.len() as f64;
        let mean = logs.iter().sum::<f64>() / n;
        let sd = (logs.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert_relative_eq!(mean, 4f64.ln(), epsilon = 0.01);
        assert_relative_eq!(sd, 0.3, max_relative = 0.03);
    }

    #[test]
    fn accepted_moves_carry_their_density_parts() {
        struct Split;
        impl Posterior for Split {
            fn dim(&self) -> usize {
                1
            }
            fn log_density(&self, position: &[f64]) -> Option<LogDensity> {
                let x = position[0];
                Some(LogDensity::new(-x, -x * x))
            }
        }

        let mut sampler = AdaptiveMetropolis::new(1, 0.5);
        let mut rng = StdRng::seed_from_u64(23);
        let mut state = ChainState::new(&Split, vec![1.0]).unwrap();
        for _ in 0..500 {
            sampler.step(&Split, &mut state, &mut rng);
            let x = state.position[0];
            assert_eq!(state.density, LogDensity::new(-x, -x * x));
        }
        assert!(sampler.acceptance_rates()[0] > 0.0);
    }
}
