//! # Posterior Sampling of Neighborhood Size and Density
//!
//! Ties the pieces together into a single-chain MCMC run over `(Nb, density)`:
//!
//! - [`ModelPosterior`] combines the log-normal priors with the weighted
//!   binomial likelihood of the pairwise identity counts. Numeric failures
//!   inside the identity function or the likelihood reject the proposal; they
//!   never abort the run.
//! - [`InferenceEngine`] owns the fixed parts of the model, validates the run
//!   settings up front and drives an injected [`Sampler`]. It keeps every
//!   `thin`-th state after burn-in and finishes by evaluating the deviance at
//!   the posterior mean for the DIC.
//!
//! A [`CancellationToken`] may be shared with another thread to stop a long
//! run between iterations.

use crate::data::PairwiseData;
use crate::identity::{IdentityModel, ModelKind, NumericError};
use crate::likelihood::{deviance, log_likelihood, simulate_counts};
use crate::prior::{LogNormalPrior, PriorError};
use crate::progress::{NoopSamplingProgress, SamplingProgress};
use crate::sampler::{
    AdaptiveMetropolis, ChainState, DEFAULT_PROPOSAL_SCALE, LogDensity, Posterior, Sampler,
};
use crate::series::{DEFAULT_SERIES_TERMS, SeriesError};
use crate::trace::{Trace, TraceRecord};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Default number of burn-in iterations between proposal-scale adjustments.
pub const DEFAULT_TUNE_INTERVAL: usize = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Priors on neighborhood size and density must be set before sampling.")]
    PriorsUnset,
    #[error(
        "Invalid iteration settings: {iterations} iterations, {burn_in} burn-in, thinning {thin}. Iterations must exceed burn-in and thinning must be at least 1."
    )]
    InvalidSchedule {
        iterations: usize,
        burn_in: usize,
        thin: usize,
    },
    #[error("The tuning interval must be at least 1.")]
    InvalidTuneInterval,
    #[error("The initial proposal scale must be positive and finite, got {0}.")]
    InvalidProposalScale(f64),
    #[error(
        "The starting point (neighborhood size {nb}, density {density}) has zero posterior density or could not be evaluated."
    )]
    InvalidStartingPoint { nb: f64, density: f64 },
    #[error("The sampler updates {found} coordinates but the posterior has {expected}.")]
    SamplerDimension { expected: usize, found: usize },
    #[error("The run retained no states.")]
    EmptyTrace,
    #[error("Sampling was cancelled after {completed} iterations.")]
    Cancelled { completed: usize },
    #[error("Failed to build the identity function: {0}")]
    Series(#[from] SeriesError),
    #[error("Invalid prior: {0}")]
    Prior(#[from] PriorError),
    #[error("Failed to evaluate a retained state: {0}")]
    Numeric(#[from] NumericError),
}

/// Fixed settings of one run, independent of the iteration schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub mutation_rate: f64,
    pub series_terms: usize,
    pub nb_start: f64,
    pub density_start: f64,
    pub model: ModelKind,
    /// Attach a binomial replicate of the counts to every retained state.
    pub posterior_predictive: bool,
    pub tune_interval: usize,
    pub initial_scale: f64,
    /// Seed for the chain; `None` draws one from the operating system.
    pub seed: Option<u64>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            mutation_rate: 1e-4,
            series_terms: DEFAULT_SERIES_TERMS,
            nb_start: 10.0,
            density_start: 1.0,
            model: ModelKind::Full,
            posterior_predictive: false,
            tune_interval: DEFAULT_TUNE_INTERVAL,
            initial_scale: DEFAULT_PROPOSAL_SCALE,
            seed: None,
        }
    }
}

/// Shared flag for stopping a run between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything computed for one `(nb, density)` state.
#[derive(Debug, Clone)]
pub struct StateEvaluation {
    pub log_prior: f64,
    pub log_likelihood: f64,
    /// Pairwise identity probabilities, pairs × markers.
    pub probabilities: Array2<f64>,
}

/// Log posterior of `[nb, density]` for one model.
pub struct ModelPosterior<'a> {
    data: &'a PairwiseData,
    identity: &'a IdentityModel,
    kind: ModelKind,
    nb_prior: LogNormalPrior,
    density_prior: LogNormalPrior,
}

impl<'a> ModelPosterior<'a> {
    pub fn new(
        data: &'a PairwiseData,
        identity: &'a IdentityModel,
        kind: ModelKind,
        nb_prior: LogNormalPrior,
        density_prior: LogNormalPrior,
    ) -> Self {
        Self {
            data,
            identity,
            kind,
            nb_prior,
            density_prior,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn log_prior(&self, nb: f64, density: f64) -> f64 {
        self.nb_prior.ln_pdf(nb) + self.density_prior.ln_pdf(density)
    }

    pub fn evaluate(&self, nb: f64, density: f64) -> Result<StateEvaluation, NumericError> {
        let sigma = (nb / density).sqrt();
        if !(nb.is_finite() && nb > 0.0 && density.is_finite() && density > 0.0) {
            return Err(NumericError::InvalidParameters { nb, sigma });
        }
        let probabilities = self.identity.probabilities(self.kind, nb, sigma, self.data)?;
        let log_likelihood = log_likelihood(probabilities.view(), self.data)?;
        Ok(StateEvaluation {
            log_prior: self.log_prior(nb, density),
            log_likelihood,
            probabilities,
        })
    }
}

impl Posterior for ModelPosterior<'_> {
    fn dim(&self) -> usize {
        2
    }

    fn log_density(&self, position: &[f64]) -> Option<LogDensity> {
        let &[nb, density] = position else {
            return None;
        };
        let log_prior = self.log_prior(nb, density);
        if !log_prior.is_finite() {
            return None;
        }
        match self.evaluate(nb, density) {
            Ok(evaluation) => Some(LogDensity::new(log_prior, evaluation.log_likelihood)),
            Err(e) => {
                log::trace!("Rejecting nb = {nb}, density = {density}: {e}");
                None
            }
        }
    }
}

/// Owns the fixed model state and runs chains over it.
pub struct InferenceEngine<'a> {
    data: &'a PairwiseData,
    identity: IdentityModel,
    settings: InferenceSettings,
    priors: Option<(LogNormalPrior, LogNormalPrior)>,
}

impl<'a> InferenceEngine<'a> {
    /// Precomputes the identity-function state for `data`.
    pub fn new(data: &'a PairwiseData, settings: InferenceSettings) -> Result<Self, InferenceError> {
        if settings.tune_interval == 0 {
            return Err(InferenceError::InvalidTuneInterval);
        }
        if !(settings.initial_scale.is_finite() && settings.initial_scale > 0.0) {
            return Err(InferenceError::InvalidProposalScale(settings.initial_scale));
        }
        let identity = IdentityModel::for_data(data, settings.mutation_rate, settings.series_terms)?;
        Ok(Self {
            data,
            identity,
            settings,
            priors: None,
        })
    }

    pub fn set_priors(
        &mut self,
        nb: LogNormalPrior,
        density: LogNormalPrior,
    ) -> Result<(), InferenceError> {
        nb.validate()?;
        density.validate()?;
        self.priors = Some((nb, density));
        Ok(())
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    pub fn identity(&self) -> &IdentityModel {
        &self.identity
    }

    pub fn data(&self) -> &PairwiseData {
        self.data
    }

    /// The posterior of the configured model; fails until priors are set.
    pub fn posterior(&self) -> Result<ModelPosterior<'_>, InferenceError> {
        let (nb_prior, density_prior) = self.priors.ok_or(InferenceError::PriorsUnset)?;
        Ok(ModelPosterior::new(
            self.data,
            &self.identity,
            self.settings.model,
            nb_prior,
            density_prior,
        ))
    }

    /// Runs a chain with the default sampler and a seeded generator.
    pub fn run(&self, iterations: usize, burn_in: usize, thin: usize) -> Result<Trace, InferenceError> {
        self.run_observed(
            iterations,
            burn_in,
            thin,
            &mut NoopSamplingProgress,
            &CancellationToken::new(),
        )
    }

    /// Like [`run`](Self::run), reporting progress and honoring cancellation.
    pub fn run_observed(
        &self,
        iterations: usize,
        burn_in: usize,
        thin: usize,
        progress: &mut dyn SamplingProgress,
        cancel: &CancellationToken,
    ) -> Result<Trace, InferenceError> {
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let dim = self.posterior()?.dim();
        let mut sampler = AdaptiveMetropolis::new(dim, self.settings.initial_scale);
        self.run_with(
            iterations,
            burn_in,
            thin,
            &mut sampler,
            &mut rng,
            progress,
            cancel,
        )
    }

    /// Runs one chain with an explicit sampler and random source.
    ///
    /// Iteration `t` is retained when `t >= burn_in` and
    /// `(t - burn_in) % thin == 0`. Proposal scales are tuned every
    /// `tune_interval` iterations during burn-in only.
    #[allow(clippy::too_many_arguments)]
    pub fn run_with(
        &self,
        iterations: usize,
        burn_in: usize,
        thin: usize,
        sampler: &mut dyn Sampler,
        rng: &mut dyn RngCore,
        progress: &mut dyn SamplingProgress,
        cancel: &CancellationToken,
    ) -> Result<Trace, InferenceError> {
        if iterations <= burn_in || thin == 0 {
            return Err(InferenceError::InvalidSchedule {
                iterations,
                burn_in,
                thin,
            });
        }
        let posterior = self.posterior()?;
        let found = sampler.scales().len();
        if found != posterior.dim() {
            return Err(InferenceError::SamplerDimension {
                expected: posterior.dim(),
                found,
            });
        }

        let (nb, density) = (self.settings.nb_start, self.settings.density_start);
        let mut state = ChainState::new(&posterior, vec![nb, density])
            .ok_or(InferenceError::InvalidStartingPoint { nb, density })?;

        log::info!(
            "Sampling the {} model: {} iterations, {} burn-in, thinning {}",
            self.settings.model,
            iterations,
            burn_in,
            thin
        );
        progress.on_start(self.settings.model, iterations);

        let mut records = Vec::with_capacity((iterations - burn_in).div_ceil(thin));
        for t in 0..iterations {
            if cancel.is_cancelled() {
                log::info!("Sampling cancelled after {t} iterations");
                return Err(InferenceError::Cancelled { completed: t });
            }

            sampler.step(&posterior, &mut state, rng);

            if t < burn_in && (t + 1) % self.settings.tune_interval == 0 {
                sampler.tune();
            }
            if t >= burn_in && (t - burn_in) % thin == 0 {
                records.push(self.record(t, &state, rng)?);
            }
            progress.on_advance(t + 1);
        }
        progress.on_finish(self.settings.model);

        if records.is_empty() {
            return Err(InferenceError::EmptyTrace);
        }
        let acceptance = sampler.acceptance_rates();
        log::info!(
            "Retained {} states; acceptance rates {:.3?}",
            records.len(),
            acceptance
        );

        let trace = Trace::new(self.settings.model, records)
            .with_sampler_statistics(acceptance, sampler.scales());
        let (nb_mean, density_mean) = trace
            .posterior_mean_parameters()
            .map_err(|_| InferenceError::EmptyTrace)?;
        match posterior.evaluate(nb_mean, density_mean) {
            Ok(evaluation) => Ok(trace.with_deviance_at_mean(deviance(evaluation.log_likelihood))),
            Err(e) => {
                log::warn!(
                    "Deviance at the posterior mean (nb = {nb_mean}, density = {density_mean}) is unavailable: {e}"
                );
                Ok(trace)
            }
        }
    }

    /// The log-likelihood comes from the chain state; identity probabilities
    /// are only recomputed when a replicate is requested.
    fn record(
        &self,
        iteration: usize,
        state: &ChainState,
        rng: &mut dyn RngCore,
    ) -> Result<TraceRecord, InferenceError> {
        let (nb, density) = (state.position[0], state.position[1]);
        let mut record = TraceRecord::new(iteration, nb, density, state.density.log_likelihood);
        if self.settings.posterior_predictive {
            let sigma = (nb / density).sqrt();
            let probabilities = self
                .identity
                .probabilities(self.settings.model, nb, sigma, self.data)?;
            record.simulated = Some(simulate_counts(probabilities.view(), self.data, rng));
        }
        Ok(record)
    }
}
