//! Retained chain states and their posterior summaries.

use crate::identity::ModelKind;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error("The trace holds no retained states.")]
    Empty,
    #[error("The credible level must lie strictly between 0 and 1, got {0}.")]
    InvalidLevel(f64),
}

/// Quantities reported for every retained state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Dispersal scale `sqrt(Nb / density)`.
    Sigma,
    /// `σ²`.
    SigmaSq,
    Density,
    /// Sampled neighborhood parameter.
    Nb,
    /// Wright's neighborhood size `4π·Nb`.
    Neighborhood,
}

impl Quantity {
    pub const ALL: [Quantity; 5] = [
        Quantity::Sigma,
        Quantity::SigmaSq,
        Quantity::Density,
        Quantity::Nb,
        Quantity::Neighborhood,
    ];

    /// Column name used in trace and summary files.
    pub fn column(self) -> &'static str {
        match self {
            Self::Sigma => "sigma",
            Self::SigmaSq => "ss",
            Self::Density => "density",
            Self::Nb => "nb",
            Self::Neighborhood => "neigh",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One retained chain state.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    /// 0-based iteration at which the state was retained.
    pub iteration: usize,
    pub nb: f64,
    pub density: f64,
    pub sigma: f64,
    pub sigma_sq: f64,
    pub neighborhood: f64,
    pub log_likelihood: f64,
    pub deviance: f64,
    /// Posterior-predictive `ibd` replicate, pairs × markers.
    pub simulated: Option<Array2<u32>>,
}

impl TraceRecord {
    /// Fills in the derived quantities for a sampled `(nb, density)`.
    pub fn new(iteration: usize, nb: f64, density: f64, log_likelihood: f64) -> Self {
        let sigma_sq = nb / density;
        Self {
            iteration,
            nb,
            density,
            sigma: sigma_sq.sqrt(),
            sigma_sq,
            neighborhood: 4.0 * std::f64::consts::PI * nb,
            log_likelihood,
            deviance: -2.0 * log_likelihood,
            simulated: None,
        }
    }

    pub fn get(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Sigma => self.sigma,
            Quantity::SigmaSq => self.sigma_sq,
            Quantity::Density => self.density,
            Quantity::Nb => self.nb,
            Quantity::Neighborhood => self.neighborhood,
        }
    }
}

/// Posterior summary statistics of one quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub quantity: Quantity,
    pub samples: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub level: f64,
    /// Equal-tailed credible interval.
    pub credible_interval: (f64, f64),
    /// Shortest interval holding `level` of the retained states.
    pub hpd_interval: (f64, f64),
}

/// Deviance information criterion and its ingredients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DevianceInformation {
    pub mean_deviance: f64,
    pub deviance_at_mean: f64,
    /// Effective number of parameters, `mean(D) - D(θ̄)`.
    pub effective_parameters: f64,
    pub dic: f64,
}

impl DevianceInformation {
    pub fn new(mean_deviance: f64, deviance_at_mean: f64) -> Self {
        let effective_parameters = mean_deviance - deviance_at_mean;
        Self {
            mean_deviance,
            deviance_at_mean,
            effective_parameters,
            dic: mean_deviance + effective_parameters,
        }
    }
}

/// The retained states of one run, in chronological order.
#[derive(Debug, Clone)]
pub struct Trace {
    model: ModelKind,
    records: Vec<TraceRecord>,
    deviance_at_mean: Option<f64>,
    acceptance_rates: Vec<f64>,
    proposal_scales: Vec<f64>,
}

impl Trace {
    pub fn new(model: ModelKind, records: Vec<TraceRecord>) -> Self {
        Self {
            model,
            records,
            deviance_at_mean: None,
            acceptance_rates: Vec::new(),
            proposal_scales: Vec::new(),
        }
    }

    pub fn with_deviance_at_mean(mut self, deviance: f64) -> Self {
        self.deviance_at_mean = Some(deviance);
        self
    }

    pub fn with_sampler_statistics(mut self, acceptance_rates: Vec<f64>, scales: Vec<f64>) -> Self {
        self.acceptance_rates = acceptance_rates;
        self.proposal_scales = scales;
        self
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn acceptance_rates(&self) -> &[f64] {
        &self.acceptance_rates
    }

    pub fn proposal_scales(&self) -> &[f64] {
        &self.proposal_scales
    }

    pub fn values(&self, quantity: Quantity) -> Array1<f64> {
        self.records.iter().map(|r| r.get(quantity)).collect()
    }

    pub fn deviances(&self) -> Array1<f64> {
        self.records.iter().map(|r| r.deviance).collect()
    }

    /// Posterior means of `(nb, density)`.
    pub fn posterior_mean_parameters(&self) -> Result<(f64, f64), TraceError> {
        let nb = self.values(Quantity::Nb).mean().ok_or(TraceError::Empty)?;
        let density = self.values(Quantity::Density).mean().ok_or(TraceError::Empty)?;
        Ok((nb, density))
    }

    pub fn summary(&self, quantity: Quantity, level: f64) -> Result<Summary, TraceError> {
        if !(level > 0.0 && level < 1.0) {
            return Err(TraceError::InvalidLevel(level));
        }
        let values = self.values(quantity);
        let mean = values.mean().ok_or(TraceError::Empty)?;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let tail = 0.5 * (1.0 - level);

        Ok(Summary {
            quantity,
            samples: sorted.len(),
            mean,
            std_dev: values.std(0.0),
            median: quantile(&sorted, 0.5),
            level,
            credible_interval: (quantile(&sorted, tail), quantile(&sorted, 1.0 - tail)),
            hpd_interval: highest_density_interval(&sorted, level),
        })
    }

    /// Summaries of every [`Quantity`], in [`Quantity::ALL`] order.
    pub fn summaries(&self, level: f64) -> Result<Vec<Summary>, TraceError> {
        Quantity::ALL
            .iter()
            .map(|&quantity| self.summary(quantity, level))
            .collect()
    }

    /// DIC of this run; `None` when the deviance at the posterior mean could
    /// not be evaluated or the trace is empty.
    pub fn deviance_information(&self) -> Option<DevianceInformation> {
        let mean_deviance = self.deviances().mean()?;
        let deviance_at_mean = self.deviance_at_mean?;
        Some(DevianceInformation::new(mean_deviance, deviance_at_mean))
    }

    pub fn dic(&self) -> Option<f64> {
        self.deviance_information().map(|info| info.dic)
    }
}

/// Linearly interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Narrowest window of sorted values spanning `floor(level·n)` steps.
fn highest_density_interval(sorted: &[f64], level: f64) -> (f64, f64) {
    let n = sorted.len();
    let span = ((level * n as f64).floor() as usize).min(n - 1);
    let best = (0..n - span)
        .min_by(|&a, &b| {
            let width_a = sorted[a + span] - sorted[a];
            let width_b = sorted[b + span] - sorted[b];
            width_a.total_cmp(&width_b)
        })
        .unwrap_or(0);
    (sorted[best], sorted[best + span])
}
