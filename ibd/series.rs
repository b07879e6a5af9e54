//! Precomputed terms of the small-distance expansion of the identity function.
//!
//! For `z = exp(-2μ)` the Wright-Malécot sum has the expansion
//!
//! `Φ(d; σ) ∝ Σ_k (-1)^k · Li_{k+1}(z) / ((2k)!! · 2^{k+1}) · (d/σ)^{2k}`
//!
//! where `(2k)!! = 2^k·k!`. Everything except `σ` is fixed for a run, so the
//! per-order coefficients are computed once here and reused for every proposal.
//! The table keeps `d²` per pair rather than `d^{2k}`: the evaluator raises the
//! ratio `d²/σ²` instead, which is bounded by 25 on the branch that uses the
//! series, while `d^{2k}` itself overflows for distances in meters.

use crate::special::polylog_exp;
use ndarray::{Array1, Array2, ArrayView1};
use thiserror::Error;

/// Truncation order of the reference model.
pub const DEFAULT_SERIES_TERMS: usize = 34;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("The mutation rate must be positive and finite, got {0}.")]
    InvalidMutationRate(f64),
    #[error("The series needs at least one term.")]
    NoTerms,
    #[error("Polylogarithm Li_{order}(z) evaluated to a non-finite value for mutation rate {mutation_rate}.")]
    NonFinitePolylog { order: usize, mutation_rate: f64 },
}

/// `(2k)!! = 2·4·…·2k`, with `0!! = 1`.
fn double_factorial(k: usize) -> f64 {
    (1..=k).map(|i| (2 * i) as f64).product()
}

fn power_of_two(k: usize) -> f64 {
    2f64.powi(k as i32 + 1)
}

fn sign(k: usize) -> f64 {
    if k % 2 == 0 { 1.0 } else { -1.0 }
}

/// Per-order series coefficients and per-pair squared distances.
///
/// Only the folded coefficients are stored; the individual per-order factors
/// are rebuilt on request for inspection.
#[derive(Debug, Clone)]
pub struct SeriesCoefficients {
    polylog: Array1<f64>,
    coefficients: Array1<f64>,
    squared_distances: Array1<f64>,
}

impl SeriesCoefficients {
    /// Builds the cache for the given distances, mutation rate and number of terms.
    pub fn new(
        distances: ArrayView1<f64>,
        mutation_rate: f64,
        terms: usize,
    ) -> Result<Self, SeriesError> {
        if !(mutation_rate.is_finite() && mutation_rate > 0.0) {
            return Err(SeriesError::InvalidMutationRate(mutation_rate));
        }
        if terms == 0 {
            return Err(SeriesError::NoTerms);
        }

        let log_z = -2.0 * mutation_rate;
        let mut polylog = Array1::zeros(terms);
        for (k, slot) in polylog.iter_mut().enumerate() {
            let value = polylog_exp(k as u32 + 1, log_z);
            if !value.is_finite() {
                return Err(SeriesError::NonFinitePolylog {
                    order: k + 1,
                    mutation_rate,
                });
            }
            *slot = value;
        }

        let coefficients = Array1::from_shape_fn(terms, |k| {
            sign(k) * polylog[k] / (double_factorial(k) * power_of_two(k))
        });
        let squared_distances = distances.mapv(|d| d * d);

        log::debug!(
            "Series cache: {} terms for {} pairs, Li_1(z) = {:.6}",
            terms,
            distances.len(),
            polylog[0]
        );

        Ok(Self {
            polylog,
            coefficients,
            squared_distances,
        })
    }

    pub fn n_terms(&self) -> usize {
        self.coefficients.len()
    }

    pub fn n_pairs(&self) -> usize {
        self.squared_distances.len()
    }

    /// `Li_{k+1}(z)` for each order.
    pub fn polylog(&self) -> ArrayView1<'_, f64> {
        self.polylog.view()
    }

    /// `(2k)!!` for each order.
    pub fn double_factorials(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.n_terms(), double_factorial)
    }

    /// `2^{k+1}` for each order.
    pub fn powers_of_two(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.n_terms(), power_of_two)
    }

    /// `(-1)^k` for each order.
    pub fn signs(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.n_terms(), sign)
    }

    /// Power of distance (and of `1/σ`) for each order, `2k`.
    pub fn exponents(&self) -> Array1<i32> {
        Array1::from_shape_fn(self.n_terms(), |k| 2 * k as i32)
    }

    /// Folded coefficient `sign · Li / (double_factorial · power_of_two)`.
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Squared distance of each pair.
    pub fn squared_distances(&self) -> ArrayView1<'_, f64> {
        self.squared_distances.view()
    }

    /// Materializes the full term table, one row per pair and one column per
    /// order, with entries `c_k · d^{2k}`. Entries may overflow for long
    /// distances; evaluation never goes through this table.
    pub fn term_table(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_pairs(), self.n_terms()), |(p, k)| {
            self.coefficients[k] * self.squared_distances[p].powi(k as i32)
        })
    }

    /// Sums the truncated series for pair `pair` at dispersal scale `sigma`.
    #[inline]
    pub fn evaluate(&self, pair: usize, sigma: f64) -> f64 {
        self.evaluate_ratio(self.squared_distances[pair] / (sigma * sigma))
    }

    /// Sums `Σ_k c_k · u^k` for `u = d²/σ²`.
    #[inline]
    pub fn evaluate_ratio(&self, ratio: f64) -> f64 {
        let mut power = 1.0;
        let mut total = 0.0;
        for &c in &self.coefficients {
            total += c * power;
            power *= ratio;
        }
        total
    }
}
