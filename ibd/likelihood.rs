//! Weighted binomial likelihood of the pairwise identity counts.

use crate::data::PairwiseData;
use crate::identity::NumericError;
use ndarray::{Array2, ArrayView2, Zip};
use rand::Rng;
use rand_distr::{Binomial, Distribution};

/// Probabilities are clamped into `[FLOOR, 1 - FLOOR]` before taking logs.
pub const PROBABILITY_FLOOR: f64 = 1e-10;

/// Log-likelihood of the observed counts under the given probabilities.
///
/// Each marker contributes `weight_m · Σ_pairs [k·ln p + (n - k)·ln(1 - p)]`
/// with `k = ibd`, `n = total`. The binomial coefficient is constant in the
/// parameters and left out.
pub fn log_likelihood(
    probabilities: ArrayView2<f64>,
    data: &PairwiseData,
) -> Result<f64, NumericError> {
    let ibd = data.ibd();
    let total = data.total();

    let mut ll = 0.0;
    for (marker, summary) in data.summaries().iter().enumerate() {
        let mut marker_ll = 0.0;
        Zip::from(probabilities.column(marker))
            .and(ibd.column(marker))
            .and(total.column(marker))
            .for_each(|&p, &k, &n| {
                let p = p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
                let k = f64::from(k);
                let n = f64::from(n);
                marker_ll += k * p.ln() + (n - k) * (-p).ln_1p();
            });
        ll += summary.weight * marker_ll;
    }

    if ll.is_finite() {
        Ok(ll)
    } else {
        Err(NumericError::NonFiniteLikelihood)
    }
}

/// `-2 · ln L`.
#[inline]
pub fn deviance(log_likelihood: f64) -> f64 {
    -2.0 * log_likelihood
}

/// Draws replicate `ibd` counts, `Binomial(total, p)` for every pair and marker.
pub fn simulate_counts<R: Rng + ?Sized>(
    probabilities: ArrayView2<f64>,
    data: &PairwiseData,
    rng: &mut R,
) -> Array2<u32> {
    let mut simulated = Array2::<u32>::zeros(probabilities.raw_dim());
    Zip::from(&mut simulated)
        .and(probabilities)
        .and(data.total())
        .for_each(|out, &p, &n| {
            *out = Binomial::new(u64::from(n), p.clamp(0.0, 1.0))
                .map(|binomial| binomial.sample(rng) as u32)
                .unwrap_or(0);
        });
    simulated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CoordinateMode, MarkerLocus, Sample};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_marker_data() -> PairwiseData {
        let samples = (0..3)
            .map(|i| Sample {
                id: format!("s{i}"),
                coordinates: [i as f64, 0.0],
            })
            .collect();
        let markers = vec![
            MarkerLocus {
                name: "m0".into(),
                genotypes: vec![[1, 2], [1, 1], [2, 3]],
            },
            MarkerLocus {
                name: "m1".into(),
                genotypes: vec![[4, 4], [4, 5], [0, 5]],
            },
        ];
        PairwiseData::from_parts(samples, markers, CoordinateMode::Planar).unwrap()
    }

    #[test]
    fn matches_hand_computed_value() {
        let data = two_marker_data();
        let p = Array2::from_elem((data.n_pairs(), data.n_markers()), 0.3);
        let ll = log_likelihood(p.view(), &data).unwrap();

        let mut expected = 0.0;
        for (m, summary) in data.summaries().iter().enumerate() {
            let mut marker_ll = 0.0;
            for pair in 0..data.n_pairs() {
                let k = f64::from(data.ibd()[[pair, m]]);
                let n = f64::from(data.total()[[pair, m]]);
                marker_ll += k * 0.3f64.ln() + (n - k) * 0.7f64.ln();
            }
            expected += summary.weight * marker_ll;
        }
        assert_relative_eq!(ll, expected, max_relative = 1e-12);
        assert_relative_eq!(deviance(ll), -2.0 * expected, max_relative = 1e-12);
    }

    #[test]
    fn extreme_probabilities_are_clamped() {
        let data = two_marker_data();
        let zeros = Array2::zeros((data.n_pairs(), data.n_markers()));
        let ones = Array2::ones((data.n_pairs(), data.n_markers()));
        let above = Array2::from_elem((data.n_pairs(), data.n_markers()), 1.7);
        for p in [zeros, ones, above] {
            assert!(log_likelihood(p.view(), &data).unwrap().is_finite());
        }
    }

    #[test]
    fn nan_probabilities_are_an_error() {
        let data = two_marker_data();
        let p = Array2::from_elem((data.n_pairs(), data.n_markers()), f64::NAN);
        assert_eq!(
            log_likelihood(p.view(), &data),
            Err(NumericError::NonFiniteLikelihood)
        );
    }

    #[test]
    fn simulated_counts_respect_totals() {
        let data = two_marker_data();
        let p = Array2::from_elem((data.n_pairs(), data.n_markers()), 0.5);
        let mut rng = StdRng::seed_from_u64(7);
        let simulated = simulate_counts(p.view(), &data, &mut rng);
        assert_eq!(simulated.dim(), data.total().dim());
        Zip::from(&simulated)
            .and(data.total())
            .for_each(|&s, &n| assert!(s <= n));

        let certain = Array2::ones((data.n_pairs(), data.n_markers()));
        assert_eq!(simulate_counts(certain.view(), &data, &mut rng), data.total());
    }
}
