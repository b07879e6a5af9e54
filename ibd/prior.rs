//! Log-normal priors on neighborhood size and density.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, LogNormal};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriorError {
    #[error("The prior location must be finite, got {0}.")]
    NonFiniteLocation(f64),
    #[error("The prior precision must be positive and finite, got {0}.")]
    InvalidPrecision(f64),
}

/// Log-normal distribution in the (location, precision) parameterization:
/// `ln x ~ Normal(mu, 1/tau)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogNormalPrior {
    pub mu: f64,
    pub tau: f64,
}

impl LogNormalPrior {
    pub fn new(mu: f64, tau: f64) -> Result<Self, PriorError> {
        let prior = Self { mu, tau };
        prior.validate()?;
        Ok(prior)
    }

    pub fn validate(&self) -> Result<(), PriorError> {
        if !self.mu.is_finite() {
            return Err(PriorError::NonFiniteLocation(self.mu));
        }
        if !(self.tau.is_finite() && self.tau > 0.0) {
            return Err(PriorError::InvalidPrecision(self.tau));
        }
        Ok(())
    }

    /// The same distribution in the (location, scale) parameterization.
    pub fn distribution(&self) -> Result<LogNormal, PriorError> {
        self.validate()?;
        LogNormal::new(self.mu, self.tau.powf(-0.5))
            .map_err(|_| PriorError::InvalidPrecision(self.tau))
    }

    /// Log density at `x`; `-∞` outside the support or for invalid
    /// parameters.
    pub fn ln_pdf(&self, x: f64) -> f64 {
        if !(x.is_finite() && x > 0.0) {
            return f64::NEG_INFINITY;
        }
        match self.distribution() {
            Ok(distribution) => distribution.ln_pdf(x),
            Err(_) => f64::NEG_INFINITY,
        }
    }

    pub fn median(&self) -> f64 {
        self.mu.exp()
    }

    pub fn mean(&self) -> f64 {
        (self.mu + 0.5 / self.tau).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::statistics::{Distribution, Median};
    use std::f64::consts::PI;

    #[test]
    fn density_matches_closed_form() {
        let prior = LogNormalPrior::new(1.0, 4.0).unwrap();
        // sd = 0.5, density of ln x at its mean is 1/(sd·sqrt(2π)), divided by x.
        let x = 1f64.exp();
        let expected = (1.0 / (0.5 * (2.0 * PI).sqrt()) / x).ln();
        assert_relative_eq!(prior.ln_pdf(x), expected, max_relative = 1e-12);
        assert!(prior.ln_pdf(x) > prior.ln_pdf(x * 3.0));
    }

    #[test]
    fn density_integrates_to_one() {
        let prior = LogNormalPrior::new(0.5, 2.0).unwrap();
        // Integrate over ln x to keep the grid uniform.
        let step = 1e-3;
        let total: f64 = (-8000..8000)
            .map(|i| {
                let y = 0.5 + i as f64 * step;
                prior.ln_pdf(y.exp()).exp() * y.exp() * step
            })
            .sum();
        assert_relative_eq!(total, 1.0, max_relative = 1e-6);
    }

    #[test]
    fn outside_support_is_negative_infinity() {
        let prior = LogNormalPrior::new(0.0, 1.0).unwrap();
        assert_eq!(prior.ln_pdf(0.0), f64::NEG_INFINITY);
        assert_eq!(prior.ln_pdf(-2.0), f64::NEG_INFINITY);
        assert_eq!(prior.ln_pdf(f64::NAN), f64::NEG_INFINITY);
    }

    #[test]
    fn precision_maps_to_scale() {
        let prior = LogNormalPrior::new(0.3, 4.0).unwrap();
        let distribution = prior.distribution().unwrap();
        assert_relative_eq!(distribution.median(), prior.median(), max_relative = 1e-12);
        assert_relative_eq!(distribution.mean().unwrap(), prior.mean(), max_relative = 1e-12);

        let unchecked = LogNormalPrior { mu: 0.0, tau: -1.0 };
        assert_eq!(unchecked.ln_pdf(1.0), f64::NEG_INFINITY);
        assert!(unchecked.distribution().is_err());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(
            LogNormalPrior::new(0.0, 0.0),
            Err(PriorError::InvalidPrecision(0.0))
        );
        assert!(matches!(
            LogNormalPrior::new(f64::INFINITY, 1.0),
            Err(PriorError::NonFiniteLocation(_))
        ));
    }
}
