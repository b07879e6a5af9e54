//! Run configuration, read from TOML.
//!
//! Every field except the priors has a default, so the smallest valid file is
//!
//! ```toml
//! [priors.nb]
//! mu = 2.0
//! tau = 1.0
//!
//! [priors.density]
//! mu = 0.0
//! tau = 1.0
//! ```

use crate::data::CoordinateMode;
use crate::identity::ModelKind;
use crate::inference::{DEFAULT_TUNE_INTERVAL, InferenceSettings};
use crate::prior::{LogNormalPrior, PriorError};
use crate::sampler::DEFAULT_PROPOSAL_SCALE;
use crate::series::DEFAULT_SERIES_TERMS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Invalid prior on {parameter}: {source}")]
    Prior {
        parameter: &'static str,
        source: PriorError,
    },
}

/// Log-normal priors on the two sampled parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorConfig {
    pub nb: LogNormalPrior,
    pub density: LogNormalPrior,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub mutation_rate: f64,
    pub nb_start: f64,
    pub density_start: f64,
    pub coordinates: CoordinateMode,
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub seed: Option<u64>,
    /// Also run the distance-free model and compare DIC.
    pub model_comparison: bool,
    pub posterior_predictive: bool,
    pub series_terms: usize,
    pub credible_level: f64,
    pub tune_interval: usize,
    pub initial_scale: f64,
    pub priors: Option<PriorConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 1e-4,
            nb_start: 10.0,
            density_start: 1.0,
            coordinates: CoordinateMode::Planar,
            iterations: 10_000,
            burn_in: 2_000,
            thin: 1,
            seed: None,
            model_comparison: false,
            posterior_predictive: false,
            series_terms: DEFAULT_SERIES_TERMS,
            credible_level: 0.95,
            tune_interval: DEFAULT_TUNE_INTERVAL,
            initial_scale: DEFAULT_PROPOSAL_SCALE,
            priors: None,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn positive_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive and finite, got {value}")))
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Checks value ranges. Missing priors are reported by the engine, not
    /// here, so a partial configuration can still be validated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_finite("mutation_rate", self.mutation_rate)?;
        positive_finite("nb_start", self.nb_start)?;
        positive_finite("density_start", self.density_start)?;
        positive_finite("initial_scale", self.initial_scale)?;
        if self.iterations <= self.burn_in {
            return Err(invalid(
                "iterations",
                format!("must exceed burn_in ({} <= {})", self.iterations, self.burn_in),
            ));
        }
        if self.thin == 0 {
            return Err(invalid("thin", "must be at least 1"));
        }
        if self.series_terms == 0 {
            return Err(invalid("series_terms", "must be at least 1"));
        }
        if self.tune_interval == 0 {
            return Err(invalid("tune_interval", "must be at least 1"));
        }
        if !(self.credible_level > 0.0 && self.credible_level < 1.0) {
            return Err(invalid(
                "credible_level",
                format!("must lie strictly between 0 and 1, got {}", self.credible_level),
            ));
        }
        if let Some(priors) = &self.priors {
            priors.nb.validate().map_err(|source| ConfigError::Prior {
                parameter: "nb",
                source,
            })?;
            priors.density.validate().map_err(|source| ConfigError::Prior {
                parameter: "density",
                source,
            })?;
        }
        Ok(())
    }

    /// Engine settings for one model of this run.
    pub fn inference_settings(&self, model: ModelKind) -> InferenceSettings {
        InferenceSettings {
            mutation_rate: self.mutation_rate,
            series_terms: self.series_terms,
            nb_start: self.nb_start,
            density_start: self.density_start,
            model,
            posterior_predictive: self.posterior_predictive,
            tune_interval: self.tune_interval,
            initial_scale: self.initial_scale,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[priors.nb]
mu = 2.0
tau = 1.0

[priors.density]
mu = 0.0
tau = 0.5
"#;

    #[test]
    fn minimal_file_fills_defaults() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        let priors = config.priors.unwrap();
        assert_eq!(priors.nb, LogNormalPrior { mu: 2.0, tau: 1.0 });
        assert_eq!(priors.density, LogNormalPrior { mu: 0.0, tau: 0.5 });
        assert_eq!(
            RunConfig {
                priors: None,
                ..config.clone()
            },
            RunConfig::default()
        );
        config.validate().unwrap();
    }

    #[test]
    fn explicit_fields_are_read() {
        let text = format!(
            "mutation_rate = 0.001\ncoordinates = \"spherical\"\niterations = 500\nburn_in = 100\nthin = 4\nseed = 9\nmodel_comparison = true\n{MINIMAL}"
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.mutation_rate, 0.001);
        assert_eq!(config.coordinates, CoordinateMode::Spherical);
        assert_eq!((config.iterations, config.burn_in, config.thin), (500, 100, 4));
        assert_eq!(config.seed, Some(9));
        assert!(config.model_comparison);

        let settings = config.inference_settings(ModelKind::Null);
        assert_eq!(settings.model, ModelKind::Null);
        assert_eq!(settings.seed, Some(9));
        assert_eq!(settings.mutation_rate, 0.001);
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        let config = RunConfig {
            seed: Some(5),
            ..RunConfig::from_toml_str(MINIMAL).unwrap()
        };
        config.save(&path).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = RunConfig::from_toml_str("iterationz = 5").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError(_)));
    }

    #[test]
    fn validation_catches_bad_ranges() {
        let base = RunConfig::from_toml_str(MINIMAL).unwrap();
        let cases = [
            RunConfig {
                mutation_rate: 0.0,
                ..base.clone()
            },
            RunConfig {
                burn_in: 10_000,
                ..base.clone()
            },
            RunConfig {
                thin: 0,
                ..base.clone()
            },
            RunConfig {
                credible_level: 1.0,
                ..base.clone()
            },
            RunConfig {
                tune_interval: 0,
                ..base.clone()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
        }

        let bad_prior = RunConfig {
            priors: Some(PriorConfig {
                nb: LogNormalPrior { mu: 1.0, tau: -1.0 },
                density: LogNormalPrior { mu: 0.0, tau: 1.0 },
            }),
            ..base
        };
        assert!(matches!(
            bad_prior.validate(),
            Err(ConfigError::Prior { parameter: "nb", .. })
        ));
    }
}
