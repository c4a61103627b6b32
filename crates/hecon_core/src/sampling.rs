//! Parameter distributions for probabilistic sensitivity analysis.
//!
//! Each variant maps onto a `rand_distr` distribution. Construction errors
//! are reported per draw so a bad declaration fails the whole PSA request
//! before any iteration runs (see [`ParameterDistribution::validate`]).

use rand::{Rng, distr::Distribution};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterDistribution {
    /// Probabilities and utilities bounded in [0, 1]
    Beta { alpha: f64, beta: f64 },
    /// Right-skewed, non-negative quantities such as costs
    Gamma { shape: f64, scale: f64 },
    Normal { mean: f64, std: f64 },
    /// `mean`/`std` are on the log scale, as numpy's `lognormal`
    #[serde(alias = "log_normal")]
    Lognormal { mean: f64, std: f64 },
    Uniform { min: f64, max: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    /// A constant, useful to pin a parameter inside a PSA request
    Fixed { value: f64 },
}

impl ParameterDistribution {
    /// Family name as used in requests
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            ParameterDistribution::Beta { .. } => "beta",
            ParameterDistribution::Gamma { .. } => "gamma",
            ParameterDistribution::Normal { .. } => "normal",
            ParameterDistribution::Lognormal { .. } => "lognormal",
            ParameterDistribution::Uniform { .. } => "uniform",
            ParameterDistribution::Triangular { .. } => "triangular",
            ParameterDistribution::Fixed { .. } => "fixed",
        }
    }

    /// Draw a single value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, EngineError> {
        let family = self.family();
        let invalid = |e: &dyn std::fmt::Display| EngineError::InvalidDistributionParameters {
            family,
            reason: e.to_string(),
        };

        match self {
            ParameterDistribution::Beta { alpha, beta } => rand_distr::Beta::new(*alpha, *beta)
                .map(|d| d.sample(rng))
                .map_err(|e| invalid(&e)),
            ParameterDistribution::Gamma { shape, scale } => {
                rand_distr::Gamma::new(*shape, *scale)
                    .map(|d| d.sample(rng))
                    .map_err(|e| invalid(&e))
            }
            ParameterDistribution::Normal { mean, std } => rand_distr::Normal::new(*mean, *std)
                .map(|d| d.sample(rng))
                .map_err(|e| invalid(&e)),
            ParameterDistribution::Lognormal { mean, std } => {
                rand_distr::LogNormal::new(*mean, *std)
                    .map(|d| d.sample(rng))
                    .map_err(|e| invalid(&e))
            }
            ParameterDistribution::Uniform { min, max } => {
                rand::distr::Uniform::new_inclusive(*min, *max)
                    .map(|d| d.sample(rng))
                    .map_err(|e| invalid(&e))
            }
            ParameterDistribution::Triangular { min, mode, max } => {
                rand_distr::Triangular::new(*min, *max, *mode)
                    .map(|d| d.sample(rng))
                    .map_err(|e| invalid(&e))
            }
            ParameterDistribution::Fixed { value } => {
                if value.is_finite() {
                    Ok(*value)
                } else {
                    Err(EngineError::InvalidDistributionParameters {
                        family,
                        reason: "value must be finite".to_string(),
                    })
                }
            }
        }
    }

    /// Check the parameters without consuming randomness.
    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |reason: &str| {
            Err(EngineError::InvalidDistributionParameters {
                family: self.family(),
                reason: reason.to_string(),
            })
        };
        match *self {
            ParameterDistribution::Beta { alpha, beta } if !(alpha > 0.0 && beta > 0.0) => {
                bad("alpha and beta must be positive")
            }
            ParameterDistribution::Gamma { shape, scale } if !(shape > 0.0 && scale > 0.0) => {
                bad("shape and scale must be positive")
            }
            ParameterDistribution::Normal { mean, std }
            | ParameterDistribution::Lognormal { mean, std }
                if !(mean.is_finite() && std.is_finite() && std >= 0.0) =>
            {
                bad("mean must be finite and std non-negative")
            }
            ParameterDistribution::Uniform { min, max } if !(min <= max) => {
                bad("min must not exceed max")
            }
            ParameterDistribution::Triangular { min, mode, max }
                if !(min <= mode && mode <= max && min < max) =>
            {
                bad("requires min <= mode <= max and min < max")
            }
            ParameterDistribution::Fixed { value } if !value.is_finite() => {
                bad("value must be finite")
            }
            _ => Ok(()),
        }
    }
}
