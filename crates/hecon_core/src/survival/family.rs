use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Gamma};
use statrs::function::erf::erfc;

use crate::error::EngineError;

/// Floor applied to times, survival and hazards before taking logs or
/// dividing.
pub(crate) const FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurvivalFamily {
    Exponential,
    Weibull,
    #[serde(alias = "log_normal")]
    Lognormal,
    #[serde(alias = "log_logistic")]
    Loglogistic,
    Gompertz,
    Gamma,
}

impl SurvivalFamily {
    pub const ALL: [SurvivalFamily; 6] = [
        SurvivalFamily::Exponential,
        SurvivalFamily::Weibull,
        SurvivalFamily::Lognormal,
        SurvivalFamily::Loglogistic,
        SurvivalFamily::Gompertz,
        SurvivalFamily::Gamma,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SurvivalFamily::Exponential => "exponential",
            SurvivalFamily::Weibull => "weibull",
            SurvivalFamily::Lognormal => "lognormal",
            SurvivalFamily::Loglogistic => "loglogistic",
            SurvivalFamily::Gompertz => "gompertz",
            SurvivalFamily::Gamma => "gamma",
        }
    }

    /// Free parameters in the likelihood; the exponential fixes shape at 1.
    #[must_use]
    pub fn n_params(&self) -> usize {
        match self {
            SurvivalFamily::Exponential => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for SurvivalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SurvivalFamily {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace(['_', '-'], "");
        SurvivalFamily::ALL
            .into_iter()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| EngineError::UnknownDistribution(s.to_string()))
    }
}

/// Standard normal survival `1 - Φ(z)`
fn normal_sf(z: f64) -> f64 {
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// A parametric survival distribution with concrete parameters.
///
/// `scale` is in time units for every family. `shape` is the Weibull and
/// log-logistic shape, the log-normal `σ`, the Gompertz rate of ageing `a`
/// (with initial hazard `1/scale`) and the gamma shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurvivalParams {
    pub family: SurvivalFamily,
    pub scale: f64,
    pub shape: f64,
}

impl SurvivalParams {
    #[must_use]
    pub fn new(family: SurvivalFamily, scale: f64, shape: f64) -> Self {
        Self {
            family,
            scale,
            shape,
        }
    }

    /// `S(t)`
    #[must_use]
    pub fn survival(&self, t: f64) -> f64 {
        let (scale, shape) = (self.scale, self.shape);
        match self.family {
            SurvivalFamily::Exponential => (-t / scale).exp(),
            SurvivalFamily::Weibull => (-(t / scale).powf(shape)).exp(),
            SurvivalFamily::Lognormal => {
                normal_sf((t.max(FLOOR).ln() - scale.ln()) / shape)
            }
            SurvivalFamily::Loglogistic => 1.0 / (1.0 + (t / scale).powf(shape)),
            SurvivalFamily::Gompertz => {
                let b = 1.0 / scale;
                (-(b / shape) * ((shape * t).exp() - 1.0)).exp()
            }
            SurvivalFamily::Gamma => match Gamma::new(shape, 1.0 / scale) {
                Ok(gamma) => gamma.sf(t),
                Err(_) => f64::NAN,
            },
        }
    }

    /// `h(t)`, evaluated at `max(t, 1e-10)`
    #[must_use]
    pub fn hazard(&self, t: f64) -> f64 {
        let t = t.max(FLOOR);
        let (scale, shape) = (self.scale, self.shape);
        match self.family {
            SurvivalFamily::Exponential => 1.0 / scale,
            SurvivalFamily::Weibull => (shape / scale) * (t / scale).powf(shape - 1.0),
            SurvivalFamily::Lognormal => {
                let z = (t.ln() - scale.ln()) / shape;
                let pdf = normal_pdf(z) / (t * shape);
                pdf / self.survival(t).max(FLOOR)
            }
            SurvivalFamily::Loglogistic => {
                let ratio = t / scale;
                (shape / scale) * ratio.powf(shape - 1.0) / (1.0 + ratio.powf(shape))
            }
            SurvivalFamily::Gompertz => (shape * t).exp() / scale,
            SurvivalFamily::Gamma => match Gamma::new(shape, 1.0 / scale) {
                Ok(gamma) => gamma.pdf(t) / self.survival(t).max(FLOOR),
                Err(_) => f64::NAN,
            },
        }
    }

    /// `H(t) = -ln S(t)`, with `S` floored at 1e-10
    #[must_use]
    pub fn cumulative_hazard(&self, t: f64) -> f64 {
        -self.survival(t).max(FLOOR).ln()
    }

    /// Survival with the cumulative hazard scaled by `hazard_ratio`
    #[must_use]
    pub fn survival_with_hr(&self, t: f64, hazard_ratio: f64) -> f64 {
        if hazard_ratio == 1.0 {
            self.survival(t)
        } else {
            (-self.cumulative_hazard(t) * hazard_ratio).exp()
        }
    }

    /// Probability of leaving the state during each of `n_cycles` cycles,
    /// `1 - S(t_end) / S(t_start)` clipped to `[0, 1]`.
    #[must_use]
    pub fn transition_probabilities(
        &self,
        cycle_length: f64,
        n_cycles: usize,
        hazard_ratio: f64,
    ) -> Vec<f64> {
        (0..n_cycles)
            .map(|cycle| {
                let s_start = self.survival_with_hr(cycle as f64 * cycle_length, hazard_ratio);
                let s_end = self.survival_with_hr((cycle + 1) as f64 * cycle_length, hazard_ratio);
                let p = if s_start > 0.0 {
                    1.0 - s_end / s_start
                } else {
                    1.0
                };
                p.clamp(0.0, 1.0)
            })
            .collect()
    }

    /// Evaluate the curve at `times`.
    #[must_use]
    pub fn predict(&self, times: &[f64], hazard_ratio: f64) -> SurvivalCurve {
        let cumulative_hazard: Vec<f64> = times
            .iter()
            .map(|&t| self.cumulative_hazard(t) * hazard_ratio)
            .collect();
        SurvivalCurve {
            times: times.to_vec(),
            survival: cumulative_hazard.iter().map(|h| (-h).exp()).collect(),
            hazard: times.iter().map(|&t| self.hazard(t) * hazard_ratio).collect(),
            cumulative_hazard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivalCurve {
    pub times: Vec<f64>,
    pub survival: Vec<f64>,
    pub hazard: Vec<f64>,
    pub cumulative_hazard: Vec<f64>,
}
