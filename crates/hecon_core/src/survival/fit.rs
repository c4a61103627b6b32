//! Maximum-likelihood fits of censored time-to-event data

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::family::{FLOOR, SurvivalFamily, SurvivalParams};
use crate::error::{EngineError, Result};
use crate::optimization::{BisectionOptions, NelderMeadOptions, bisect, minimize_nelder_mead};
use crate::stats::{linspace, mean, trapezoid};

/// Returned to the optimizer for parameters with a non-finite likelihood
const PENALTY: f64 = 1e10;

const RMST_POINTS: usize = 100;
const MEDIAN_BRACKET: (f64, f64) = (0.001, 1000.0);

/// Observed times with event flags (1 = event, 0 = censored)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalData {
    pub times: Vec<f64>,
    pub events: Vec<u8>,
}

impl SurvivalData {
    pub fn new(times: Vec<f64>, events: Vec<u8>) -> Result<Self> {
        let data = Self { times, events };
        data.validate()?;
        Ok(data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.times.is_empty() {
            return Err(EngineError::EmptyDataset);
        }
        if self.times.len() != self.events.len() {
            return Err(EngineError::InvalidSurvivalData(format!(
                "{} times but {} event flags",
                self.times.len(),
                self.events.len()
            )));
        }
        if let Some(t) = self.times.iter().find(|t| !(t.is_finite() && **t >= 0.0)) {
            return Err(EngineError::InvalidSurvivalData(format!(
                "times must be finite and non-negative, got {t}"
            )));
        }
        if let Some(e) = self.events.iter().find(|&&e| e > 1) {
            return Err(EngineError::InvalidSurvivalData(format!(
                "event flags must be 0 or 1, got {e}"
            )));
        }
        if self.n_events() == 0 {
            return Err(EngineError::InvalidSurvivalData(
                "no observed events".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[must_use]
    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e == 1).count()
    }

    #[must_use]
    pub fn max_time(&self) -> f64 {
        self.times.iter().copied().fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub family: SurvivalFamily,
    pub scale: f64,
    pub shape: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    /// `None` when `S(t)` does not cross 0.5 on `[0.001, 1000]`
    pub median_survival: Option<f64>,
    /// Restricted mean survival up to the last observed time
    pub rmst: f64,
    pub iterations: usize,
}

impl FitResult {
    #[must_use]
    pub fn params(&self) -> SurvivalParams {
        SurvivalParams::new(self.family, self.scale, self.shape)
    }
}

/// `Σ[δ ln h(t) - H(t)]`
#[must_use]
pub fn log_likelihood(params: &SurvivalParams, data: &SurvivalData) -> f64 {
    data.times
        .iter()
        .zip(&data.events)
        .map(|(&t, &event)| {
            f64::from(event) * params.hazard(t).max(FLOOR).ln() - params.cumulative_hazard(t)
        })
        .sum()
}

fn params_from_point(family: SurvivalFamily, point: &[f64]) -> SurvivalParams {
    let shape = point.get(1).map_or(1.0, |s| s.exp());
    SurvivalParams::new(family, point[0].exp(), shape)
}

/// Fit one family by Nelder-Mead over log-parameters.
pub fn fit(family: SurvivalFamily, data: &SurvivalData) -> Result<FitResult> {
    data.validate()?;

    let mean_time = mean(&data.times).unwrap_or(1.0).max(FLOOR);
    let start: Vec<f64> = match family.n_params() {
        1 => vec![mean_time.ln()],
        _ => vec![mean_time.ln(), 0.0],
    };

    let objective = |point: &[f64]| {
        let ll = log_likelihood(&params_from_point(family, point), data);
        if ll.is_finite() { -ll } else { PENALTY }
    };

    let minimum = minimize_nelder_mead(objective, &start, &NelderMeadOptions::default());
    if !minimum.converged() {
        return Err(EngineError::NonConvergence {
            iterations: minimum.iterations,
        });
    }

    let params = params_from_point(family, &minimum.point);
    let ll = -minimum.value;
    if !(ll.is_finite() && minimum.value < PENALTY) {
        return Err(EngineError::NonFinite(format!(
            "{family} log-likelihood at the optimum"
        )));
    }

    let k = family.n_params() as f64;
    let n = data.len() as f64;

    let grid = linspace(0.0, data.max_time(), RMST_POINTS);
    let curve: Vec<f64> = grid.iter().map(|&t| params.survival(t)).collect();
    let rmst = trapezoid(&grid, &curve);

    let median_survival = bisect(
        |t| params.survival(t) - 0.5,
        MEDIAN_BRACKET.0,
        MEDIAN_BRACKET.1,
        &BisectionOptions::default(),
    );

    debug!(
        family = %family,
        scale = params.scale,
        shape = params.shape,
        log_likelihood = ll,
        iterations = minimum.iterations,
        "survival fit converged"
    );

    Ok(FitResult {
        family,
        scale: params.scale,
        shape: params.shape,
        log_likelihood: ll,
        aic: 2.0 * k - 2.0 * ll,
        bic: k * n.ln() - 2.0 * ll,
        median_survival,
        rmst,
        iterations: minimum.iterations,
    })
}

/// Fit every family; each entry carries the fit or the reason it failed.
pub fn compare_distributions(data: &SurvivalData) -> Vec<(SurvivalFamily, Result<FitResult>)> {
    SurvivalFamily::ALL
        .into_iter()
        .map(|family| (family, fit(family, data)))
        .collect()
}
