use serde::{Deserialize, Serialize};

use super::family::{SurvivalCurve, SurvivalFamily};
use super::fit::{FitResult, SurvivalData, compare_distributions, fit};
use crate::error::{EngineError, Result};
use crate::stats::linspace;

const CURVE_POINTS: usize = 50;
const CURVE_START: f64 = 0.1;

fn default_family() -> SurvivalFamily {
    SurvivalFamily::Weibull
}

fn default_hazard_ratio() -> f64 {
    1.0
}

fn default_cycle_length() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurvivalRequest {
    pub times: Vec<f64>,
    pub events: Vec<u8>,

    #[serde(default = "default_family")]
    pub distribution: SurvivalFamily,

    /// End of the predicted curve; 1.5 times the last observation when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time: Option<f64>,

    /// Adds a comparison curve when different from 1
    #[serde(default = "default_hazard_ratio")]
    pub hazard_ratio: f64,

    #[serde(default = "default_cycle_length")]
    pub cycle_length: f64,

    /// Cycles of transition probabilities; `floor(max_time / cycle_length)`
    /// when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_cycles: Option<usize>,

    /// Also fit every other family
    #[serde(default)]
    pub compare_distributions: bool,
}

impl SurvivalRequest {
    pub fn new(times: Vec<f64>, events: Vec<u8>) -> Self {
        Self {
            times,
            events,
            distribution: default_family(),
            max_time: None,
            hazard_ratio: default_hazard_ratio(),
            cycle_length: default_cycle_length(),
            n_cycles: None,
            compare_distributions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyComparison {
    pub family: SurvivalFamily,
    pub fit: Option<FitResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivalAnalysis {
    pub fit: FitResult,
    pub curve: SurvivalCurve,
    pub hazard_ratio: f64,
    pub comparison_curve: Option<SurvivalCurve>,
    pub cycle_length: f64,
    /// Per-cycle probability of an event, from the fitted curve
    pub transition_probabilities: Vec<f64>,
    pub comparisons: Option<Vec<FamilyComparison>>,
}

pub fn run(request: &SurvivalRequest) -> Result<SurvivalAnalysis> {
    let data = SurvivalData::new(request.times.clone(), request.events.clone())?;

    if !(request.hazard_ratio > 0.0 && request.hazard_ratio.is_finite()) {
        return Err(EngineError::config("hazard_ratio must be positive"));
    }
    if !(request.cycle_length > 0.0 && request.cycle_length.is_finite()) {
        return Err(EngineError::config("cycle_length must be positive"));
    }
    let max_time = request.max_time.unwrap_or(1.5 * data.max_time());
    if !(max_time > CURVE_START && max_time.is_finite()) {
        return Err(EngineError::config(format!(
            "max_time must exceed {CURVE_START}"
        )));
    }

    let fitted = fit(request.distribution, &data)?;
    let params = fitted.params();

    let times = linspace(CURVE_START, max_time, CURVE_POINTS);
    let curve = params.predict(&times, 1.0);
    let comparison_curve =
        (request.hazard_ratio != 1.0).then(|| params.predict(&times, request.hazard_ratio));

    let n_cycles = request
        .n_cycles
        .unwrap_or((max_time / request.cycle_length).floor() as usize);
    let transition_probabilities = params.transition_probabilities(request.cycle_length, n_cycles, 1.0);

    let comparisons = request.compare_distributions.then(|| {
        compare_distributions(&data)
            .into_iter()
            .map(|(family, outcome)| match outcome {
                Ok(fit) => FamilyComparison {
                    family,
                    fit: Some(fit),
                    error: None,
                },
                Err(e) => FamilyComparison {
                    family,
                    fit: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    });

    Ok(SurvivalAnalysis {
        fit: fitted,
        curve,
        hazard_ratio: request.hazard_ratio,
        comparison_curve,
        cycle_length: request.cycle_length,
        transition_probabilities,
        comparisons,
    })
}
