//! Tornado ranking and one-way sweeps over the 3-state model

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::economics::IcerResult;
use crate::error::{EngineError, Result};
use crate::markov::three_state;
use crate::markov::{CohortParameter, CohortParams, TraceMode};

/// One bar of the tornado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterRange {
    pub parameter: CohortParameter,
    pub low: f64,
    pub high: f64,
}

impl ParameterRange {
    pub fn new(parameter: CohortParameter, low: f64, high: f64) -> Self {
        Self {
            parameter,
            low,
            high,
        }
    }
}

/// ICER, ΔC and ΔE at each listed value of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneWayRequest {
    pub parameter: CohortParameter,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TornadoRequest {
    #[serde(default)]
    pub base: CohortParams,
    #[serde(default)]
    pub parameters: Vec<ParameterRange>,
    #[serde(default)]
    pub sweeps: Vec<OneWayRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TornadoEntry {
    pub parameter: CohortParameter,
    pub base_value: f64,
    pub low: f64,
    pub high: f64,
    pub icer_low: f64,
    pub icer_high: f64,
    /// `|icer_high - icer_low|`, infinite when exactly one side is
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneWayPoint {
    pub value: f64,
    pub icer: f64,
    pub delta_cost: f64,
    pub delta_effect: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneWaySweep {
    pub parameter: CohortParameter,
    pub base_value: f64,
    pub points: Vec<OneWayPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TornadoAnalysis {
    pub base_icer: f64,
    /// Widest swing first
    pub entries: Vec<TornadoEntry>,
    pub sweeps: Vec<OneWaySweep>,
}

fn compare_at(params: &CohortParams) -> Result<IcerResult> {
    three_state::run(params, TraceMode::SummaryOnly).map(|comparison| comparison.icer)
}

/// Evaluate every parameter set, in order, failing on the first error.
fn compare_all(runs: &[CohortParams]) -> Result<Vec<IcerResult>> {
    #[cfg(feature = "parallel")]
    let results = runs.par_iter().map(compare_at).collect();

    #[cfg(not(feature = "parallel"))]
    let results = runs.iter().map(compare_at).collect();

    results
}

fn impact(icer_low: f64, icer_high: f64) -> f64 {
    // Equal infinities would otherwise give NaN
    if icer_low == icer_high {
        0.0
    } else {
        (icer_high - icer_low).abs()
    }
}

/// Run the 3-state model at each bound of every range, then rank the
/// ranges by ICER swing. Ties keep request order.
pub fn tornado(base: &CohortParams, ranges: &[ParameterRange]) -> Result<Vec<TornadoEntry>> {
    let runs: Vec<CohortParams> = ranges
        .iter()
        .flat_map(|r| [base.with(r.parameter, r.low), base.with(r.parameter, r.high)])
        .collect();
    let icers = compare_all(&runs)?;

    let mut entries: Vec<TornadoEntry> = ranges
        .iter()
        .zip(icers.chunks_exact(2))
        .map(|(range, pair)| {
            let (icer_low, icer_high) = (pair[0].icer, pair[1].icer);
            TornadoEntry {
                parameter: range.parameter,
                base_value: range.parameter.get(base),
                low: range.low,
                high: range.high,
                icer_low,
                icer_high,
                impact: impact(icer_low, icer_high),
            }
        })
        .collect();

    entries.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    Ok(entries)
}

pub fn one_way(base: &CohortParams, request: &OneWayRequest) -> Result<OneWaySweep> {
    let runs: Vec<CohortParams> = request
        .values
        .iter()
        .map(|&value| base.with(request.parameter, value))
        .collect();
    let icers = compare_all(&runs)?;

    let points = request
        .values
        .iter()
        .zip(icers)
        .map(|(&value, result)| OneWayPoint {
            value,
            icer: result.icer,
            delta_cost: result.delta_cost,
            delta_effect: result.delta_effect,
        })
        .collect();

    Ok(OneWaySweep {
        parameter: request.parameter,
        base_value: request.parameter.get(base),
        points,
    })
}

pub fn run(request: &TornadoRequest) -> Result<TornadoAnalysis> {
    if request.parameters.is_empty() && request.sweeps.is_empty() {
        return Err(EngineError::config(
            "tornado request lists no parameter ranges or sweeps",
        ));
    }

    let base_icer = compare_at(&request.base)?.icer;
    let entries = tornado(&request.base, &request.parameters)?;
    let sweeps = request
        .sweeps
        .iter()
        .map(|sweep| one_way(&request.base, sweep))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        parameters = entries.len(),
        sweeps = sweeps.len(),
        base_icer,
        "tornado analysis complete"
    );

    Ok(TornadoAnalysis {
        base_icer,
        entries,
        sweeps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: TornadoRequest = serde_json::from_str(
            r#"{"parameters": [{"parameter": "cost_drug_a", "low": 2500, "high": 4500}]}"#,
        )
        .unwrap();
        assert_eq!(request.base, CohortParams::default());
        assert_eq!(request.parameters[0].parameter, CohortParameter::CostDrugA);
        assert!(request.sweeps.is_empty());

        let unknown = r#"{"parameters": [{"parameter": "cost_drug_z", "low": 1, "high": 2}]}"#;
        assert!(serde_json::from_str::<TornadoRequest>(unknown).is_err());
    }

    #[test]
    fn test_ranked_by_impact() {
        let base = CohortParams::default();
        let ranges = vec![
            ParameterRange::new(CohortParameter::CostStateS, 180.0, 220.0),
            ParameterRange::new(CohortParameter::CostDrugA, 2500.0, 4500.0),
            ParameterRange::new(CohortParameter::UtilityStable, 0.8, 0.9),
        ];
        let entries = tornado(&base, &ranges).unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].impact >= w[1].impact));
        // The drug price moves the ICER far more than the stable state cost
        assert_eq!(entries[0].parameter, CohortParameter::CostDrugA);
        assert_eq!(entries[0].base_value, 3500.0);
        assert!(entries[0].icer_high > entries[0].icer_low);
    }

    #[test]
    fn test_equal_bounds_have_no_impact() {
        let base = CohortParams::default();
        let ranges = vec![
            ParameterRange::new(CohortParameter::CostStateP, 4500.0, 4500.0),
            ParameterRange::new(CohortParameter::CostDrugB, 500.0, 500.0),
        ];
        let entries = tornado(&base, &ranges).unwrap();
        assert!(entries.iter().all(|e| e.impact == 0.0));
        // Stable sort keeps request order for ties
        assert_eq!(entries[0].parameter, CohortParameter::CostStateP);
    }

    #[test]
    fn test_infinite_impact_ranks_first() {
        let base = CohortParams::default();
        let ranges = vec![
            ParameterRange::new(CohortParameter::CostDrugA, 2500.0, 4500.0),
            // Same progression for both drugs at the high bound: ΔE = 0
            ParameterRange::new(CohortParameter::ProbSToPA, 0.05, 0.25),
        ];
        let entries = tornado(&base, &ranges).unwrap();
        assert_eq!(entries[0].parameter, CohortParameter::ProbSToPA);
        assert!(entries[0].icer_high.is_infinite());
        assert_eq!(entries[0].impact, f64::INFINITY);
    }

    #[test]
    fn test_engine_errors_surface() {
        let base = CohortParams::default();
        let ranges = vec![ParameterRange::new(CohortParameter::ProbSToD, 0.01, 0.95)];
        assert!(matches!(
            tornado(&base, &ranges),
            Err(EngineError::InvalidTransitions { .. })
        ));
    }

    #[test]
    fn test_one_way_sweep() {
        let base = CohortParams::default();
        let request = OneWayRequest {
            parameter: CohortParameter::CostDrugA,
            values: vec![3000.0, 3500.0, 4000.0],
        };
        let sweep = one_way(&base, &request).unwrap();
        assert_eq!(sweep.points.len(), 3);
        assert!(sweep.points.windows(2).all(|w| w[0].delta_cost < w[1].delta_cost));
        // Drug price leaves effects untouched
        let effect = sweep.points[0].delta_effect;
        assert!(sweep.points.iter().all(|p| (p.delta_effect - effect).abs() < 1e-12));

        let base_icer = compare_at(&base).unwrap().icer;
        assert!((sweep.points[1].icer - base_icer).abs() < 1e-9);
    }

    #[test]
    fn test_empty_request_is_an_error() {
        assert!(matches!(
            run(&TornadoRequest::default()),
            Err(EngineError::Config(_))
        ));
    }
}
