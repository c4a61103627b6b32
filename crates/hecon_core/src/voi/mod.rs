//! Value of information from a batch of PSA outcome samples
//!
//! EVPI is the expected gain from deciding after all parameter uncertainty
//! is resolved. EVPPI does the same for one parameter at a time, using
//! quantile bins of that parameter as a non-parametric stand-in for the
//! inner expectation. Both are reported per patient, for the affected
//! population, and over the discounted decision horizon.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::economics::net_monetary_benefit;
use crate::error::{EngineError, Result};
use crate::markov::three_state::default_wtp_threshold;
use crate::stats::{linspace, percentile_sorted};

/// Per-patient EVPI below which further research is not worth pursuing
const LOW_VALUE: f64 = 100.0;
/// Per-patient EVPI below which only targeted studies are suggested
const MODERATE_VALUE: f64 = 1000.0;

const MAX_BINS: usize = 20;
const MIN_BINS: usize = 5;
const SAMPLES_PER_BIN: usize = 50;
const RESEARCH_PRIORITIES: usize = 3;

fn default_population_size() -> u64 {
    100_000
}

fn default_decision_horizon() -> u32 {
    10
}

fn default_discount_rate() -> f64 {
    0.035
}

fn default_ceac_thresholds() -> Vec<f64> {
    linspace(0.0, 100_000.0, 21)
}

/// Outcome of one PSA iteration, per patient
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiSample {
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    pub costs: BTreeMap<String, f64>,
    #[serde(alias = "qalys")]
    pub effects: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiRequest {
    pub samples: Vec<VoiSample>,
    /// Strategies to compare; defaults to the cost keys of the first sample
    #[serde(default)]
    pub strategies: Option<Vec<String>>,
    /// Parameters to compute EVPPI for; defaults to the parameter keys of
    /// the first sample
    #[serde(default)]
    pub parameters: Option<Vec<String>>,
    #[serde(default = "default_wtp_threshold")]
    pub wtp_threshold: f64,
    #[serde(default = "default_population_size")]
    pub population_size: u64,
    /// Years over which the decision applies
    #[serde(default = "default_decision_horizon")]
    pub decision_horizon: u32,
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    #[serde(default = "default_ceac_thresholds")]
    pub ceac_thresholds: Vec<f64>,
}

impl VoiRequest {
    pub fn new(samples: Vec<VoiSample>) -> Self {
        Self {
            samples,
            strategies: None,
            parameters: None,
            wtp_threshold: default_wtp_threshold(),
            population_size: default_population_size(),
            decision_horizon: default_decision_horizon(),
            discount_rate: default_discount_rate(),
            ceac_thresholds: default_ceac_thresholds(),
        }
    }

    /// `Σ_{t=0}^{H-1} 1/(1+r)^t`
    #[must_use]
    pub fn horizon_factor(&self) -> f64 {
        (0..self.decision_horizon)
            .map(|t| (1.0 + self.discount_rate).powi(t as i32).recip())
            .sum()
    }
}

/// Per-patient, population and decision-horizon scaling of one value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaledValue {
    pub per_patient: f64,
    pub population: f64,
    pub decision_horizon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvppiResult {
    pub parameter: String,
    pub value: ScaledValue,
    /// Share of EVPI in percent, capped at 100
    pub contribution_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyCeac {
    pub strategy: String,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiAnalysis {
    pub n_samples: usize,
    pub strategies: Vec<String>,
    pub wtp_threshold: f64,
    /// Highest expected NMB under current information
    pub optimal_strategy: String,
    pub evpi: ScaledValue,
    pub probability_optimal: BTreeMap<String, f64>,
    pub ceac_thresholds: Vec<f64>,
    pub ceac: Vec<StrategyCeac>,
    /// Largest contribution first
    pub evppi: Vec<EvppiResult>,
    pub research_priorities: Vec<String>,
    pub recommendation: String,
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Costs and effects as `[sample][strategy]` matrices
struct OutcomeMatrix {
    costs: Vec<Vec<f64>>,
    effects: Vec<Vec<f64>>,
}

impl OutcomeMatrix {
    fn build(samples: &[VoiSample], strategies: &[String]) -> Result<Self> {
        let lookup = |sample: usize, values: &BTreeMap<String, f64>| {
            strategies
                .iter()
                .map(|s| {
                    values
                        .get(s)
                        .copied()
                        .ok_or_else(|| EngineError::MissingStrategyOutcome {
                            sample,
                            strategy: s.clone(),
                        })
                })
                .collect::<Result<Vec<f64>>>()
        };

        let mut costs = Vec::with_capacity(samples.len());
        let mut effects = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            costs.push(lookup(i, &sample.costs)?);
            effects.push(lookup(i, &sample.effects)?);
        }
        Ok(Self { costs, effects })
    }

    fn nmb(&self, wtp: f64) -> Vec<Vec<f64>> {
        self.costs
            .iter()
            .zip(&self.effects)
            .map(|(costs, effects)| {
                costs
                    .iter()
                    .zip(effects)
                    .map(|(&c, &e)| net_monetary_benefit(c, e, wtp))
                    .collect()
            })
            .collect()
    }
}

/// Mean of each column
fn column_means(rows: &[Vec<f64>], n_columns: usize) -> Vec<f64> {
    let mut sums = vec![0.0; n_columns];
    for row in rows {
        for (sum, v) in sums.iter_mut().zip(row) {
            *sum += v;
        }
    }
    let n = rows.len() as f64;
    sums.into_iter().map(|s| s / n).collect()
}

/// Share of samples in which each strategy has the highest NMB
fn optimal_shares(nmb: &[Vec<f64>], n_strategies: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_strategies];
    for row in nmb {
        counts[argmax(row)] += 1;
    }
    counts
        .into_iter()
        .map(|c| c as f64 / nmb.len() as f64)
        .collect()
}

/// `mean(max NMB) - max(mean NMB)`, clamped at 0
#[must_use]
pub fn evpi(nmb: &[Vec<f64>]) -> f64 {
    if nmb.is_empty() {
        return 0.0;
    }
    let n_strategies = nmb[0].len();
    let expected_max = nmb.iter().map(|row| max_of(row)).sum::<f64>() / nmb.len() as f64;
    let max_expected = max_of(&column_means(nmb, n_strategies));
    (expected_max - max_expected).max(0.0)
}

/// Number of quantile bins for `n` samples
#[must_use]
pub fn bin_count(n: usize) -> usize {
    (n / SAMPLES_PER_BIN).min(MAX_BINS).max(MIN_BINS)
}

/// EVPPI of the parameter taking `values[i]` in sample `i`.
///
/// Samples are grouped into quantile bins of the parameter; the expected
/// value with the parameter known is the size-weighted mean over bins of
/// the best strategy's mean NMB within the bin.
#[must_use]
pub fn evppi(values: &[f64], nmb: &[Vec<f64>]) -> f64 {
    if nmb.is_empty() || values.len() != nmb.len() {
        return 0.0;
    }
    let n = nmb.len();
    let n_strategies = nmb[0].len();
    let n_bins = bin_count(n);

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    // Inner edges only; a value equal to an edge falls in the upper bin
    let edges: Vec<f64> = linspace(0.0, 100.0, n_bins + 1)[1..n_bins]
        .iter()
        .filter_map(|&q| percentile_sorted(&sorted, q))
        .collect();

    let mut bins: Vec<Vec<Vec<f64>>> = vec![Vec::new(); n_bins];
    for (value, row) in values.iter().zip(nmb) {
        let bin = edges.partition_point(|&edge| edge <= *value);
        bins[bin].push(row.clone());
    }

    let expected_with_info: f64 = bins
        .iter()
        .filter(|rows| !rows.is_empty())
        .map(|rows| max_of(&column_means(rows, n_strategies)) * rows.len() as f64)
        .sum::<f64>()
        / n as f64;
    let max_expected = max_of(&column_means(nmb, n_strategies));

    (expected_with_info - max_expected).max(0.0)
}

fn recommendation(evpi_per_patient: f64, top_parameter: Option<&str>) -> String {
    if evpi_per_patient < LOW_VALUE {
        "Low value of additional research. Current evidence sufficient for decision.".to_string()
    } else if evpi_per_patient < MODERATE_VALUE {
        "Moderate value of additional research. Consider targeted studies.".to_string()
    } else {
        match top_parameter {
            Some(parameter) => format!(
                "High value of additional research. Priority: reduce uncertainty in {parameter}."
            ),
            None => "High value of additional research. Consider comprehensive clinical trial."
                .to_string(),
        }
    }
}

pub fn run(request: &VoiRequest) -> Result<VoiAnalysis> {
    let first = request.samples.first().ok_or(EngineError::EmptyBatch)?;
    let strategies: Vec<String> = match &request.strategies {
        Some(strategies) => strategies.clone(),
        None => first.costs.keys().cloned().collect(),
    };
    if strategies.len() < 2 {
        return Err(EngineError::InsufficientStrategies(strategies.len()));
    }
    let parameters: Vec<String> = match &request.parameters {
        Some(parameters) => parameters.clone(),
        None => first.parameters.keys().cloned().collect(),
    };

    let outcomes = OutcomeMatrix::build(&request.samples, &strategies)?;
    let n_strategies = strategies.len();
    let wtp = request.wtp_threshold;
    let nmb = outcomes.nmb(wtp);

    let population = request.population_size as f64;
    let horizon = request.horizon_factor();
    let scale = |per_patient: f64| ScaledValue {
        per_patient,
        population: per_patient * population,
        decision_horizon: per_patient * population * horizon,
    };

    let evpi_per_patient = evpi(&nmb);
    let optimal = argmax(&column_means(&nmb, n_strategies));
    let probability_optimal = strategies
        .iter()
        .cloned()
        .zip(optimal_shares(&nmb, n_strategies))
        .collect();

    let mut ceac: Vec<StrategyCeac> = strategies
        .iter()
        .map(|s| StrategyCeac {
            strategy: s.clone(),
            probabilities: Vec::with_capacity(request.ceac_thresholds.len()),
        })
        .collect();
    for &threshold in &request.ceac_thresholds {
        let shares = optimal_shares(&outcomes.nmb(threshold), n_strategies);
        for (curve, share) in ceac.iter_mut().zip(shares) {
            curve.probabilities.push(share);
        }
    }

    let mut evppi_results = parameters
        .iter()
        .map(|parameter| {
            let values = request
                .samples
                .iter()
                .enumerate()
                .map(|(i, sample)| {
                    sample.parameters.get(parameter).copied().ok_or_else(|| {
                        EngineError::config(format!(
                            "sample {i} has no value for parameter '{parameter}'"
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            let per_patient = evppi(&values, &nmb).min(evpi_per_patient);
            let contribution_pct = if evpi_per_patient > 0.0 {
                (per_patient / evpi_per_patient * 100.0).min(100.0)
            } else {
                0.0
            };
            Ok(EvppiResult {
                parameter: parameter.clone(),
                value: scale(per_patient),
                contribution_pct,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    evppi_results.sort_by(|a, b| b.contribution_pct.total_cmp(&a.contribution_pct));

    let research_priorities = evppi_results
        .iter()
        .take(RESEARCH_PRIORITIES)
        .map(|r| r.parameter.clone())
        .collect();
    let recommendation = recommendation(
        evpi_per_patient,
        evppi_results.first().map(|r| r.parameter.as_str()),
    );

    debug!(
        samples = request.samples.len(),
        strategies = n_strategies,
        evpi = evpi_per_patient,
        "value of information computed"
    );

    Ok(VoiAnalysis {
        n_samples: request.samples.len(),
        optimal_strategy: strategies[optimal].clone(),
        strategies,
        wtp_threshold: wtp,
        evpi: scale(evpi_per_patient),
        probability_optimal,
        ceac_thresholds: request.ceac_thresholds.clone(),
        ceac,
        evppi: evppi_results,
        research_priorities,
        recommendation,
    })
}
