//! Request/response entry points
//!
//! Each `run_*` function takes a typed request, runs one analysis at full
//! precision, and converts the result into a response whose numbers are
//! rounded for presentation: currency and cohort counts to 2 decimals,
//! QALYs, probabilities and shares to 4. Infinite ICERs become `None` and
//! serialize as `null`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::budget_impact::{self, BudgetImpactAnalysis, BudgetImpactConfig};
use crate::decision_tree::{self, DecisionTreeRequest, NodeBody, TreeNode, TreeSensitivity};
use crate::decision_tree::{TreeAttribute, TreeStrategy};
use crate::economics::{Conclusion, FrontierEntry, FrontierStatus, IcerResult, Quadrant};
use crate::error::Result;
use crate::markov::{self, CohortParameter, CohortParams, FlexibleModelConfig};
use crate::markov::{CycleOutcome, StrategyResult, TraceMode};
use crate::sensitivity::{self, PsaRequest, TornadoRequest};
use crate::stats::{finite_currency, round_currency, round_ratio, round_to};
use crate::survival::{self, FitResult, SurvivalCurve, SurvivalFamily, SurvivalRequest};
use crate::voi::{self, ScaledValue, VoiRequest};

/// Iterations echoed back by [`run_psa`]
pub const MAX_ECHOED_ITERATIONS: usize = 1000;

fn round_all(values: &[f64], round: fn(f64) -> f64) -> Vec<f64> {
    values.iter().map(|&v| round(v)).collect()
}

// ============================================================================
// Shared pieces
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IcerSummary {
    pub comparator: String,
    pub intervention: String,
    pub delta_cost: f64,
    pub delta_effect: f64,
    pub icer: Option<f64>,
    pub quadrant: Quadrant,
    pub is_dominated: bool,
    pub is_dominant: bool,
    pub net_monetary_benefit: f64,
    pub conclusion: Conclusion,
}

impl From<&IcerResult> for IcerSummary {
    fn from(r: &IcerResult) -> Self {
        Self {
            comparator: r.comparator.clone(),
            intervention: r.intervention.clone(),
            delta_cost: round_currency(r.delta_cost),
            delta_effect: round_ratio(r.delta_effect),
            icer: finite_currency(r.icer),
            quadrant: r.quadrant,
            is_dominated: r.is_dominated,
            is_dominant: r.is_dominant,
            net_monetary_benefit: round_currency(r.net_monetary_benefit),
            conclusion: r.conclusion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycle: usize,
    pub cost: f64,
    pub qalys: f64,
    pub life_years: f64,
    pub discounted_cost: f64,
    pub discounted_qalys: f64,
    pub discounted_life_years: f64,
}

impl From<&CycleOutcome> for CycleSummary {
    fn from(c: &CycleOutcome) -> Self {
        Self {
            cycle: c.cycle,
            cost: round_currency(c.cost),
            qalys: round_ratio(c.effect),
            life_years: round_ratio(c.life_years),
            discounted_cost: round_currency(c.discounted_cost),
            discounted_qalys: round_ratio(c.discounted_effect),
            discounted_life_years: round_ratio(c.discounted_life_years),
        }
    }
}

/// Cohort totals and per-patient values of one strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    pub name: String,
    pub total_cost: f64,
    pub total_qalys: f64,
    pub total_life_years: f64,
    pub undiscounted_cost: f64,
    pub undiscounted_qalys: f64,
    pub undiscounted_life_years: f64,
    pub cost_per_patient: f64,
    pub qalys_per_patient: f64,
    pub life_years_per_patient: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<Vec<CycleSummary>>,
}

impl From<&StrategyResult> for StrategySummary {
    fn from(r: &StrategyResult) -> Self {
        Self {
            name: r.name.clone(),
            total_cost: round_currency(r.total_cost),
            total_qalys: round_ratio(r.total_effect),
            total_life_years: round_ratio(r.total_life_years),
            undiscounted_cost: round_currency(r.undiscounted_cost),
            undiscounted_qalys: round_ratio(r.undiscounted_effect),
            undiscounted_life_years: round_ratio(r.undiscounted_life_years),
            cost_per_patient: round_currency(r.cost_per_patient()),
            qalys_per_patient: round_ratio(r.effect_per_patient()),
            life_years_per_patient: round_ratio(r.life_years_per_patient()),
            trace: r.trace.as_ref().map(|trace| {
                trace
                    .iter()
                    .map(|row| round_all(row, round_currency))
                    .collect()
            }),
            cycles: r
                .cycles
                .as_ref()
                .map(|cycles| cycles.iter().map(CycleSummary::from).collect()),
        }
    }
}

// ============================================================================
// Cohort models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortAnalysisResponse {
    pub n_cycles: usize,
    pub cohort_size: f64,
    pub wtp_threshold: f64,
    pub intervention: StrategySummary,
    pub comparator: StrategySummary,
    pub icer: IcerSummary,
}

pub fn run_cohort_analysis(params: &CohortParams) -> Result<CohortAnalysisResponse> {
    let comparison = markov::three_state::run(params, TraceMode::Full)?;
    info!(
        n_cycles = comparison.n_cycles,
        icer = comparison.icer.icer,
        "cohort analysis complete"
    );

    Ok(CohortAnalysisResponse {
        n_cycles: comparison.n_cycles,
        cohort_size: round_currency(params.cohort_size),
        wtp_threshold: params.wtp_threshold,
        intervention: StrategySummary::from(&comparison.intervention),
        comparator: StrategySummary::from(&comparison.comparator),
        icer: IcerSummary::from(&comparison.icer),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontierSummary {
    pub name: String,
    pub cost: f64,
    pub qalys: f64,
    pub status: FrontierStatus,
    pub sequential_icer: Option<f64>,
}

impl From<&FrontierEntry> for FrontierSummary {
    fn from(e: &FrontierEntry) -> Self {
        Self {
            name: e.name.clone(),
            cost: round_currency(e.cost),
            qalys: round_ratio(e.effect),
            status: e.status,
            sequential_icer: e.sequential_icer.and_then(finite_currency),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexibleAnalysisResponse {
    pub model_name: String,
    pub state_names: Vec<String>,
    pub n_cycles: usize,
    pub strategies: Vec<StrategySummary>,
    /// Every strategy against the first, per patient
    pub icers: Vec<IcerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontier: Option<Vec<FrontierSummary>>,
}

pub fn run_flexible_cohort_analysis(
    config: &FlexibleModelConfig,
) -> Result<FlexibleAnalysisResponse> {
    let analysis = markov::flexible::run(config)?;
    info!(
        model = %config.model_name,
        strategies = analysis.results.len(),
        n_cycles = analysis.n_cycles,
        "flexible cohort analysis complete"
    );

    Ok(FlexibleAnalysisResponse {
        model_name: config.model_name.clone(),
        state_names: analysis.state_names,
        n_cycles: analysis.n_cycles,
        strategies: analysis.results.iter().map(StrategySummary::from).collect(),
        icers: analysis.icers.iter().map(IcerSummary::from).collect(),
        frontier: analysis
            .frontier
            .map(|entries| entries.iter().map(FrontierSummary::from).collect()),
    })
}

// ============================================================================
// Decision trees
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalSummary {
    pub name: String,
    pub probability: f64,
    pub cost: f64,
    pub effectiveness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeStrategySummary {
    pub name: String,
    pub expected_cost: f64,
    pub expected_effectiveness: f64,
    pub net_monetary_benefit: f64,
    pub outcomes: Vec<TerminalSummary>,
}

impl TreeStrategySummary {
    fn new(strategy: &TreeStrategy, wtp: f64) -> Self {
        Self {
            name: strategy.name.clone(),
            expected_cost: round_currency(strategy.expected_cost),
            expected_effectiveness: round_ratio(strategy.expected_effectiveness),
            net_monetary_benefit: round_currency(strategy.outcome().net_monetary_benefit(wtp)),
            outcomes: strategy
                .outcomes
                .iter()
                .map(|o| TerminalSummary {
                    name: o.name.clone(),
                    probability: round_ratio(o.probability),
                    cost: round_currency(o.cost),
                    effectiveness: round_ratio(o.effectiveness),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSweepSummary {
    pub value: f64,
    pub optimal_choice: Option<String>,
    pub expected_costs: BTreeMap<String, f64>,
    pub expected_effectiveness: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSensitivitySummary {
    pub node: String,
    pub attribute: TreeAttribute,
    pub original_value: f64,
    pub points: Vec<TreeSweepSummary>,
}

impl From<&TreeSensitivity> for TreeSensitivitySummary {
    fn from(s: &TreeSensitivity) -> Self {
        let value_round: fn(f64) -> f64 = match s.attribute {
            TreeAttribute::Cost => round_currency,
            TreeAttribute::Probability | TreeAttribute::Effectiveness => round_ratio,
        };
        Self {
            node: s.node.clone(),
            attribute: s.attribute,
            original_value: value_round(s.original_value),
            points: s
                .points
                .iter()
                .map(|p| TreeSweepSummary {
                    value: value_round(p.value),
                    optimal_choice: p.optimal_choice.clone(),
                    expected_costs: p
                        .strategies
                        .iter()
                        .map(|o| (o.name.clone(), round_currency(o.cost)))
                        .collect(),
                    expected_effectiveness: p
                        .strategies
                        .iter()
                        .map(|o| (o.name.clone(), round_ratio(o.effect)))
                        .collect(),
                })
                .collect(),
        }
    }
}

fn round_tree(node: &mut TreeNode) {
    node.expected_cost = node.expected_cost.map(round_currency);
    node.expected_effectiveness = node.expected_effectiveness.map(round_ratio);
    node.probability = node.probability.map(round_ratio);
    if let NodeBody::Terminal {
        cost,
        effectiveness,
    } = &mut node.body
    {
        *cost = round_currency(*cost);
        *effectiveness = round_ratio(*effectiveness);
    }
    for child in node.children_mut() {
        round_tree(child);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionTreeResponse {
    pub name: String,
    pub wtp_threshold: f64,
    pub optimal_strategy: Option<String>,
    pub strategies: Vec<TreeStrategySummary>,
    pub icers: Vec<IcerSummary>,
    pub sensitivity: Vec<TreeSensitivitySummary>,
    pub tree: TreeNode,
}

pub fn run_decision_tree(request: &DecisionTreeRequest) -> Result<DecisionTreeResponse> {
    let analysis = decision_tree::analysis::run(request)?;
    info!(
        name = %analysis.name,
        optimal = ?analysis.optimal_strategy,
        "decision tree analysis complete"
    );

    let mut tree = analysis.tree;
    round_tree(&mut tree);
    let wtp = analysis.wtp_threshold;

    Ok(DecisionTreeResponse {
        name: analysis.name,
        wtp_threshold: wtp,
        optimal_strategy: analysis.optimal_strategy,
        strategies: analysis
            .strategies
            .iter()
            .map(|s| TreeStrategySummary::new(s, wtp))
            .collect(),
        icers: analysis.icers.iter().map(IcerSummary::from).collect(),
        sensitivity: analysis
            .sensitivity
            .iter()
            .map(TreeSensitivitySummary::from)
            .collect(),
        tree,
    })
}

// ============================================================================
// Budget impact
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentSummary {
    pub name: String,
    pub costs: Vec<f64>,
    pub patients: Vec<f64>,
    pub shares_current: Vec<f64>,
    pub shares_new: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetImpactResponse {
    pub years: Vec<usize>,
    pub eligible_population: Vec<f64>,
    pub costs_current: Vec<f64>,
    pub costs_new: Vec<f64>,
    pub budget_impact: Vec<f64>,
    pub cumulative_impact: Vec<f64>,
    pub total_impact: f64,
    pub average_impact: f64,
    pub peak_impact: f64,
    pub peak_year: usize,
    pub treatments: Vec<TreatmentSummary>,
}

impl From<BudgetImpactAnalysis> for BudgetImpactResponse {
    fn from(a: BudgetImpactAnalysis) -> Self {
        Self {
            eligible_population: round_all(&a.eligible_population, round_currency),
            costs_current: round_all(&a.costs_current, round_currency),
            costs_new: round_all(&a.costs_new, round_currency),
            budget_impact: round_all(&a.budget_impact, round_currency),
            cumulative_impact: round_all(&a.cumulative_impact, round_currency),
            total_impact: round_currency(a.total_impact),
            average_impact: round_currency(a.average_impact),
            peak_impact: round_currency(a.peak_impact),
            peak_year: a.peak_year,
            treatments: a
                .treatments
                .iter()
                .map(|t| TreatmentSummary {
                    name: t.name.clone(),
                    costs: round_all(&t.costs, round_currency),
                    patients: round_all(&t.patients, round_currency),
                    shares_current: round_all(&t.shares_current, round_ratio),
                    shares_new: round_all(&t.shares_new, round_ratio),
                })
                .collect(),
            years: a.years,
        }
    }
}

pub fn run_budget_impact(config: &BudgetImpactConfig) -> Result<BudgetImpactResponse> {
    let analysis = budget_impact::run(config)?;
    info!(
        years = config.time_horizon,
        total_impact = analysis.total_impact,
        "budget impact analysis complete"
    );
    Ok(BudgetImpactResponse::from(analysis))
}

// ============================================================================
// Survival
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSummary {
    pub family: SurvivalFamily,
    pub scale: f64,
    pub shape: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub median_survival: Option<f64>,
    pub rmst: f64,
}

impl From<&FitResult> for FitSummary {
    fn from(f: &FitResult) -> Self {
        Self {
            family: f.family,
            scale: round_ratio(f.scale),
            shape: round_ratio(f.shape),
            log_likelihood: round_currency(f.log_likelihood),
            aic: round_currency(f.aic),
            bic: round_currency(f.bic),
            median_survival: f.median_survival.map(round_currency),
            rmst: round_currency(f.rmst),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveSummary {
    pub times: Vec<f64>,
    pub survival: Vec<f64>,
    pub hazard: Vec<f64>,
    pub cumulative_hazard: Vec<f64>,
}

impl From<&SurvivalCurve> for CurveSummary {
    fn from(c: &SurvivalCurve) -> Self {
        Self {
            times: round_all(&c.times, round_currency),
            survival: round_all(&c.survival, round_ratio),
            hazard: round_all(&c.hazard, round_ratio),
            cumulative_hazard: round_all(&c.cumulative_hazard, round_ratio),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub family: SurvivalFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivalResponse {
    pub fit: FitSummary,
    pub curve: CurveSummary,
    pub hazard_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_curve: Option<CurveSummary>,
    pub cycle_length: f64,
    pub transition_probabilities: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparisons: Option<Vec<ComparisonSummary>>,
}

pub fn run_survival_fit(request: &SurvivalRequest) -> Result<SurvivalResponse> {
    let analysis = survival::analysis::run(request)?;
    info!(
        family = %analysis.fit.family,
        aic = analysis.fit.aic,
        "survival fit complete"
    );

    Ok(SurvivalResponse {
        fit: FitSummary::from(&analysis.fit),
        curve: CurveSummary::from(&analysis.curve),
        hazard_ratio: analysis.hazard_ratio,
        comparison_curve: analysis.comparison_curve.as_ref().map(CurveSummary::from),
        cycle_length: analysis.cycle_length,
        transition_probabilities: round_all(&analysis.transition_probabilities, round_ratio),
        comparisons: analysis.comparisons.map(|comparisons| {
            comparisons
                .iter()
                .map(|c| ComparisonSummary {
                    family: c.family,
                    fit: c.fit.as_ref().map(FitSummary::from),
                    error: c.error.clone(),
                })
                .collect()
        }),
    })
}

// ============================================================================
// Sensitivity analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TornadoBar {
    pub parameter: CohortParameter,
    pub base_value: f64,
    pub low: f64,
    pub high: f64,
    pub icer_low: Option<f64>,
    pub icer_high: Option<f64>,
    /// `None` when the swing is infinite
    pub impact: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneWayPointSummary {
    pub value: f64,
    pub icer: Option<f64>,
    pub delta_cost: f64,
    pub delta_effect: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneWaySummary {
    pub parameter: CohortParameter,
    pub base_value: f64,
    pub points: Vec<OneWayPointSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TornadoResponse {
    pub base_icer: Option<f64>,
    pub tornado: Vec<TornadoBar>,
    pub one_way: Vec<OneWaySummary>,
}

pub fn run_tornado(request: &TornadoRequest) -> Result<TornadoResponse> {
    let analysis = sensitivity::deterministic::run(request)?;
    info!(
        parameters = analysis.entries.len(),
        sweeps = analysis.sweeps.len(),
        "tornado analysis complete"
    );

    Ok(TornadoResponse {
        base_icer: finite_currency(analysis.base_icer),
        tornado: analysis
            .entries
            .iter()
            .map(|e| TornadoBar {
                parameter: e.parameter,
                base_value: e.base_value,
                low: e.low,
                high: e.high,
                icer_low: finite_currency(e.icer_low),
                icer_high: finite_currency(e.icer_high),
                impact: finite_currency(e.impact),
            })
            .collect(),
        one_way: analysis
            .sweeps
            .iter()
            .map(|s| OneWaySummary {
                parameter: s.parameter,
                base_value: s.base_value,
                points: s
                    .points
                    .iter()
                    .map(|p| OneWayPointSummary {
                        value: p.value,
                        icer: finite_currency(p.icer),
                        delta_cost: round_currency(p.delta_cost),
                        delta_effect: round_ratio(p.delta_effect),
                    })
                    .collect(),
            })
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsaIterationSummary {
    pub iteration: usize,
    pub parameters: BTreeMap<CohortParameter, f64>,
    pub costs: BTreeMap<String, f64>,
    pub qalys: BTreeMap<String, f64>,
    pub nmb: BTreeMap<String, f64>,
    pub delta_cost: f64,
    pub delta_effect: f64,
    pub icer: f64,
    pub optimal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsaStatisticsSummary {
    pub n_iterations: usize,
    pub n_valid: usize,
    pub n_skipped: usize,
    pub mean_icer: Option<f64>,
    pub median_icer: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub mean_delta_cost: Option<f64>,
    pub mean_delta_effect: Option<f64>,
    pub prob_cost_effective: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CeacSummary {
    pub wtp_thresholds: Vec<f64>,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsaResponse {
    pub wtp_threshold: f64,
    pub statistics: PsaStatisticsSummary,
    pub ceac: CeacSummary,
    /// The first successful iterations, at most [`MAX_ECHOED_ITERATIONS`]
    pub iterations: Vec<PsaIterationSummary>,
}

pub fn run_psa(request: &PsaRequest) -> Result<PsaResponse> {
    let analysis = sensitivity::probabilistic::run(request)?;
    let stats = &analysis.statistics;
    info!(
        iterations = stats.n_requested,
        valid = stats.n_valid,
        prob_cost_effective = ?stats.prob_cost_effective,
        "probabilistic sensitivity analysis complete"
    );

    let pair = |a: f64, b: f64, round: fn(f64) -> f64| {
        BTreeMap::from([
            (markov::three_state::INTERVENTION.to_string(), round(a)),
            (markov::three_state::COMPARATOR.to_string(), round(b)),
        ])
    };

    Ok(PsaResponse {
        wtp_threshold: analysis.wtp_threshold,
        statistics: PsaStatisticsSummary {
            n_iterations: stats.n_requested,
            n_valid: stats.n_valid,
            n_skipped: stats.n_skipped,
            mean_icer: stats.mean_icer.map(round_currency),
            median_icer: stats.median_icer.map(round_currency),
            ci_lower: stats.ci_lower.map(round_currency),
            ci_upper: stats.ci_upper.map(round_currency),
            mean_delta_cost: stats.mean_delta_cost.map(round_currency),
            mean_delta_effect: stats.mean_delta_effect.map(round_ratio),
            prob_cost_effective: stats.prob_cost_effective.map(round_ratio),
        },
        ceac: CeacSummary {
            wtp_thresholds: analysis.ceac.iter().map(|p| p.wtp).collect(),
            probabilities: analysis.ceac.iter().map(|p| round_ratio(p.probability)).collect(),
        },
        iterations: analysis
            .iterations
            .iter()
            .take(MAX_ECHOED_ITERATIONS)
            .map(|it| PsaIterationSummary {
                iteration: it.iteration,
                parameters: it.parameters.clone(),
                costs: pair(it.cost_intervention, it.cost_comparator, round_currency),
                qalys: pair(it.effect_intervention, it.effect_comparator, round_ratio),
                nmb: pair(it.nmb_intervention, it.nmb_comparator, round_currency),
                delta_cost: round_currency(it.delta_cost),
                delta_effect: round_ratio(it.delta_effect),
                icer: round_currency(it.icer),
                optimal: it.optimal.clone(),
            })
            .collect(),
    })
}

// ============================================================================
// Value of information
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSummary {
    pub per_patient: f64,
    pub population: f64,
    pub decision_horizon: f64,
}

impl From<ScaledValue> for ValueSummary {
    fn from(v: ScaledValue) -> Self {
        Self {
            per_patient: round_currency(v.per_patient),
            population: round_currency(v.population),
            decision_horizon: round_currency(v.decision_horizon),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvppiSummary {
    pub parameter: String,
    pub per_patient: f64,
    pub population: f64,
    pub decision_horizon: f64,
    pub contribution_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiResponse {
    pub n_samples: usize,
    pub wtp_threshold: f64,
    pub optimal_strategy: String,
    pub evpi: ValueSummary,
    pub probability_optimal: BTreeMap<String, f64>,
    pub ceac_thresholds: Vec<f64>,
    pub ceac: BTreeMap<String, Vec<f64>>,
    pub evppi: Vec<EvppiSummary>,
    pub total_value_of_research: f64,
    pub research_priorities: Vec<String>,
    pub recommendation: String,
}

pub fn run_voi(request: &VoiRequest) -> Result<VoiResponse> {
    let analysis = voi::run(request)?;
    info!(
        samples = analysis.n_samples,
        evpi = analysis.evpi.per_patient,
        "value of information analysis complete"
    );

    Ok(VoiResponse {
        n_samples: analysis.n_samples,
        wtp_threshold: analysis.wtp_threshold,
        optimal_strategy: analysis.optimal_strategy,
        evpi: ValueSummary::from(analysis.evpi),
        probability_optimal: analysis
            .probability_optimal
            .into_iter()
            .map(|(name, p)| (name, round_ratio(p)))
            .collect(),
        ceac_thresholds: analysis.ceac_thresholds,
        ceac: analysis
            .ceac
            .into_iter()
            .map(|c| (c.strategy, round_all(&c.probabilities, round_ratio)))
            .collect(),
        evppi: analysis
            .evppi
            .iter()
            .map(|e| {
                let value = ValueSummary::from(e.value);
                EvppiSummary {
                    parameter: e.parameter.clone(),
                    per_patient: value.per_patient,
                    population: value.population,
                    decision_horizon: value.decision_horizon,
                    contribution_pct: round_to(e.contribution_pct, 1),
                }
            })
            .collect(),
        total_value_of_research: round_currency(analysis.evpi.decision_horizon),
        research_priorities: analysis.research_priorities,
        recommendation: analysis.recommendation,
    })
}
