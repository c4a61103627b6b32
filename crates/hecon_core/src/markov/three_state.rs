//! Fixed Stable / Progression / Death model comparing two drugs
//!
//! Both strategies share the state payoffs; they differ in the
//! Stable → Progression probability and in the drug cost charged to every
//! alive patient each cycle. `Drug A` is the intervention, `Drug B` the
//! comparator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::engine::{CohortModel, ModelSettings, Strategy, StrategyResult, TraceMode};
use super::state::HealthState;
use super::transition::Transition;
use crate::economics::IcerResult;
use crate::error::{EngineError, Result};

pub const STABLE: &str = "Stable";
pub const PROGRESSION: &str = "Progression";
pub const DEATH: &str = "Death";

pub const INTERVENTION: &str = "Drug A";
pub const COMPARATOR: &str = "Drug B";

fn default_time_horizon() -> f64 {
    10.0
}

fn default_discount_rate() -> f64 {
    0.03
}

fn default_cohort_size() -> f64 {
    1000.0
}

fn default_prob_s_to_p_a() -> f64 {
    0.10
}

fn default_prob_s_to_p_b() -> f64 {
    0.25
}

fn default_prob_s_to_d() -> f64 {
    0.02
}

fn default_prob_p_to_d() -> f64 {
    0.15
}

fn default_cost_drug_a() -> f64 {
    3500.0
}

fn default_cost_drug_b() -> f64 {
    500.0
}

fn default_cost_state_s() -> f64 {
    200.0
}

fn default_cost_state_p() -> f64 {
    4500.0
}

fn default_utility_stable() -> f64 {
    0.85
}

fn default_utility_progression() -> f64 {
    0.50
}

pub(crate) fn default_wtp_threshold() -> f64 {
    30_000.0
}

/// Inputs of the 3-state model. Every field has a documented default, so
/// `{}` is a valid request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CohortParams {
    /// Years; one cycle per year
    #[serde(default = "default_time_horizon")]
    pub time_horizon: f64,

    /// Applies to costs and outcomes unless overridden below
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate_costs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate_outcomes: Option<f64>,

    #[serde(default = "default_cohort_size")]
    pub cohort_size: f64,

    #[serde(default = "default_prob_s_to_p_a")]
    pub prob_s_to_p_a: f64,
    #[serde(default = "default_prob_s_to_p_b")]
    pub prob_s_to_p_b: f64,
    #[serde(default = "default_prob_s_to_d")]
    pub prob_s_to_d: f64,
    #[serde(default = "default_prob_p_to_d")]
    pub prob_p_to_d: f64,

    /// Per alive patient per cycle
    #[serde(default = "default_cost_drug_a")]
    pub cost_drug_a: f64,
    #[serde(default = "default_cost_drug_b")]
    pub cost_drug_b: f64,
    #[serde(default = "default_cost_state_s")]
    pub cost_state_s: f64,
    #[serde(default = "default_cost_state_p")]
    pub cost_state_p: f64,

    #[serde(default = "default_utility_stable")]
    pub utility_stable: f64,
    #[serde(default = "default_utility_progression")]
    pub utility_progression: f64,

    #[serde(default = "default_wtp_threshold")]
    pub wtp_threshold: f64,
    #[serde(default)]
    pub half_cycle_correction: bool,
}

impl Default for CohortParams {
    fn default() -> Self {
        Self {
            time_horizon: default_time_horizon(),
            discount_rate: default_discount_rate(),
            discount_rate_costs: None,
            discount_rate_outcomes: None,
            cohort_size: default_cohort_size(),
            prob_s_to_p_a: default_prob_s_to_p_a(),
            prob_s_to_p_b: default_prob_s_to_p_b(),
            prob_s_to_d: default_prob_s_to_d(),
            prob_p_to_d: default_prob_p_to_d(),
            cost_drug_a: default_cost_drug_a(),
            cost_drug_b: default_cost_drug_b(),
            cost_state_s: default_cost_state_s(),
            cost_state_p: default_cost_state_p(),
            utility_stable: default_utility_stable(),
            utility_progression: default_utility_progression(),
            wtp_threshold: default_wtp_threshold(),
            half_cycle_correction: false,
        }
    }
}

/// Numeric inputs of [`CohortParams`] that sensitivity analyses may vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortParameter {
    TimeHorizon,
    DiscountRate,
    DiscountRateCosts,
    DiscountRateOutcomes,
    CohortSize,
    ProbSToPA,
    ProbSToPB,
    ProbSToD,
    ProbPToD,
    CostDrugA,
    CostDrugB,
    CostStateS,
    CostStateP,
    UtilityStable,
    UtilityProgression,
}

impl CohortParameter {
    pub const ALL: [CohortParameter; 15] = [
        CohortParameter::TimeHorizon,
        CohortParameter::DiscountRate,
        CohortParameter::DiscountRateCosts,
        CohortParameter::DiscountRateOutcomes,
        CohortParameter::CohortSize,
        CohortParameter::ProbSToPA,
        CohortParameter::ProbSToPB,
        CohortParameter::ProbSToD,
        CohortParameter::ProbPToD,
        CohortParameter::CostDrugA,
        CohortParameter::CostDrugB,
        CohortParameter::CostStateS,
        CohortParameter::CostStateP,
        CohortParameter::UtilityStable,
        CohortParameter::UtilityProgression,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CohortParameter::TimeHorizon => "time_horizon",
            CohortParameter::DiscountRate => "discount_rate",
            CohortParameter::DiscountRateCosts => "discount_rate_costs",
            CohortParameter::DiscountRateOutcomes => "discount_rate_outcomes",
            CohortParameter::CohortSize => "cohort_size",
            CohortParameter::ProbSToPA => "prob_s_to_p_a",
            CohortParameter::ProbSToPB => "prob_s_to_p_b",
            CohortParameter::ProbSToD => "prob_s_to_d",
            CohortParameter::ProbPToD => "prob_p_to_d",
            CohortParameter::CostDrugA => "cost_drug_a",
            CohortParameter::CostDrugB => "cost_drug_b",
            CohortParameter::CostStateS => "cost_state_s",
            CohortParameter::CostStateP => "cost_state_p",
            CohortParameter::UtilityStable => "utility_stable",
            CohortParameter::UtilityProgression => "utility_progression",
        }
    }

    /// Current value in `params`. The cost/outcome discount overrides fall
    /// back to the shared rate.
    #[must_use]
    pub fn get(&self, params: &CohortParams) -> f64 {
        match self {
            CohortParameter::TimeHorizon => params.time_horizon,
            CohortParameter::DiscountRate => params.discount_rate,
            CohortParameter::DiscountRateCosts => params.cost_discount_rate(),
            CohortParameter::DiscountRateOutcomes => params.outcome_discount_rate(),
            CohortParameter::CohortSize => params.cohort_size,
            CohortParameter::ProbSToPA => params.prob_s_to_p_a,
            CohortParameter::ProbSToPB => params.prob_s_to_p_b,
            CohortParameter::ProbSToD => params.prob_s_to_d,
            CohortParameter::ProbPToD => params.prob_p_to_d,
            CohortParameter::CostDrugA => params.cost_drug_a,
            CohortParameter::CostDrugB => params.cost_drug_b,
            CohortParameter::CostStateS => params.cost_state_s,
            CohortParameter::CostStateP => params.cost_state_p,
            CohortParameter::UtilityStable => params.utility_stable,
            CohortParameter::UtilityProgression => params.utility_progression,
        }
    }
}

impl fmt::Display for CohortParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CohortParameter {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        CohortParameter::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| EngineError::UnknownParameter(s.to_string()))
    }
}

impl CohortParams {
    #[must_use]
    pub fn cost_discount_rate(&self) -> f64 {
        self.discount_rate_costs.unwrap_or(self.discount_rate)
    }

    #[must_use]
    pub fn outcome_discount_rate(&self) -> f64 {
        self.discount_rate_outcomes.unwrap_or(self.discount_rate)
    }

    /// Copy with one parameter replaced
    #[must_use]
    pub fn with(&self, parameter: CohortParameter, value: f64) -> Self {
        let mut params = self.clone();
        match parameter {
            CohortParameter::TimeHorizon => params.time_horizon = value,
            CohortParameter::DiscountRate => params.discount_rate = value,
            CohortParameter::DiscountRateCosts => params.discount_rate_costs = Some(value),
            CohortParameter::DiscountRateOutcomes => params.discount_rate_outcomes = Some(value),
            CohortParameter::CohortSize => params.cohort_size = value,
            CohortParameter::ProbSToPA => params.prob_s_to_p_a = value,
            CohortParameter::ProbSToPB => params.prob_s_to_p_b = value,
            CohortParameter::ProbSToD => params.prob_s_to_d = value,
            CohortParameter::ProbPToD => params.prob_p_to_d = value,
            CohortParameter::CostDrugA => params.cost_drug_a = value,
            CohortParameter::CostDrugB => params.cost_drug_b = value,
            CohortParameter::CostStateS => params.cost_state_s = value,
            CohortParameter::CostStateP => params.cost_state_p = value,
            CohortParameter::UtilityStable => params.utility_stable = value,
            CohortParameter::UtilityProgression => params.utility_progression = value,
        }
        params
    }

    #[must_use]
    pub fn settings(&self) -> ModelSettings {
        ModelSettings {
            time_horizon: self.time_horizon,
            cycle_length: 1.0,
            discount_rate_costs: self.cost_discount_rate(),
            discount_rate_outcomes: self.outcome_discount_rate(),
            half_cycle_correction: self.half_cycle_correction,
            cohort_size: self.cohort_size,
            strict_probabilities: true,
        }
    }

    pub fn model(&self) -> Result<CohortModel> {
        let states = vec![
            HealthState::transient(STABLE, self.cost_state_s, self.utility_stable),
            HealthState::transient(PROGRESSION, self.cost_state_p, self.utility_progression),
            HealthState::absorbing(DEATH),
        ];
        CohortModel::new(self.settings(), states, None)
    }

    fn strategy(&self, name: &str, prob_s_to_p: f64, cost_drug: f64) -> Result<Strategy> {
        let p_sd = self.prob_s_to_d;
        let p_pd = self.prob_p_to_d;
        if prob_s_to_p + p_sd > 1.0 {
            return Err(EngineError::transitions(
                STABLE,
                format!(
                    "{name}: progression ({prob_s_to_p}) and death ({p_sd}) probabilities exceed 1"
                ),
            ));
        }

        Ok(Strategy::new(
            name,
            vec![
                Transition::new(STABLE, STABLE, 1.0 - prob_s_to_p - p_sd),
                Transition::new(STABLE, PROGRESSION, prob_s_to_p),
                Transition::new(STABLE, DEATH, p_sd),
                Transition::new(PROGRESSION, PROGRESSION, 1.0 - p_pd),
                Transition::new(PROGRESSION, DEATH, p_pd),
            ],
        )
        .with_state_cost(STABLE, self.cost_state_s + cost_drug)
        .with_state_cost(PROGRESSION, self.cost_state_p + cost_drug))
    }

    pub fn intervention(&self) -> Result<Strategy> {
        self.strategy(INTERVENTION, self.prob_s_to_p_a, self.cost_drug_a)
    }

    pub fn comparator(&self) -> Result<Strategy> {
        self.strategy(COMPARATOR, self.prob_s_to_p_b, self.cost_drug_b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortComparison {
    pub n_cycles: usize,
    pub intervention: StrategyResult,
    pub comparator: StrategyResult,
    /// Per-patient comparison of `Drug A` against `Drug B`
    pub icer: IcerResult,
}

/// Run both drugs and compare them at the configured WTP.
pub fn run(params: &CohortParams, mode: TraceMode) -> Result<CohortComparison> {
    let model = params.model()?;
    let intervention = model.run(&params.intervention()?, mode)?;
    let comparator = model.run(&params.comparator()?, mode)?;
    let icer = IcerResult::compare(
        &comparator.outcome(),
        &intervention.outcome(),
        params.wtp_threshold,
    );

    Ok(CohortComparison {
        n_cycles: model.n_cycles(),
        intervention,
        comparator,
        icer,
    })
}
