//! User-defined n-state cohort models
//!
//! A [`FlexibleModelConfig`] declares the states once and any number of
//! strategies. The first strategy is the comparator for the pairwise ICERs;
//! with three or more strategies the efficiency frontier is reported too.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::engine::{CohortModel, ModelSettings, Strategy, StrategyResult, TraceMode};
use super::state::HealthState;
use super::three_state::default_wtp_threshold;
use crate::economics::{
    FrontierEntry, IcerResult, StrategyOutcome, compare_against_first, efficiency_frontier,
};
use crate::error::{EngineError, Result};

fn default_model_name() -> String {
    "Custom Markov Model".to_string()
}

fn default_time_horizon() -> f64 {
    10.0
}

fn default_cycle_length() -> f64 {
    1.0
}

fn default_discount_rate() -> f64 {
    0.03
}

fn default_true() -> bool {
    true
}

fn default_cohort_size() -> f64 {
    1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlexibleModelConfig {
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Years
    #[serde(default = "default_time_horizon")]
    pub time_horizon: f64,

    /// Years per cycle
    #[serde(default = "default_cycle_length")]
    pub cycle_length: f64,

    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate_costs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate_outcomes: Option<f64>,

    #[serde(default = "default_true")]
    pub half_cycle_correction: bool,

    #[serde(default = "default_cohort_size")]
    pub cohort_size: f64,

    /// Reject transition rows summing above 1 instead of normalizing
    #[serde(default)]
    pub strict_probabilities: bool,

    #[serde(default = "default_wtp_threshold")]
    pub wtp_threshold: f64,

    /// Keep per-cycle payoffs in the results
    #[serde(default)]
    pub include_cycle_details: bool,

    pub states: Vec<HealthState>,

    /// Counts or fractions per state name; everyone starts in the first
    /// state when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_distribution: Option<FxHashMap<String, f64>>,

    pub strategies: Vec<Strategy>,
}

impl FlexibleModelConfig {
    pub fn new(states: Vec<HealthState>, strategies: Vec<Strategy>) -> Self {
        Self {
            model_name: default_model_name(),
            time_horizon: default_time_horizon(),
            cycle_length: default_cycle_length(),
            discount_rate: default_discount_rate(),
            discount_rate_costs: None,
            discount_rate_outcomes: None,
            half_cycle_correction: true,
            cohort_size: default_cohort_size(),
            strict_probabilities: false,
            wtp_threshold: default_wtp_threshold(),
            include_cycle_details: false,
            states,
            initial_distribution: None,
            strategies,
        }
    }

    #[must_use]
    pub fn settings(&self) -> ModelSettings {
        ModelSettings {
            time_horizon: self.time_horizon,
            cycle_length: self.cycle_length,
            discount_rate_costs: self.discount_rate_costs.unwrap_or(self.discount_rate),
            discount_rate_outcomes: self.discount_rate_outcomes.unwrap_or(self.discount_rate),
            half_cycle_correction: self.half_cycle_correction,
            cohort_size: self.cohort_size,
            strict_probabilities: self.strict_probabilities,
        }
    }

    pub fn model(&self) -> Result<CohortModel> {
        CohortModel::new(
            self.settings(),
            self.states.clone(),
            self.initial_distribution.as_ref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexibleAnalysis {
    pub state_names: Vec<String>,
    pub n_cycles: usize,
    pub results: Vec<StrategyResult>,
    /// Every strategy against the first one
    pub icers: Vec<IcerResult>,
    /// Present with three or more strategies
    pub frontier: Option<Vec<FrontierEntry>>,
}

impl FlexibleAnalysis {
    /// Per-patient outcomes in declaration order
    #[must_use]
    pub fn outcomes(&self) -> Vec<StrategyOutcome> {
        self.results.iter().map(StrategyResult::outcome).collect()
    }
}

pub fn run(config: &FlexibleModelConfig) -> Result<FlexibleAnalysis> {
    if config.strategies.is_empty() {
        return Err(EngineError::config("at least one strategy is required"));
    }
    let model = config.model()?;

    let results = config
        .strategies
        .iter()
        .map(|strategy| {
            let mut result = model.run(strategy, TraceMode::Full)?;
            if !config.include_cycle_details {
                result.cycles = None;
            }
            Ok(result)
        })
        .collect::<Result<Vec<_>>>()?;

    let outcomes: Vec<StrategyOutcome> = results.iter().map(StrategyResult::outcome).collect();
    let icers = compare_against_first(&outcomes, config.wtp_threshold);
    let frontier = (outcomes.len() >= 3).then(|| efficiency_frontier(&outcomes));

    Ok(FlexibleAnalysis {
        state_names: model.state_names(),
        n_cycles: model.n_cycles(),
        results,
        icers,
        frontier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markov::{StateKind, Transition};

    const CONFIG: &str = r#"{
        "model_name": "Three arms",
        "time_horizon": 5,
        "discount_rate": 0.0,
        "half_cycle_correction": false,
        "states": [
            {"name": "Well", "cost": 100, "utility": 0.9},
            {"name": "Sick", "cost": 2000, "utility": 0.5},
            {"name": "Dead", "state_type": "absorbing", "utility": 0}
        ],
        "strategies": [
            {"name": "Usual care", "transitions": [
                {"from": "Well", "to": "Sick", "probability": 0.3},
                {"from": "Sick", "to": "Dead", "probability": 0.2}
            ]},
            {"name": "Screening", "transitions": [
                {"from": "Well", "to": "Sick", "probability": 0.2},
                {"from": "Sick", "to": "Dead", "probability": 0.2}
            ], "state_costs": {"Well": 150}},
            {"name": "Vaccine", "transitions": [
                {"from": "Well", "to": "Sick", "probability": 0.1},
                {"from": "Sick", "to": "Dead", "probability": 0.2}
            ], "state_costs": {"Well": 400}}
        ]
    }"#;

    #[test]
    fn test_config_defaults() {
        let config: FlexibleModelConfig = serde_json::from_str(
            r#"{"states": [{"name": "A"}, {"name": "D", "kind": "absorbing"}],
                "strategies": []}"#,
        )
        .unwrap();
        assert_eq!(config.model_name, "Custom Markov Model");
        assert!(config.half_cycle_correction);
        assert_eq!(config.cohort_size, 1000.0);
        assert_eq!(config.states[1].kind, StateKind::Absorbing);
        assert!(matches!(run(&config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_three_strategies_produce_frontier() {
        let config: FlexibleModelConfig = serde_json::from_str(CONFIG).unwrap();
        let analysis = run(&config).unwrap();

        assert_eq!(analysis.results.len(), 3);
        assert_eq!(analysis.icers.len(), 2);
        assert_eq!(analysis.icers[0].comparator, "Usual care");
        assert_eq!(analysis.state_names, vec!["Well", "Sick", "Dead"]);
        assert_eq!(analysis.n_cycles, 5);
        assert!(analysis.results.iter().all(|r| r.cycles.is_none()));

        let frontier = analysis.frontier.unwrap();
        assert_eq!(frontier.len(), 3);
    }

    #[test]
    fn test_two_strategies_skip_frontier() {
        let states = vec![
            HealthState::transient("Alive", 10.0, 1.0),
            HealthState::absorbing("Dead"),
        ];
        let strategies = vec![
            Strategy::new("A", vec![Transition::new("Alive", "Dead", 0.1)]),
            Strategy::new("B", vec![Transition::new("Alive", "Dead", 0.05)]),
        ];
        let mut config = FlexibleModelConfig::new(states, strategies);
        config.include_cycle_details = true;

        let analysis = run(&config).unwrap();
        assert!(analysis.frontier.is_none());
        assert_eq!(analysis.results[0].cycles.as_ref().unwrap().len(), 10);
        assert!(analysis.icers[0].delta_effect > 0.0);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let parsed = serde_json::from_str::<FlexibleModelConfig>(
            r#"{"states": [], "strategies": [], "horizon": 5}"#,
        );
        assert!(parsed.is_err());
    }
}
