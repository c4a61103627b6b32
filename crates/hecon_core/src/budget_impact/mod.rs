//! Multi-year budget impact of introducing a new treatment
//!
//! Compares a frozen current treatment mix with a scenario where the new
//! treatment takes market share along an uptake curve.

pub mod market;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

pub use market::{PopulationGrowth, UptakeCurve, project_shares};

use crate::error::{EngineError, Result};
use market::share_vector;

const SHARE_TOLERANCE: f64 = 1e-3;

const STANDARD_OF_CARE: &str = "Standard of Care";
const NEW_TREATMENT: &str = "New Treatment";

fn default_time_horizon() -> usize {
    5
}

fn default_total_population() -> f64 {
    47_000_000.0
}

fn default_prevalence_rate() -> f64 {
    0.001
}

fn default_diagnosis_rate() -> f64 {
    0.85
}

fn default_treatment_eligible_rate() -> f64 {
    0.70
}

fn default_annual_growth_rate() -> f64 {
    0.005
}

fn default_max_market_share() -> f64 {
    0.30
}

fn default_new_treatment_name() -> String {
    NEW_TREATMENT.to_string()
}

fn default_treatments() -> Vec<TreatmentOption> {
    vec![
        TreatmentOption {
            name: STANDARD_OF_CARE.to_string(),
            annual_cost: 2800.0,
            administration_cost: 0.0,
            monitoring_cost: 500.0,
            adverse_event_cost: 0.0,
        },
        TreatmentOption {
            name: NEW_TREATMENT.to_string(),
            annual_cost: 15_000.0,
            administration_cost: 200.0,
            monitoring_cost: 800.0,
            adverse_event_cost: 0.0,
        },
    ]
}

fn default_current_shares() -> FxHashMap<String, f64> {
    let mut shares = FxHashMap::default();
    shares.insert(STANDARD_OF_CARE.to_string(), 1.0);
    shares.insert(NEW_TREATMENT.to_string(), 0.0);
    shares
}

/// Annual per-patient costs of one treatment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreatmentOption {
    pub name: String,
    #[serde(default)]
    pub annual_cost: f64,
    #[serde(default)]
    pub administration_cost: f64,
    #[serde(default)]
    pub monitoring_cost: f64,
    #[serde(default)]
    pub adverse_event_cost: f64,
}

impl TreatmentOption {
    #[must_use]
    pub fn total_annual_cost(&self) -> f64 {
        self.annual_cost + self.administration_cost + self.monitoring_cost + self.adverse_event_cost
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetImpactConfig {
    /// Years after the current one; results cover `0..=time_horizon`
    #[serde(default = "default_time_horizon")]
    pub time_horizon: usize,

    #[serde(default = "default_total_population")]
    pub total_population: f64,
    #[serde(default = "default_prevalence_rate")]
    pub prevalence_rate: f64,
    #[serde(default = "default_diagnosis_rate")]
    pub diagnosis_rate: f64,
    #[serde(default = "default_treatment_eligible_rate")]
    pub treatment_eligible_rate: f64,
    #[serde(default)]
    pub growth_type: PopulationGrowth,
    #[serde(default = "default_annual_growth_rate")]
    pub annual_growth_rate: f64,

    #[serde(default = "default_treatments")]
    pub treatments: Vec<TreatmentOption>,
    /// Must sum to 1
    #[serde(default = "default_current_shares")]
    pub current_market_shares: FxHashMap<String, f64>,
    #[serde(default = "default_new_treatment_name")]
    pub new_treatment_name: String,
    #[serde(default = "default_max_market_share")]
    pub max_market_share: f64,
    #[serde(default)]
    pub uptake_type: UptakeCurve,
    /// Treatments losing share to the new one; every other treatment when
    /// absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displaced_treatments: Option<Vec<String>>,

    #[serde(default)]
    pub discount_rate: f64,
}

impl Default for BudgetImpactConfig {
    fn default() -> Self {
        Self {
            time_horizon: default_time_horizon(),
            total_population: default_total_population(),
            prevalence_rate: default_prevalence_rate(),
            diagnosis_rate: default_diagnosis_rate(),
            treatment_eligible_rate: default_treatment_eligible_rate(),
            growth_type: PopulationGrowth::default(),
            annual_growth_rate: default_annual_growth_rate(),
            treatments: default_treatments(),
            current_market_shares: default_current_shares(),
            new_treatment_name: default_new_treatment_name(),
            max_market_share: default_max_market_share(),
            uptake_type: UptakeCurve::default(),
            displaced_treatments: None,
            discount_rate: 0.0,
        }
    }
}

impl BudgetImpactConfig {
    /// Patients eligible for treatment in `year`
    #[must_use]
    pub fn eligible_population(&self, year: usize) -> f64 {
        self.total_population
            * self.growth_type.factor(year, self.annual_growth_rate)
            * self.prevalence_rate
            * self.diagnosis_rate
            * self.treatment_eligible_rate
    }

    fn treatment_index(&self, name: &str) -> Option<usize> {
        self.treatments.iter().position(|t| t.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.time_horizon == 0 {
            return Err(EngineError::config("time_horizon must be at least 1 year"));
        }
        for (name, value) in [
            ("total_population", self.total_population),
            ("prevalence_rate", self.prevalence_rate),
            ("diagnosis_rate", self.diagnosis_rate),
            ("treatment_eligible_rate", self.treatment_eligible_rate),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(EngineError::config(format!("{name} must be non-negative")));
            }
        }
        if !(self.discount_rate > -1.0 && self.discount_rate.is_finite()) {
            return Err(EngineError::config("discount_rate must be above -1"));
        }
        if !(0.0..=1.0).contains(&self.max_market_share) {
            return Err(EngineError::config(format!(
                "max_market_share must be within [0, 1], got {}",
                self.max_market_share
            )));
        }

        let mut names = FxHashSet::default();
        for treatment in &self.treatments {
            if !names.insert(treatment.name.as_str()) {
                return Err(EngineError::config(format!(
                    "treatment '{}' is declared twice",
                    treatment.name
                )));
            }
            if !treatment.total_annual_cost().is_finite() {
                return Err(EngineError::config(format!(
                    "treatment '{}' has non-finite costs",
                    treatment.name
                )));
            }
        }
        if self.treatment_index(&self.new_treatment_name).is_none() {
            return Err(EngineError::config(format!(
                "new treatment '{}' is not among the treatments",
                self.new_treatment_name
            )));
        }

        for (name, &share) in &self.current_market_shares {
            if self.treatment_index(name).is_none() {
                return Err(EngineError::InvalidMarketShares(format!(
                    "unknown treatment '{name}'"
                )));
            }
            if !(0.0..=1.0).contains(&share) {
                return Err(EngineError::InvalidMarketShares(format!(
                    "share of '{name}' must be within [0, 1], got {share}"
                )));
            }
        }
        let total: f64 = self.current_market_shares.values().sum();
        if (total - 1.0).abs() > SHARE_TOLERANCE {
            return Err(EngineError::InvalidMarketShares(format!(
                "current shares sum to {total}, expected 1"
            )));
        }

        if let Some(displaced) = &self.displaced_treatments {
            for name in displaced {
                if self.treatment_index(name).is_none() {
                    return Err(EngineError::InvalidMarketShares(format!(
                        "unknown displaced treatment '{name}'"
                    )));
                }
                if *name == self.new_treatment_name {
                    return Err(EngineError::InvalidMarketShares(
                        "the new treatment cannot displace itself".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Per-treatment yearly values under the new scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentProjection {
    pub name: String,
    pub costs: Vec<f64>,
    pub patients: Vec<f64>,
    pub shares_current: Vec<f64>,
    pub shares_new: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetImpactAnalysis {
    pub years: Vec<usize>,
    pub eligible_population: Vec<f64>,
    pub costs_current: Vec<f64>,
    pub costs_new: Vec<f64>,
    pub budget_impact: Vec<f64>,
    pub cumulative_impact: Vec<f64>,
    pub total_impact: f64,
    /// Over `time_horizon + 1` years
    pub average_impact: f64,
    /// Largest impact by absolute value
    pub peak_impact: f64,
    pub peak_year: usize,
    pub treatments: Vec<TreatmentProjection>,
}

pub fn run(config: &BudgetImpactConfig) -> Result<BudgetImpactAnalysis> {
    config.validate()?;

    let names: Vec<String> = config.treatments.iter().map(|t| t.name.clone()).collect();
    let unit_costs: Vec<f64> = config
        .treatments
        .iter()
        .map(TreatmentOption::total_annual_cost)
        .collect();
    let new_index = config
        .treatment_index(&config.new_treatment_name)
        .ok_or_else(|| EngineError::config("new treatment is not among the treatments"))?;

    let displaced: Vec<usize> = match &config.displaced_treatments {
        Some(list) => list
            .iter()
            .filter_map(|name| config.treatment_index(name))
            .collect(),
        None => (0..names.len()).filter(|&i| i != new_index).collect(),
    };

    let current = share_vector(&names, &config.current_market_shares);
    let new_shares = project_shares(
        &current,
        new_index,
        &displaced,
        config.uptake_type,
        config.max_market_share,
        config.time_horizon,
    );

    let n_years = config.time_horizon + 1;
    let mut analysis = BudgetImpactAnalysis {
        years: (0..n_years).collect(),
        eligible_population: Vec::with_capacity(n_years),
        costs_current: Vec::with_capacity(n_years),
        costs_new: Vec::with_capacity(n_years),
        budget_impact: Vec::with_capacity(n_years),
        cumulative_impact: Vec::with_capacity(n_years),
        total_impact: 0.0,
        average_impact: 0.0,
        peak_impact: 0.0,
        peak_year: 0,
        treatments: names
            .iter()
            .map(|name| TreatmentProjection {
                name: name.clone(),
                costs: Vec::with_capacity(n_years),
                patients: Vec::with_capacity(n_years),
                shares_current: Vec::with_capacity(n_years),
                shares_new: Vec::with_capacity(n_years),
            })
            .collect(),
    };

    let mut cumulative = 0.0;
    for (year, shares) in new_shares.iter().enumerate() {
        let eligible = config.eligible_population(year);
        let discount = 1.0 / (1.0 + config.discount_rate).powi(year as i32);

        let mut cost_current = 0.0;
        let mut cost_new = 0.0;
        for (i, projection) in analysis.treatments.iter_mut().enumerate() {
            cost_current += eligible * current[i] * unit_costs[i] * discount;

            let patients = eligible * shares[i];
            let cost = patients * unit_costs[i] * discount;
            cost_new += cost;

            projection.costs.push(cost);
            projection.patients.push(patients);
            projection.shares_current.push(current[i]);
            projection.shares_new.push(shares[i]);
        }

        let impact = cost_new - cost_current;
        cumulative += impact;
        if impact.abs() > analysis.peak_impact.abs() {
            analysis.peak_impact = impact;
            analysis.peak_year = year;
        }

        analysis.eligible_population.push(eligible);
        analysis.costs_current.push(cost_current);
        analysis.costs_new.push(cost_new);
        analysis.budget_impact.push(impact);
        analysis.cumulative_impact.push(cumulative);
    }

    analysis.total_impact = cumulative;
    analysis.average_impact = cumulative / n_years as f64;
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_request() {
        let config: BudgetImpactConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BudgetImpactConfig::default());
        assert_eq!(config.uptake_type, UptakeCurve::SCurve);
        // 47M * 0.001 * 0.85 * 0.70
        assert!((config.eligible_population(0) - 27_965.0).abs() < 1e-6);
    }

    #[test]
    fn test_default_projection() {
        let analysis = run(&BudgetImpactConfig::default()).unwrap();
        assert_eq!(analysis.years, vec![0, 1, 2, 3, 4, 5]);
        // Year 0 keeps the current mix
        assert_eq!(analysis.budget_impact[0], 0.0);
        assert!(analysis.budget_impact[1..].iter().all(|&i| i > 0.0));
        assert_eq!(analysis.peak_year, 5);
        assert!((analysis.total_impact - analysis.cumulative_impact[5]).abs() < 1e-6);
        assert!((analysis.average_impact - analysis.total_impact / 6.0).abs() < 1e-6);

        let new = &analysis.treatments[1];
        assert_eq!(new.name, "New Treatment");
        assert_eq!(new.shares_new[0], 0.0);
        assert!(new.shares_new[5] > new.shares_new[1]);
    }

    #[test]
    fn test_zero_uptake_means_zero_impact() {
        let mut shares = FxHashMap::default();
        shares.insert("A".to_string(), 1.0);
        let config = BudgetImpactConfig {
            treatments: vec![
                TreatmentOption {
                    name: "A".to_string(),
                    annual_cost: 1000.0,
                    administration_cost: 0.0,
                    monitoring_cost: 0.0,
                    adverse_event_cost: 0.0,
                },
                TreatmentOption {
                    name: "B".to_string(),
                    annual_cost: 9000.0,
                    administration_cost: 0.0,
                    monitoring_cost: 0.0,
                    adverse_event_cost: 0.0,
                },
            ],
            current_market_shares: shares,
            new_treatment_name: "B".to_string(),
            max_market_share: 0.0,
            ..BudgetImpactConfig::default()
        };
        let analysis = run(&config).unwrap();
        assert!(analysis.budget_impact.iter().all(|&i| i.abs() < 1e-9));
        assert_eq!(analysis.peak_year, 0);
    }

    #[test]
    fn test_discounting_and_linear_growth() {
        let config = BudgetImpactConfig {
            growth_type: PopulationGrowth::Linear,
            annual_growth_rate: 0.1,
            uptake_type: UptakeCurve::Immediate,
            discount_rate: 0.05,
            ..BudgetImpactConfig::default()
        };
        let analysis = run(&config).unwrap();
        let eligible = config.eligible_population(2);
        assert!((eligible - 27_965.0 * 1.2).abs() < 1e-6);

        let per_patient_delta = 0.3 * (16_000.0 - 3_300.0);
        let expected = eligible * per_patient_delta / 1.05f64.powi(2);
        assert!((analysis.budget_impact[2] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_shares() {
        let mut config = BudgetImpactConfig::default();
        config.current_market_shares.insert("Standard of Care".to_string(), 0.8);
        assert!(matches!(run(&config), Err(EngineError::InvalidMarketShares(_))));

        let mut config = BudgetImpactConfig::default();
        config.current_market_shares.insert("Surgery".to_string(), 0.0);
        assert!(matches!(run(&config), Err(EngineError::InvalidMarketShares(_))));

        let config = BudgetImpactConfig {
            new_treatment_name: "Unknown".to_string(),
            ..BudgetImpactConfig::default()
        };
        assert!(matches!(run(&config), Err(EngineError::Config(_))));

        let config = BudgetImpactConfig {
            max_market_share: 1.5,
            ..BudgetImpactConfig::default()
        };
        assert!(run(&config).is_err());
    }
}
