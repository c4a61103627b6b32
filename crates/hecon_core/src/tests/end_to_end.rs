//! Full analyses run through the `api` entry points

use std::collections::BTreeMap;

use crate::api::{
    run_budget_impact, run_cohort_analysis, run_decision_tree, run_flexible_cohort_analysis,
    run_psa, run_tornado, run_voi,
};
use crate::budget_impact::BudgetImpactConfig;
use crate::decision_tree::DecisionTreeRequest;
use crate::economics::Conclusion;
use crate::markov::three_state::{self, COMPARATOR, INTERVENTION};
use crate::markov::{CohortParameter, CohortParams, FlexibleModelConfig, TraceMode};
use crate::sampling::ParameterDistribution;
use crate::sensitivity::{ParameterRange, PsaRequest, TornadoRequest};
use crate::stats::{round_currency, round_ratio};
use crate::voi::{VoiRequest, VoiSample};

/// Totals of one drug recomputed by hand: occupancy after each transition,
/// discounted at `(1 + r)^cycle`.
fn recompute(params: &CohortParams, p_sp: f64, drug_cost: f64) -> (f64, f64) {
    let (p_sd, p_pd) = (params.prob_s_to_d, params.prob_p_to_d);
    let r = params.discount_rate;
    let (mut stable, mut progressed) = (params.cohort_size, 0.0);
    let (mut cost, mut qalys) = (0.0, 0.0);

    for cycle in 1..=params.time_horizon as i32 {
        let next_stable = stable * (1.0 - p_sp - p_sd);
        let next_progressed = stable * p_sp + progressed * (1.0 - p_pd);
        stable = next_stable;
        progressed = next_progressed;

        let discount = 1.0 / (1.0 + r).powf(f64::from(cycle));
        cost += discount
            * (stable * (params.cost_state_s + drug_cost)
                + progressed * (params.cost_state_p + drug_cost));
        qalys += discount
            * (stable * params.utility_stable + progressed * params.utility_progression);
    }
    (cost, qalys)
}

#[test]
fn test_drug_comparison_matches_hand_calculation() {
    let params = CohortParams::default();
    let result = three_state::run(&params, TraceMode::Full).unwrap();

    let (cost_a, qalys_a) = recompute(&params, params.prob_s_to_p_a, params.cost_drug_a);
    let (cost_b, qalys_b) = recompute(&params, params.prob_s_to_p_b, params.cost_drug_b);

    assert!((result.intervention.total_cost - cost_a).abs() < 1e-6);
    assert!((result.intervention.total_effect - qalys_a).abs() < 1e-9);
    assert!((result.comparator.total_cost - cost_b).abs() < 1e-6);
    assert!((result.comparator.total_effect - qalys_b).abs() < 1e-9);

    let n = params.cohort_size;
    let delta_cost = cost_a / n - cost_b / n;
    let delta_qalys = qalys_a / n - qalys_b / n;
    let expected_icer = delta_cost / delta_qalys;
    assert!((result.icer.icer - expected_icer).abs() < 1e-6);
    // Roughly 11 800 per QALY: cost-effective at 30 000
    assert_eq!(result.icer.conclusion, Conclusion::CostEffective);

    let response = run_cohort_analysis(&params).unwrap();
    assert_eq!(response.intervention.name, INTERVENTION);
    assert_eq!(response.comparator.name, COMPARATOR);
    assert_eq!(response.intervention.total_cost, round_currency(cost_a));
    assert_eq!(response.icer.icer, Some(round_currency(expected_icer)));
    assert_eq!(response.icer.delta_effect, round_ratio(delta_qalys));
}

#[test]
fn test_flexible_model_from_json() {
    let config: FlexibleModelConfig = serde_json::from_str(
        r#"{
            "model_name": "Screening",
            "time_horizon": 5,
            "half_cycle_correction": false,
            "states": [
                {"name": "Well", "cost": 100, "utility": 0.9},
                {"name": "Ill", "cost": 2000, "utility": 0.6, "one_time_cost": 500},
                {"name": "Dead", "state_type": "absorbing"}
            ],
            "strategies": [
                {"name": "No screening", "transitions": [
                    {"from": "Well", "to": "Ill", "probability": 0.2},
                    {"from": "Well", "to": "Dead", "probability": 0.01},
                    {"from": "Ill", "to": "Dead", "probability": 0.1}
                ]},
                {"name": "Annual screening", "transitions": [
                    {"from": "Well", "to": "Ill", "probability": 0.12},
                    {"from": "Well", "to": "Dead", "probability": 0.01},
                    {"from": "Ill", "to": "Dead", "probability": 0.08}
                ], "state_costs": {"Well": 250}},
                {"name": "Gold plated", "transitions": [
                    {"from": "Well", "to": "Ill", "probability": 0.12},
                    {"from": "Well", "to": "Dead", "probability": 0.01},
                    {"from": "Ill", "to": "Dead", "probability": 0.08}
                ], "state_costs": {"Well": 900}}
            ]
        }"#,
    )
    .unwrap();

    let response = run_flexible_cohort_analysis(&config).unwrap();
    assert_eq!(response.model_name, "Screening");
    assert_eq!(response.state_names, vec!["Well", "Ill", "Dead"]);
    assert_eq!(response.n_cycles, 5);
    assert_eq!(response.strategies.len(), 3);
    assert_eq!(response.icers.len(), 2);
    assert!(response.strategies.iter().all(|s| s.trace.is_some() && s.cycles.is_none()));

    // Same effect as annual screening at a higher cost
    let frontier = response.frontier.unwrap();
    let gold = frontier.iter().find(|e| e.name == "Gold plated").unwrap();
    assert_eq!(
        gold.status,
        crate::economics::FrontierStatus::StronglyDominated
    );
}

#[test]
fn test_decision_tree_from_json() {
    let request: DecisionTreeRequest = serde_json::from_str(
        r#"{
            "name": "Treatment choice",
            "wtp_threshold": 30000,
            "tree": {
                "type": "decision", "name": "Choose",
                "children": [
                    {"type": "chance", "name": "New", "children": [
                        {"type": "terminal", "name": "Success", "probability": 0.75, "cost": 15000, "effectiveness": 0.9},
                        {"type": "terminal", "name": "Failure", "probability": 0.25, "cost": 25000, "effectiveness": 0.4}
                    ]},
                    {"type": "chance", "name": "Standard", "children": [
                        {"type": "terminal", "name": "Success", "probability": 0.55, "cost": 8000, "effectiveness": 0.85},
                        {"type": "terminal", "name": "Failure", "probability": 0.45, "cost": 20000, "effectiveness": 0.35}
                    ]}
                ]
            },
            "sensitivity": [
                {"node": "New/Success", "attribute": "cost", "low": 10000, "high": 40000, "n_steps": 4}
            ]
        }"#,
    )
    .unwrap();

    let response = run_decision_tree(&request).unwrap();
    assert_eq!(response.optimal_strategy.as_deref(), Some("New"));
    assert_eq!(response.strategies[0].expected_cost, 17_500.0);
    assert_eq!(response.strategies[1].expected_effectiveness, 0.625);
    assert_eq!(response.icers.len(), 1);

    let sweep = &response.sensitivity[0];
    assert_eq!(sweep.original_value, 15_000.0);
    assert_eq!(sweep.points.len(), 4);
    // Expensive success flips the decision
    assert_eq!(sweep.points[0].optimal_choice.as_deref(), Some("New"));
    assert_eq!(sweep.points[3].optimal_choice.as_deref(), Some("Standard"));
    // The tree is restored after the sweep
    assert_eq!(response.tree.expected_cost, Some(17_500.0));
}

#[test]
fn test_budget_impact_without_uptake_is_zero() {
    let config = BudgetImpactConfig {
        max_market_share: 0.0,
        ..BudgetImpactConfig::default()
    };
    let response = run_budget_impact(&config).unwrap();
    assert!(response.budget_impact.iter().all(|&v| v == 0.0));
    assert_eq!(response.total_impact, 0.0);
    assert_eq!(response.costs_current, response.costs_new);
}

#[test]
fn test_tornado_through_api() {
    let request = TornadoRequest {
        parameters: vec![
            ParameterRange::new(CohortParameter::UtilityStable, 0.8, 0.9),
            ParameterRange::new(CohortParameter::CostDrugA, 2500.0, 4500.0),
        ],
        ..TornadoRequest::default()
    };
    let response = run_tornado(&request).unwrap();
    assert_eq!(response.tornado[0].parameter, CohortParameter::CostDrugA);
    assert!(response.base_icer.is_some());
    assert!(response.one_way.is_empty());
}

#[test]
fn test_psa_feeds_value_of_information() {
    let mut request = PsaRequest {
        n_iterations: 300,
        ..PsaRequest::default()
    };
    request.distributions.insert(
        CohortParameter::ProbSToPA,
        ParameterDistribution::Beta {
            alpha: 10.0,
            beta: 90.0,
        },
    );
    request.distributions.insert(
        CohortParameter::CostDrugA,
        ParameterDistribution::Gamma {
            shape: 20.0,
            scale: 350.0,
        },
    );
    request.distributions.insert(
        CohortParameter::UtilityProgression,
        ParameterDistribution::Beta {
            alpha: 50.0,
            beta: 50.0,
        },
    );

    let psa = run_psa(&request).unwrap();
    assert_eq!(psa.statistics.n_iterations, 300);
    assert!(psa.statistics.n_valid > 0);

    let samples: Vec<VoiSample> = psa
        .iterations
        .iter()
        .map(|it| VoiSample {
            parameters: it
                .parameters
                .iter()
                .map(|(p, &v)| (p.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
            costs: it.costs.clone(),
            effects: it.qalys.clone(),
        })
        .collect();

    let voi = run_voi(&VoiRequest::new(samples)).unwrap();
    assert_eq!(voi.n_samples, psa.statistics.n_valid);
    assert!(voi.evpi.per_patient >= 0.0);
    assert_eq!(voi.evppi.len(), 3);
    for e in &voi.evppi {
        assert!(e.per_patient <= voi.evpi.per_patient);
        assert!((0.0..=100.0).contains(&e.contribution_pct));
    }
    let total: f64 = voi.probability_optimal.values().sum();
    assert!((total - 1.0).abs() < 1e-3);
}
