//! Invariants that hold for any valid input

use std::collections::BTreeMap;

use crate::decision_tree::{DecisionTree, NodeSpec, TreeAttribute, TreeSensitivityRequest};
use crate::markov::{
    CohortParameter, CohortParams, FlexibleModelConfig, HealthState, Strategy, TimeDependence,
    TraceMode, Transition,
};
use crate::sampling::ParameterDistribution;
use crate::sensitivity::probabilistic::{self, PsaRequest};
use crate::voi::{self, VoiRequest, VoiSample};

fn tunnel_model() -> FlexibleModelConfig {
    let states = vec![
        HealthState::transient("Healthy", 500.0, 0.95),
        HealthState::tunnel("Post-event", 3, 8000.0, 0.6).with_one_time_cost(12_000.0),
        HealthState::transient("Chronic", 3000.0, 0.7),
        HealthState::absorbing("Dead"),
    ];
    let strategy = Strategy::new(
        "Usual care",
        vec![
            Transition::new("Healthy", "Post-event", 0.08)
                .with_time_dependence(TimeDependence::ExponentialIncrease { factor: 1.3 }),
            Transition::new("Healthy", "Dead", 0.01)
                .with_time_dependence(TimeDependence::WeibullHazard {
                    shape: 2.0,
                    scale: 12.0,
                }),
            Transition::new("Post-event", "Chronic", 0.4),
            Transition::new("Post-event", "Dead", 0.1).with_cost(2500.0),
            Transition::new("Chronic", "Dead", 0.12),
        ],
    );
    FlexibleModelConfig {
        time_horizon: 20.0,
        ..FlexibleModelConfig::new(states, vec![strategy])
    }
}

#[test]
fn test_matrices_are_row_stochastic() {
    let config = tunnel_model();
    let model = config.model().unwrap();
    let strategy = &config.strategies[0];

    assert_eq!(model.expanded_size(), 6);
    for cycle in 1..=model.n_cycles() {
        let matrix = model.transition_matrix(strategy, cycle).unwrap();
        for row in 0..matrix.size() {
            assert!(
                (matrix.row_sum(row) - 1.0).abs() < 1e-9,
                "row {row} sums to {} at cycle {cycle}",
                matrix.row_sum(row)
            );
        }
    }
}

#[test]
fn test_trace_rows_sum_to_cohort() {
    let config = tunnel_model();
    let model = config.model().unwrap();
    let result = model.run(&config.strategies[0], TraceMode::Full).unwrap();
    let trace = result.trace.unwrap();

    assert_eq!(trace.len(), model.n_cycles() + 1);
    for row in &trace {
        assert_eq!(row.len(), 4);
        assert!((row.iter().sum::<f64>() - config.cohort_size).abs() < 1e-6);
    }
    // Deaths only accumulate
    assert!(trace.windows(2).all(|w| w[1][3] >= w[0][3] - 1e-9));
}

#[test]
fn test_zero_event_model_keeps_everyone_stable() {
    let params = CohortParams {
        prob_s_to_p_a: 0.0,
        prob_s_to_p_b: 0.0,
        prob_s_to_d: 0.0,
        prob_p_to_d: 0.0,
        discount_rate: 0.0,
        time_horizon: 7.0,
        cohort_size: 250.0,
        ..CohortParams::default()
    };
    let result = crate::markov::three_state::run(&params, TraceMode::SummaryOnly).unwrap();
    let expected = 250.0 * params.utility_stable * 7.0;
    assert!((result.intervention.total_effect - expected).abs() < 1e-9);
    assert!((result.comparator.total_effect - expected).abs() < 1e-9);
    // Same effect, dearer drug
    assert!(result.icer.is_dominated);
    assert!(result.icer.icer.is_infinite());
}

#[test]
fn test_tree_rollback_and_sweep_restore_state() {
    let spec = NodeSpec::decision(
        "Screen?",
        vec![
            NodeSpec::chance(
                "Screen",
                vec![
                    NodeSpec::terminal("Detected", 4000.0, 0.92).with_probability(0.3),
                    NodeSpec::terminal("Clear", 300.0, 0.99).with_probability(0.7),
                ],
            ),
            NodeSpec::terminal("No screen", 0.0, 0.95),
        ],
    );
    let mut tree = DecisionTree::new(&spec, 20_000.0).unwrap();
    let first = tree.rollback().unwrap();
    let evaluated = tree.root().clone();
    assert_eq!(tree.rollback().unwrap(), first);

    let request = TreeSensitivityRequest {
        node: "Screen/Detected".to_string(),
        attribute: TreeAttribute::Probability,
        low: 0.0,
        high: 0.6,
        n_steps: 7,
    };
    let sweep = tree.one_way_sensitivity(&request).unwrap();
    assert_eq!(sweep.points.len(), 7);
    assert_eq!(sweep.original_value, 0.3);
    assert_eq!(tree.root(), &evaluated);
}

fn psa_request(seed: u64, n_iterations: usize) -> PsaRequest {
    let mut distributions = BTreeMap::new();
    distributions.insert(
        CohortParameter::CostStateP,
        ParameterDistribution::Lognormal {
            mean: 8.4,
            std: 0.2,
        },
    );
    distributions.insert(
        CohortParameter::UtilityStable,
        ParameterDistribution::Triangular {
            min: 0.75,
            mode: 0.85,
            max: 0.9,
        },
    );
    distributions.insert(
        CohortParameter::ProbPToD,
        ParameterDistribution::Normal {
            mean: 0.15,
            std: 0.02,
        },
    );
    PsaRequest {
        distributions,
        n_iterations,
        seed,
        ..PsaRequest::default()
    }
}

#[test]
fn test_psa_draws_depend_only_on_seed() {
    let a = psa_request(2024, 50).draws().unwrap();
    let b = psa_request(2024, 50).draws().unwrap();
    assert_eq!(a, b);

    // A longer run extends the same sequence
    let longer = psa_request(2024, 80).draws().unwrap();
    assert_eq!(&longer[..50], &a[..]);

    let other = psa_request(2025, 50).draws().unwrap();
    assert_ne!(a, other);
}

#[test]
fn test_psa_empty_runs_are_valid() {
    let empty = probabilistic::run(&psa_request(1, 0)).unwrap();
    assert_eq!(empty.statistics.n_requested, 0);
    assert_eq!(empty.statistics.median_icer, None);

    let mut failing = psa_request(1, 10);
    failing.base.prob_s_to_p_b = 0.99;
    let analysis = probabilistic::run(&failing).unwrap();
    assert_eq!(analysis.statistics.n_valid, 0);
    assert_eq!(analysis.statistics.n_skipped, 10);
    assert_eq!(analysis.statistics.mean_delta_cost, None);
}

fn voi_batch(n: usize) -> Vec<VoiSample> {
    // Deterministic spread of outcomes over three strategies
    (0..n)
        .map(|i| {
            let x = (i as f64 * 0.618_034).fract();
            let y = (i as f64 * 0.414_214).fract();
            VoiSample {
                parameters: BTreeMap::from([
                    ("efficacy".to_string(), x),
                    ("price".to_string(), y),
                ]),
                costs: BTreeMap::from([
                    ("Standard".to_string(), 10_000.0),
                    ("New".to_string(), 14_000.0 + 6_000.0 * y),
                    ("Combo".to_string(), 19_000.0),
                ]),
                effects: BTreeMap::from([
                    ("Standard".to_string(), 5.0),
                    ("New".to_string(), 5.0 + 0.4 * x),
                    ("Combo".to_string(), 5.2 + 0.2 * x),
                ]),
            }
        })
        .collect()
}

#[test]
fn test_evppi_bounded_by_evpi() {
    for n in [20, 250, 1200] {
        let analysis = voi::run(&VoiRequest::new(voi_batch(n))).unwrap();
        assert!(analysis.evpi.per_patient >= 0.0);
        for e in &analysis.evppi {
            assert!(e.value.per_patient >= 0.0);
            assert!(e.value.per_patient <= analysis.evpi.per_patient + 1e-9);
        }
        assert!(
            analysis
                .evppi
                .windows(2)
                .all(|w| w[0].contribution_pct >= w[1].contribution_pct)
        );
        let total: f64 = analysis.probability_optimal.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_evpi_is_zero_without_decision_uncertainty() {
    let nmb: Vec<Vec<f64>> = (0..100).map(|i| vec![1000.0 + i as f64, 0.0]).collect();
    assert_eq!(voi::evpi(&nmb), 0.0);
    let values: Vec<f64> = (0..100).map(f64::from).collect();
    assert!(voi::evppi(&values, &nmb) < 1e-9);
}
