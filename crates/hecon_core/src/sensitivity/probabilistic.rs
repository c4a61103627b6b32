//! Probabilistic sensitivity analysis of the 3-state model
//!
//! All draws come from a single seeded stream and are generated up front,
//! in iteration order, before any model runs. Iterations may then be
//! evaluated in any order (or in parallel) without changing the result.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::economics::{is_acceptable_at, net_monetary_benefit};
use crate::error::Result;
use crate::markov::three_state::{self, COMPARATOR, INTERVENTION};
use crate::markov::{CohortParameter, CohortParams, TraceMode};
use crate::sampling::ParameterDistribution;
use crate::stats::{linspace, mean, percentile_sorted, sorted_finite};

/// Largest willingness-to-pay on the acceptability curve
pub const CEAC_MAX_WTP: f64 = 100_000.0;
pub const CEAC_POINTS: usize = 100;

fn default_n_iterations() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

/// Sampled values keyed by parameter, in a stable order
pub type ParameterDraw = BTreeMap<CohortParameter, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PsaRequest {
    /// Values of every parameter without a distribution
    #[serde(default)]
    pub base: CohortParams,
    #[serde(default)]
    pub distributions: BTreeMap<CohortParameter, ParameterDistribution>,
    #[serde(default = "default_n_iterations")]
    pub n_iterations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for PsaRequest {
    fn default() -> Self {
        Self {
            base: CohortParams::default(),
            distributions: BTreeMap::new(),
            n_iterations: default_n_iterations(),
            seed: default_seed(),
        }
    }
}

impl PsaRequest {
    /// Every declared distribution, checked before any draw.
    pub fn validate(&self) -> Result<()> {
        self.distributions
            .values()
            .try_for_each(ParameterDistribution::validate)
    }

    /// Draws for every iteration, in order, from one stream seeded with
    /// `seed`. Within an iteration parameters are drawn in declaration
    /// order of [`CohortParameter`].
    pub fn draws(&self) -> Result<Vec<ParameterDraw>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.n_iterations)
            .map(|_| {
                self.distributions
                    .iter()
                    .map(|(&parameter, dist)| Ok((parameter, dist.sample(&mut rng)?)))
                    .collect::<Result<ParameterDraw>>()
            })
            .collect()
    }
}

/// Per-patient outcome of one successful iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsaIteration {
    /// 1-based position in the draw sequence
    pub iteration: usize,
    pub parameters: ParameterDraw,
    pub cost_intervention: f64,
    pub cost_comparator: f64,
    pub effect_intervention: f64,
    pub effect_comparator: f64,
    pub delta_cost: f64,
    pub delta_effect: f64,
    pub icer: f64,
    pub nmb_intervention: f64,
    pub nmb_comparator: f64,
    pub optimal: String,
}

/// Summary over the successful iterations; every statistic is `None` when
/// none succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PsaStatistics {
    pub n_requested: usize,
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

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CeacPoint {
    pub wtp: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsaAnalysis {
    pub wtp_threshold: f64,
    pub statistics: PsaStatistics,
    pub ceac: Vec<CeacPoint>,
    pub iterations: Vec<PsaIteration>,
}

/// `None` when the engine rejects the draw or the ICER is not finite.
fn evaluate(base: &CohortParams, index: usize, draw: &ParameterDraw) -> Option<PsaIteration> {
    let params = draw
        .iter()
        .fold(base.clone(), |params, (&parameter, &value)| {
            params.with(parameter, value)
        });

    let comparison = match three_state::run(&params, TraceMode::SummaryOnly) {
        Ok(comparison) => comparison,
        Err(err) => {
            debug!(iteration = index + 1, error = %err, "skipping PSA iteration");
            return None;
        }
    };

    let icer = comparison.icer.icer;
    if !icer.is_finite() {
        debug!(iteration = index + 1, icer, "skipping PSA iteration with non-finite ICER");
        return None;
    }

    let wtp = params.wtp_threshold;
    let a = comparison.intervention.outcome();
    let b = comparison.comparator.outcome();
    let nmb_a = net_monetary_benefit(a.cost, a.effect, wtp);
    let nmb_b = net_monetary_benefit(b.cost, b.effect, wtp);

    Some(PsaIteration {
        iteration: index + 1,
        parameters: draw.clone(),
        cost_intervention: a.cost,
        cost_comparator: b.cost,
        effect_intervention: a.effect,
        effect_comparator: b.effect,
        delta_cost: comparison.icer.delta_cost,
        delta_effect: comparison.icer.delta_effect,
        icer,
        nmb_intervention: nmb_a,
        nmb_comparator: nmb_b,
        optimal: if nmb_a > nmb_b { INTERVENTION } else { COMPARATOR }.to_string(),
    })
}

fn fraction_acceptable(iterations: &[PsaIteration], wtp: f64) -> f64 {
    let accepted = iterations
        .iter()
        .filter(|it| is_acceptable_at(it.delta_cost, it.delta_effect, wtp))
        .count();
    accepted as f64 / iterations.len() as f64
}

fn summarize(requested: usize, iterations: &[PsaIteration], wtp: f64) -> PsaStatistics {
    let n_valid = iterations.len();
    let mut stats = PsaStatistics {
        n_requested: requested,
        n_valid,
        n_skipped: requested - n_valid,
        ..PsaStatistics::default()
    };
    if n_valid == 0 {
        return stats;
    }

    let icers = sorted_finite(iterations.iter().map(|it| it.icer));
    let delta_costs: Vec<f64> = iterations.iter().map(|it| it.delta_cost).collect();
    let delta_effects: Vec<f64> = iterations.iter().map(|it| it.delta_effect).collect();

    stats.mean_icer = mean(&icers);
    stats.median_icer = percentile_sorted(&icers, 50.0);
    stats.ci_lower = percentile_sorted(&icers, 2.5);
    stats.ci_upper = percentile_sorted(&icers, 97.5);
    stats.mean_delta_cost = mean(&delta_costs);
    stats.mean_delta_effect = mean(&delta_effects);
    stats.prob_cost_effective = Some(fraction_acceptable(iterations, wtp));
    stats
}

/// Acceptability of the intervention over `thresholds`; empty without
/// successful iterations.
#[must_use]
pub fn acceptability_curve(iterations: &[PsaIteration], thresholds: &[f64]) -> Vec<CeacPoint> {
    if iterations.is_empty() {
        return Vec::new();
    }
    thresholds
        .iter()
        .map(|&wtp| CeacPoint {
            wtp,
            probability: fraction_acceptable(iterations, wtp),
        })
        .collect()
}

pub fn run(request: &PsaRequest) -> Result<PsaAnalysis> {
    request.validate()?;
    let draws = request.draws()?;
    let base = &request.base;

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Option<PsaIteration>> = draws
        .par_iter()
        .enumerate()
        .map(|(i, draw)| evaluate(base, i, draw))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Option<PsaIteration>> = draws
        .iter()
        .enumerate()
        .map(|(i, draw)| evaluate(base, i, draw))
        .collect();

    let iterations: Vec<PsaIteration> = outcomes.into_iter().flatten().collect();
    let wtp = base.wtp_threshold;
    let statistics = summarize(request.n_iterations, &iterations, wtp);
    let ceac = acceptability_curve(&iterations, &linspace(0.0, CEAC_MAX_WTP, CEAC_POINTS));

    debug!(
        requested = statistics.n_requested,
        valid = statistics.n_valid,
        skipped = statistics.n_skipped,
        "PSA complete"
    );

    Ok(PsaAnalysis {
        wtp_threshold: wtp,
        statistics,
        ceac,
        iterations,
    })
}
