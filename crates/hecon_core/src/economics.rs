//! Incremental cost-effectiveness: ICERs, quadrants, dominance and the
//! efficiency frontier.
//!
//! Every analysis (cohort, decision tree, PSA) compares strategies through
//! [`IcerResult::compare`], so the classification rules live in one place.

use serde::{Deserialize, Serialize};

/// Position of the intervention on the cost-effectiveness plane relative to
/// the comparator (x = effect, y = cost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    /// More costly, at least as effective
    NE,
    /// Cheaper, at least as effective
    SE,
    /// More costly, less effective
    NW,
    /// Cheaper, less effective
    SW,
}

impl Quadrant {
    #[must_use]
    pub fn from_deltas(delta_cost: f64, delta_effect: f64) -> Self {
        match (delta_cost >= 0.0, delta_effect >= 0.0) {
            (true, true) => Quadrant::NE,
            (false, true) => Quadrant::SE,
            (true, false) => Quadrant::NW,
            (false, false) => Quadrant::SW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Dominated,
    Dominant,
    CostEffective,
    NotCostEffective,
}

/// Cost and effect of one strategy, per patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub name: String,
    pub cost: f64,
    pub effect: f64,
}

impl StrategyOutcome {
    pub fn new(name: impl Into<String>, cost: f64, effect: f64) -> Self {
        Self {
            name: name.into(),
            cost,
            effect,
        }
    }

    /// `effect * wtp - cost`
    #[must_use]
    pub fn net_monetary_benefit(&self, wtp: f64) -> f64 {
        net_monetary_benefit(self.cost, self.effect, wtp)
    }
}

#[must_use]
#[inline]
pub fn net_monetary_benefit(cost: f64, effect: f64, wtp: f64) -> f64 {
    effect * wtp - cost
}

/// `delta_cost / delta_effect`; a zero effect difference gives `+inf` when
/// the intervention costs more and `-inf` otherwise.
#[must_use]
pub fn icer(delta_cost: f64, delta_effect: f64) -> f64 {
    if delta_effect == 0.0 {
        if delta_cost > 0.0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    } else {
        delta_cost / delta_effect
    }
}

/// Costs more without being more effective, or costs no less while being
/// less effective.
#[must_use]
pub fn is_dominated(delta_cost: f64, delta_effect: f64) -> bool {
    (delta_cost > 0.0 && delta_effect <= 0.0) || (delta_cost >= 0.0 && delta_effect < 0.0)
}

#[must_use]
pub fn is_dominant(delta_cost: f64, delta_effect: f64) -> bool {
    (delta_cost < 0.0 && delta_effect >= 0.0) || (delta_cost <= 0.0 && delta_effect > 0.0)
}

/// Cost-effective at a threshold: dominant, or a finite ICER below `wtp`.
/// Identical strategies (no cost or effect difference) never qualify.
#[must_use]
pub fn is_acceptable_at(delta_cost: f64, delta_effect: f64, wtp: f64) -> bool {
    if is_dominant(delta_cost, delta_effect) {
        return true;
    }
    let ratio = icer(delta_cost, delta_effect);
    ratio.is_finite() && ratio < wtp
}

/// Pairwise comparison of an intervention against a comparator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcerResult {
    pub comparator: String,
    pub intervention: String,
    pub delta_cost: f64,
    pub delta_effect: f64,
    /// Infinite when `delta_effect` is zero
    pub icer: f64,
    pub quadrant: Quadrant,
    pub is_dominated: bool,
    pub is_dominant: bool,
    /// `delta_effect * wtp - delta_cost`
    pub net_monetary_benefit: f64,
    pub conclusion: Conclusion,
}

impl IcerResult {
    #[must_use]
    pub fn compare(comparator: &StrategyOutcome, intervention: &StrategyOutcome, wtp: f64) -> Self {
        let delta_cost = intervention.cost - comparator.cost;
        let delta_effect = intervention.effect - comparator.effect;
        let dominated = is_dominated(delta_cost, delta_effect);
        let dominant = is_dominant(delta_cost, delta_effect);
        let nmb = net_monetary_benefit(delta_cost, delta_effect, wtp);

        let conclusion = if dominated {
            Conclusion::Dominated
        } else if dominant {
            Conclusion::Dominant
        } else if nmb > 0.0 {
            Conclusion::CostEffective
        } else {
            Conclusion::NotCostEffective
        };

        Self {
            comparator: comparator.name.clone(),
            intervention: intervention.name.clone(),
            delta_cost,
            delta_effect,
            icer: icer(delta_cost, delta_effect),
            quadrant: Quadrant::from_deltas(delta_cost, delta_effect),
            is_dominated: dominated,
            is_dominant: dominant,
            net_monetary_benefit: nmb,
            conclusion,
        }
    }
}

/// First strategy as the shared comparator for every other strategy
#[must_use]
pub fn compare_against_first(outcomes: &[StrategyOutcome], wtp: f64) -> Vec<IcerResult> {
    match outcomes.split_first() {
        Some((comparator, rest)) => rest
            .iter()
            .map(|intervention| IcerResult::compare(comparator, intervention, wtp))
            .collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierStatus {
    /// On the efficiency frontier
    Efficient,
    /// Costlier and no more effective than another strategy
    StronglyDominated,
    /// Off the frontier because a mix of neighbours is more efficient
    ExtendedlyDominated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub name: String,
    pub cost: f64,
    pub effect: f64,
    pub status: FrontierStatus,
    /// ICER against the previous frontier strategy; `None` for the cheapest
    /// frontier strategy and for strategies off the frontier.
    pub sequential_icer: Option<f64>,
}

/// Build the incremental efficiency frontier.
///
/// Strategies are sorted by cost (ties by effect, descending). Strongly
/// dominated strategies are dropped first, then extended dominance is
/// removed iteratively until ICERs along the frontier never decrease.
/// Entries come back in cost order.
#[must_use]
pub fn efficiency_frontier(outcomes: &[StrategyOutcome]) -> Vec<FrontierEntry> {
    let mut order: Vec<usize> = (0..outcomes.len()).collect();
    order.sort_by(|&a, &b| {
        outcomes[a]
            .cost
            .total_cmp(&outcomes[b].cost)
            .then(outcomes[b].effect.total_cmp(&outcomes[a].effect))
    });

    let mut status = vec![FrontierStatus::Efficient; outcomes.len()];

    // Strong dominance: after sorting by cost, anything not strictly more
    // effective than the best cheaper strategy is dominated.
    let mut best_effect = f64::NEG_INFINITY;
    for &i in &order {
        if outcomes[i].effect > best_effect {
            best_effect = outcomes[i].effect;
        } else {
            status[i] = FrontierStatus::StronglyDominated;
        }
    }

    let mut frontier: Vec<usize> = order
        .iter()
        .copied()
        .filter(|&i| status[i] == FrontierStatus::Efficient)
        .collect();

    loop {
        let icers: Vec<f64> = frontier
            .windows(2)
            .map(|w| {
                let (prev, next) = (&outcomes[w[0]], &outcomes[w[1]]);
                icer(next.cost - prev.cost, next.effect - prev.effect)
            })
            .collect();

        // A strategy whose ICER exceeds that of its successor is
        // extendedly dominated
        let Some(pos) = icers.windows(2).position(|w| w[0] > w[1]) else {
            break;
        };
        let removed = frontier.remove(pos + 1);
        status[removed] = FrontierStatus::ExtendedlyDominated;
    }

    let mut sequential = vec![None; outcomes.len()];
    for w in frontier.windows(2) {
        let (prev, next) = (&outcomes[w[0]], &outcomes[w[1]]);
        sequential[w[1]] = Some(icer(next.cost - prev.cost, next.effect - prev.effect));
    }

    order
        .into_iter()
        .map(|i| FrontierEntry {
            name: outcomes[i].name.clone(),
            cost: outcomes[i].cost,
            effect: outcomes[i].effect,
            status: status[i],
            sequential_icer: sequential[i],
        })
        .collect()
}
