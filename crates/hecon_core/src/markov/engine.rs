//! Cohort state-transition engine
//!
//! A [`CohortModel`] owns the declared states, the timing settings and the
//! initial distribution. Strategies only differ in their transitions and
//! per-state cost/utility overrides, so one model runs every strategy of an
//! analysis.
//!
//! Tunnel states are expanded into `tunnel_length` internal sub-states.
//! Matrices and occupancy vectors work on that expanded space; traces are
//! reported per declared state.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::state::{HealthState, StateKind};
use super::transition::{Transition, TransitionMatrix};
use crate::economics::StrategyOutcome;
use crate::error::{EngineError, Result};

/// Row sums above `1 + ROW_TOLERANCE` are treated as over-specified.
const ROW_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Years
    pub time_horizon: f64,
    /// Years per cycle
    pub cycle_length: f64,
    pub discount_rate_costs: f64,
    pub discount_rate_outcomes: f64,
    pub half_cycle_correction: bool,
    pub cohort_size: f64,
    /// Reject rows summing above 1 instead of normalizing them
    pub strict_probabilities: bool,
}

impl ModelSettings {
    #[must_use]
    pub fn n_cycles(&self) -> usize {
        (self.time_horizon / self.cycle_length + 1e-9).floor() as usize
    }

    /// `1 / (1 + rate)^(cycle * cycle_length)`
    #[must_use]
    pub fn discount_factor(&self, rate: f64, cycle: usize) -> f64 {
        1.0 / (1.0 + rate).powf(cycle as f64 * self.cycle_length)
    }

    fn validate(&self) -> Result<()> {
        if !(self.time_horizon > 0.0 && self.time_horizon.is_finite()) {
            return Err(EngineError::config("time_horizon must be positive"));
        }
        if !(self.cycle_length > 0.0 && self.cycle_length.is_finite()) {
            return Err(EngineError::config("cycle_length must be positive"));
        }
        if !(self.cohort_size > 0.0 && self.cohort_size.is_finite()) {
            return Err(EngineError::config("cohort_size must be positive"));
        }
        for (name, rate) in [
            ("discount_rate_costs", self.discount_rate_costs),
            ("discount_rate_outcomes", self.discount_rate_outcomes),
        ] {
            if !(rate > -1.0 && rate.is_finite()) {
                return Err(EngineError::config(format!("{name} must be above -1")));
            }
        }
        if self.n_cycles() == 0 {
            return Err(EngineError::config(
                "time_horizon is shorter than a single cycle",
            ));
        }
        Ok(())
    }
}

/// Whether a run keeps the cohort trace and per-cycle outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceMode {
    #[default]
    Full,
    /// Totals only; used by PSA and tornado runs
    SummaryOnly,
}

/// Strategy-specific transitions and payoff overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Strategy {
    pub name: String,
    pub transitions: Vec<Transition>,
    /// Replaces the declared per-cycle cost of the named states
    #[serde(default)]
    pub state_costs: FxHashMap<String, f64>,
    /// Replaces the declared utility of the named states
    #[serde(default)]
    pub state_utilities: FxHashMap<String, f64>,
}

impl Strategy {
    pub fn new(name: impl Into<String>, transitions: Vec<Transition>) -> Self {
        Self {
            name: name.into(),
            transitions,
            state_costs: FxHashMap::default(),
            state_utilities: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_state_cost(mut self, state: impl Into<String>, cost: f64) -> Self {
        self.state_costs.insert(state.into(), cost);
        self
    }

    #[must_use]
    pub fn with_state_utility(mut self, state: impl Into<String>, utility: f64) -> Self {
        self.state_utilities.insert(state.into(), utility);
        self
    }
}

/// Cohort-level payoffs of one cycle, after half-cycle weighting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub cycle: usize,
    pub cost: f64,
    pub effect: f64,
    pub life_years: f64,
    pub discounted_cost: f64,
    pub discounted_effect: f64,
    pub discounted_life_years: f64,
}

/// Totals are for the whole cohort; use the `*_per_patient` accessors for
/// per-patient values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyResult {
    pub name: String,
    pub cohort_size: f64,
    pub total_cost: f64,
    pub total_effect: f64,
    pub total_life_years: f64,
    pub undiscounted_cost: f64,
    pub undiscounted_effect: f64,
    pub undiscounted_life_years: f64,
    /// `(cycles + 1) x states`, row 0 is the initial distribution
    pub trace: Option<Vec<Vec<f64>>>,
    pub cycles: Option<Vec<CycleOutcome>>,
}

impl StrategyResult {
    #[must_use]
    pub fn cost_per_patient(&self) -> f64 {
        self.total_cost / self.cohort_size
    }

    #[must_use]
    pub fn effect_per_patient(&self) -> f64 {
        self.total_effect / self.cohort_size
    }

    #[must_use]
    pub fn life_years_per_patient(&self) -> f64 {
        self.total_life_years / self.cohort_size
    }

    /// Per-patient cost and effect, as used for ICERs
    #[must_use]
    pub fn outcome(&self) -> StrategyOutcome {
        StrategyOutcome::new(
            self.name.clone(),
            self.cost_per_patient(),
            self.effect_per_patient(),
        )
    }
}

struct Edge<'a> {
    to: usize,
    transition: &'a Transition,
}

/// A strategy resolved against the model's state indices
struct CompiledStrategy<'a> {
    /// Outgoing edges per declared state
    edges: Vec<Vec<Edge<'a>>>,
    costs: Vec<f64>,
    utilities: Vec<f64>,
    time_dependent: bool,
}

#[derive(Debug, Clone)]
pub struct CohortModel {
    settings: ModelSettings,
    states: Vec<HealthState>,
    index: FxHashMap<String, usize>,
    /// First expanded index of each declared state
    start: Vec<usize>,
    n_expanded: usize,
    initial: Vec<f64>,
}

impl CohortModel {
    /// Validate the declaration and place the cohort.
    ///
    /// Without an explicit initial distribution the whole cohort starts in
    /// the first declared state. An explicit one may be given as counts
    /// summing to the cohort size or as fractions summing to 1.
    pub fn new(
        settings: ModelSettings,
        states: Vec<HealthState>,
        initial_distribution: Option<&FxHashMap<String, f64>>,
    ) -> Result<Self> {
        settings.validate()?;
        if states.is_empty() {
            return Err(EngineError::config("a model needs at least one state"));
        }

        let mut index = FxHashMap::default();
        let mut start = Vec::with_capacity(states.len());
        let mut n_expanded = 0;
        for (i, state) in states.iter().enumerate() {
            if index.insert(state.name.clone(), i).is_some() {
                return Err(EngineError::config(format!(
                    "state '{}' is declared twice",
                    state.name
                )));
            }
            if !(state.cost.is_finite()
                && state.utility.is_finite()
                && state.one_time_cost.is_finite())
            {
                return Err(EngineError::config(format!(
                    "state '{}' has non-finite payoffs",
                    state.name
                )));
            }
            if state.kind == StateKind::Tunnel && state.tunnel_length.unwrap_or(0) == 0 {
                return Err(EngineError::config(format!(
                    "tunnel state '{}' needs a positive tunnel_length",
                    state.name
                )));
            }
            start.push(n_expanded);
            n_expanded += state.span();
        }

        let mut model = Self {
            settings,
            states,
            index,
            start,
            n_expanded,
            initial: Vec::new(),
        };
        model.initial = model.initial_occupancy(initial_distribution)?;
        Ok(model)
    }

    fn initial_occupancy(&self, distribution: Option<&FxHashMap<String, f64>>) -> Result<Vec<f64>> {
        let cohort = self.settings.cohort_size;
        let mut occupancy = vec![0.0; self.n_expanded];

        let Some(distribution) = distribution else {
            occupancy[0] = cohort;
            return Ok(occupancy);
        };

        let mut total = 0.0;
        for (name, &value) in distribution {
            let idx = self.state_index(name)?;
            if !(value >= 0.0 && value.is_finite()) {
                return Err(EngineError::config(format!(
                    "initial occupancy of '{name}' must be a non-negative number"
                )));
            }
            occupancy[self.start[idx]] += value;
            total += value;
        }

        let scale = if (total - cohort).abs() <= 1e-6 * cohort.max(1.0) {
            1.0
        } else if (total - 1.0).abs() <= 1e-9 {
            cohort
        } else {
            return Err(EngineError::config(format!(
                "initial distribution sums to {total}, expected the cohort size {cohort} or 1"
            )));
        };
        for occ in &mut occupancy {
            *occ *= scale;
        }
        Ok(occupancy)
    }

    #[must_use]
    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    #[must_use]
    pub fn states(&self) -> &[HealthState] {
        &self.states
    }

    #[must_use]
    pub fn state_names(&self) -> Vec<String> {
        self.states.iter().map(|s| s.name.clone()).collect()
    }

    #[must_use]
    pub fn n_cycles(&self) -> usize {
        self.settings.n_cycles()
    }

    /// Size of the matrices after tunnel expansion
    #[must_use]
    pub fn expanded_size(&self) -> usize {
        self.n_expanded
    }

    pub fn state_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownState(name.to_string()))
    }

    fn compile<'a>(&self, strategy: &'a Strategy) -> Result<CompiledStrategy<'a>> {
        let mut costs: Vec<f64> = self.states.iter().map(|s| s.cost).collect();
        let mut utilities: Vec<f64> = self.states.iter().map(|s| s.utility).collect();
        for (name, &cost) in &strategy.state_costs {
            costs[self.state_index(name)?] = cost;
        }
        for (name, &utility) in &strategy.state_utilities {
            utilities[self.state_index(name)?] = utility;
        }
        if costs.iter().chain(&utilities).any(|v| !v.is_finite()) {
            return Err(EngineError::config(format!(
                "strategy '{}' overrides a payoff with a non-finite value",
                strategy.name
            )));
        }

        let mut edges: Vec<Vec<Edge<'a>>> = self.states.iter().map(|_| Vec::new()).collect();
        let mut time_dependent = false;

        for transition in &strategy.transitions {
            let from = self.state_index(&transition.from)?;
            let to = self.state_index(&transition.to)?;
            let state = &self.states[from];

            if !(transition.probability >= 0.0 && transition.probability.is_finite()) {
                return Err(EngineError::transitions(
                    &state.name,
                    format!(
                        "probability to '{}' must be a non-negative number, got {}",
                        transition.to, transition.probability
                    ),
                ));
            }
            if !transition.cost.is_finite() {
                return Err(EngineError::transitions(
                    &state.name,
                    format!("cost of the transition to '{}' is not finite", transition.to),
                ));
            }
            if state.kind == StateKind::Absorbing {
                debug!(
                    strategy = %strategy.name,
                    state = %state.name,
                    "ignoring transition out of absorbing state"
                );
                continue;
            }
            if state.kind == StateKind::Tunnel && from == to {
                return Err(EngineError::transitions(
                    &state.name,
                    "tunnel states cannot declare a self transition",
                ));
            }
            if edges[from].iter().any(|e| e.to == to) {
                return Err(EngineError::transitions(
                    &state.name,
                    format!("transition to '{}' is declared twice", transition.to),
                ));
            }

            time_dependent |= transition.time_dependence.is_some();
            edges[from].push(Edge { to, transition });
        }

        for (state, out) in self.states.iter().zip(&edges) {
            if state.kind != StateKind::Absorbing && out.is_empty() {
                return Err(EngineError::transitions(
                    &state.name,
                    "no outgoing transitions declared; declare the state absorbing instead",
                ));
            }
        }

        Ok(CompiledStrategy {
            edges,
            costs,
            utilities,
            time_dependent,
        })
    }

    /// Declared probabilities of one state at `cycle`, normalized when they
    /// sum above 1.
    fn outgoing_row(
        &self,
        compiled: &CompiledStrategy<'_>,
        state: usize,
        cycle: usize,
    ) -> Result<Vec<(usize, f64)>> {
        let name = &self.states[state].name;
        let mut row = Vec::with_capacity(compiled.edges[state].len());
        for edge in &compiled.edges[state] {
            let p = edge
                .transition
                .probability_at(cycle, self.settings.cycle_length);
            if !(p >= 0.0 && p.is_finite()) {
                return Err(EngineError::transitions(
                    name,
                    format!("probability to '{}' evaluates to {p} at cycle {cycle}", edge.transition.to),
                ));
            }
            row.push((edge.to, p));
        }

        let total: f64 = row.iter().map(|(_, p)| p).sum();
        if total > 1.0 + ROW_TOLERANCE {
            if self.settings.strict_probabilities {
                return Err(EngineError::transitions(
                    name,
                    format!("outgoing probabilities sum to {total:.6} at cycle {cycle}"),
                ));
            }
            warn!(state = %name, cycle, total, "normalizing transition row that sums above 1");
            for (_, p) in &mut row {
                *p /= total;
            }
        }
        Ok(row)
    }

    fn build_matrix(&self, compiled: &CompiledStrategy<'_>, cycle: usize) -> Result<TransitionMatrix> {
        let mut matrix = TransitionMatrix::zeros(self.n_expanded);

        for (s, state) in self.states.iter().enumerate() {
            let base = self.start[s];
            if state.kind == StateKind::Absorbing {
                matrix.set(base, base, 1.0);
                continue;
            }

            let row = self.outgoing_row(compiled, s, cycle)?;
            let total: f64 = row.iter().map(|(_, p)| p).sum();
            let residual = (1.0 - total).max(0.0);

            match state.kind {
                StateKind::Tunnel => {
                    let span = state.span();
                    for k in 0..span {
                        let from = base + k;
                        if k + 1 < span {
                            for &(to, p) in &row {
                                matrix.add(from, self.start[to], p);
                            }
                            matrix.add(from, from + 1, residual);
                        } else if total > 0.0 {
                            // Leaving the tunnel is mandatory
                            for &(to, p) in &row {
                                matrix.add(from, self.start[to], p / total);
                            }
                        } else {
                            matrix.set(from, from, 1.0);
                        }
                    }
                }
                _ => {
                    for &(to, p) in &row {
                        matrix.add(base, self.start[to], p);
                    }
                    matrix.add(base, base, residual);
                }
            }
        }

        Ok(matrix)
    }

    /// Transition matrix of `strategy` at `cycle`, in the expanded space.
    pub fn transition_matrix(&self, strategy: &Strategy, cycle: usize) -> Result<TransitionMatrix> {
        let compiled = self.compile(strategy)?;
        self.build_matrix(&compiled, cycle)
    }

    /// Sum expanded occupancy back onto declared states
    fn aggregate(&self, occupancy: &[f64]) -> Vec<f64> {
        self.states
            .iter()
            .enumerate()
            .map(|(s, state)| {
                let base = self.start[s];
                occupancy[base..base + state.span()].iter().sum()
            })
            .collect()
    }

    /// Run one strategy through every cycle.
    pub fn run(&self, strategy: &Strategy, mode: TraceMode) -> Result<StrategyResult> {
        let compiled = self.compile(strategy)?;
        let settings = &self.settings;
        let n_cycles = settings.n_cycles();
        let full = mode == TraceMode::Full;

        // Per expanded index
        let mut cost = vec![0.0; self.n_expanded];
        let mut utility = vec![0.0; self.n_expanded];
        let mut alive = vec![false; self.n_expanded];
        let mut owner = vec![0usize; self.n_expanded];
        for (s, state) in self.states.iter().enumerate() {
            for i in self.start[s]..self.start[s] + state.span() {
                cost[i] = compiled.costs[s];
                utility[i] = compiled.utilities[s];
                alive[i] = state.is_alive();
                owner[i] = s;
            }
        }

        let constant = if compiled.time_dependent {
            None
        } else {
            Some(self.build_matrix(&compiled, 0)?)
        };

        let mut occupancy = self.initial.clone();
        let mut trace = full.then(|| {
            let mut rows = Vec::with_capacity(n_cycles + 1);
            rows.push(self.aggregate(&occupancy));
            rows
        });
        let mut cycles = full.then(|| Vec::with_capacity(n_cycles));

        let mut result = StrategyResult {
            name: strategy.name.clone(),
            cohort_size: settings.cohort_size,
            total_cost: 0.0,
            total_effect: 0.0,
            total_life_years: 0.0,
            undiscounted_cost: 0.0,
            undiscounted_effect: 0.0,
            undiscounted_life_years: 0.0,
            trace: None,
            cycles: None,
        };

        for cycle in 1..=n_cycles {
            let built;
            let matrix = match &constant {
                Some(m) => m,
                None => {
                    built = self.build_matrix(&compiled, cycle)?;
                    &built
                }
            };
            let next = matrix.propagate(&occupancy);

            let mut cycle_cost = 0.0;
            let mut cycle_effect = 0.0;
            let mut cycle_life_years = 0.0;
            for (i, &occ) in next.iter().enumerate() {
                cycle_cost += occ * cost[i];
                cycle_effect += occ * utility[i];
                if alive[i] {
                    cycle_life_years += occ * settings.cycle_length;
                }
            }

            // Transition costs on the flows along declared edges
            for (s, out) in compiled.edges.iter().enumerate() {
                let base = self.start[s];
                for edge in out.iter().filter(|e| e.transition.cost != 0.0) {
                    let target = self.start[edge.to];
                    let flow: f64 = (base..base + self.states[s].span())
                        .map(|i| occupancy[i] * matrix.get(i, target))
                        .sum();
                    cycle_cost += flow * edge.transition.cost;
                }
            }

            // One-time costs on inflow from other states
            for (s, state) in self.states.iter().enumerate() {
                if state.one_time_cost == 0.0 {
                    continue;
                }
                let target = self.start[s];
                let inflow: f64 = (0..self.n_expanded)
                    .filter(|&i| owner[i] != s)
                    .map(|i| occupancy[i] * matrix.get(i, target))
                    .sum();
                cycle_cost += inflow * state.one_time_cost;
            }

            if settings.half_cycle_correction && (cycle == 1 || cycle == n_cycles) {
                cycle_cost *= 0.5;
                cycle_effect *= 0.5;
                cycle_life_years *= 0.5;
            }

            let dc = settings.discount_factor(settings.discount_rate_costs, cycle);
            let de = settings.discount_factor(settings.discount_rate_outcomes, cycle);

            result.undiscounted_cost += cycle_cost;
            result.undiscounted_effect += cycle_effect;
            result.undiscounted_life_years += cycle_life_years;
            result.total_cost += cycle_cost * dc;
            result.total_effect += cycle_effect * de;
            result.total_life_years += cycle_life_years * de;

            if let Some(cycles) = cycles.as_mut() {
                cycles.push(CycleOutcome {
                    cycle,
                    cost: cycle_cost,
                    effect: cycle_effect,
                    life_years: cycle_life_years,
                    discounted_cost: cycle_cost * dc,
                    discounted_effect: cycle_effect * de,
                    discounted_life_years: cycle_life_years * de,
                });
            }
            if let Some(trace) = trace.as_mut() {
                trace.push(self.aggregate(&next));
            }
            occupancy = next;
        }

        if !(result.total_cost.is_finite() && result.total_effect.is_finite()) {
            return Err(EngineError::NonFinite(format!(
                "strategy '{}' produced non-finite totals",
                strategy.name
            )));
        }

        debug!(
            strategy = %strategy.name,
            n_cycles,
            total_cost = result.total_cost,
            total_effect = result.total_effect,
            "cohort simulation complete"
        );

        result.trace = trace;
        result.cycles = cycles;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markov::TimeDependence;

    fn settings(horizon: f64) -> ModelSettings {
        ModelSettings {
            time_horizon: horizon,
            cycle_length: 1.0,
            discount_rate_costs: 0.0,
            discount_rate_outcomes: 0.0,
            half_cycle_correction: false,
            cohort_size: 1000.0,
            strict_probabilities: false,
        }
    }

    fn well_sick_dead() -> Vec<HealthState> {
        vec![
            HealthState::transient("Well", 100.0, 1.0),
            HealthState::transient("Sick", 1000.0, 0.5),
            HealthState::absorbing("Dead"),
        ]
    }

    fn base_strategy() -> Strategy {
        Strategy::new(
            "Base",
            vec![
                Transition::new("Well", "Sick", 0.2),
                Transition::new("Well", "Dead", 0.1),
                Transition::new("Sick", "Dead", 0.3),
            ],
        )
    }

    #[test]
    fn test_residual_goes_to_self() {
        let model = CohortModel::new(settings(5.0), well_sick_dead(), None).unwrap();
        let m = model.transition_matrix(&base_strategy(), 1).unwrap();
        assert!((m.get(0, 0) - 0.7).abs() < 1e-12);
        assert!((m.get(1, 1) - 0.7).abs() < 1e-12);
        assert_eq!(m.get(2, 2), 1.0);
        assert!(m.is_row_stochastic(1e-9));
    }

    #[test]
    fn test_rows_above_one_are_normalized() {
        let model = CohortModel::new(settings(5.0), well_sick_dead(), None).unwrap();
        let strategy = Strategy::new(
            "Over",
            vec![
                Transition::new("Well", "Sick", 0.9),
                Transition::new("Well", "Dead", 0.6),
                Transition::new("Sick", "Dead", 0.3),
            ],
        );
        let m = model.transition_matrix(&strategy, 1).unwrap();
        assert!((m.get(0, 1) - 0.6).abs() < 1e-12);
        assert!((m.get(0, 2) - 0.4).abs() < 1e-12);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn test_strict_probabilities_rejects_rows_above_one() {
        let strict = ModelSettings {
            strict_probabilities: true,
            ..settings(5.0)
        };
        let model = CohortModel::new(strict, well_sick_dead(), None).unwrap();
        let strategy = Strategy::new(
            "Over",
            vec![
                Transition::new("Well", "Sick", 0.9),
                Transition::new("Well", "Dead", 0.6),
                Transition::new("Sick", "Dead", 0.3),
            ],
        );
        assert!(matches!(
            model.run(&strategy, TraceMode::Full),
            Err(EngineError::InvalidTransitions { state, .. }) if state == "Well"
        ));
    }

    #[test]
    fn test_state_without_transitions_is_rejected() {
        let model = CohortModel::new(settings(5.0), well_sick_dead(), None).unwrap();
        let strategy = Strategy::new("Missing", vec![Transition::new("Well", "Sick", 0.2)]);
        assert!(matches!(
            model.run(&strategy, TraceMode::Full),
            Err(EngineError::InvalidTransitions { state, .. }) if state == "Sick"
        ));
    }

    #[test]
    fn test_unknown_state_in_transition() {
        let model = CohortModel::new(settings(5.0), well_sick_dead(), None).unwrap();
        let mut strategy = base_strategy();
        strategy.transitions.push(Transition::new("Sick", "Cured", 0.1));
        assert!(matches!(
            model.run(&strategy, TraceMode::Full),
            Err(EngineError::UnknownState(name)) if name == "Cured"
        ));
    }

    #[test]
    fn test_negative_probability_rejected() {
        let model = CohortModel::new(settings(5.0), well_sick_dead(), None).unwrap();
        let mut strategy = base_strategy();
        strategy.transitions[0].probability = -0.1;
        assert!(model.run(&strategy, TraceMode::Full).is_err());
    }

    #[test]
    fn test_trace_conserves_cohort() {
        let model = CohortModel::new(settings(20.0), well_sick_dead(), None).unwrap();
        let result = model.run(&base_strategy(), TraceMode::Full).unwrap();
        let trace = result.trace.unwrap();
        assert_eq!(trace.len(), 21);
        assert_eq!(trace[0], vec![1000.0, 0.0, 0.0]);
        for row in &trace {
            assert!((row.iter().sum::<f64>() - 1000.0).abs() < 1e-6);
        }
        assert_eq!(result.cycles.unwrap().len(), 20);
    }

    #[test]
    fn test_summary_only_drops_trace() {
        let model = CohortModel::new(settings(5.0), well_sick_dead(), None).unwrap();
        let full = model.run(&base_strategy(), TraceMode::Full).unwrap();
        let summary = model.run(&base_strategy(), TraceMode::SummaryOnly).unwrap();
        assert!(summary.trace.is_none());
        assert!(summary.cycles.is_none());
        assert_eq!(full.total_cost, summary.total_cost);
        assert_eq!(full.total_effect, summary.total_effect);
    }

    #[test]
    fn test_first_cycle_payoffs() {
        let model = CohortModel::new(settings(1.0), well_sick_dead(), None).unwrap();
        let result = model.run(&base_strategy(), TraceMode::Full).unwrap();
        // After one cycle: 700 Well, 200 Sick, 100 Dead
        assert!((result.total_cost - (700.0 * 100.0 + 200.0 * 1000.0)).abs() < 1e-6);
        assert!((result.total_effect - (700.0 + 100.0)).abs() < 1e-9);
        assert!((result.total_life_years - 900.0).abs() < 1e-9);
        assert!((result.effect_per_patient() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_discounting_uses_elapsed_time() {
        let discounted = ModelSettings {
            discount_rate_costs: 0.05,
            discount_rate_outcomes: 0.0,
            cycle_length: 0.5,
            time_horizon: 1.0,
            ..settings(1.0)
        };
        let states = vec![HealthState::transient("Well", 10.0, 1.0), HealthState::absorbing("Dead")];
        let strategy = Strategy::new("Flat", vec![Transition::new("Well", "Well", 1.0)]);
        let model = CohortModel::new(discounted, states, None).unwrap();
        let result = model.run(&strategy, TraceMode::Full).unwrap();

        let expected = 10_000.0 / 1.05f64.powf(0.5) + 10_000.0 / 1.05;
        assert!((result.total_cost - expected).abs() < 1e-6);
        assert!((result.undiscounted_cost - 20_000.0).abs() < 1e-9);
        // half-year cycles accrue half a life-year each
        assert!((result.total_life_years - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_cycle_correction() {
        let corrected = ModelSettings {
            half_cycle_correction: true,
            ..settings(4.0)
        };
        let states = vec![HealthState::transient("Well", 0.0, 1.0), HealthState::absorbing("Dead")];
        let strategy = Strategy::new("Flat", vec![Transition::new("Well", "Dead", 0.0)]);
        let model = CohortModel::new(corrected, states.clone(), None).unwrap();
        let result = model.run(&strategy, TraceMode::Full).unwrap();
        assert!((result.total_effect - 3000.0).abs() < 1e-9);

        let single = ModelSettings {
            half_cycle_correction: true,
            ..settings(1.0)
        };
        let model = CohortModel::new(single, states, None).unwrap();
        let result = model.run(&strategy, TraceMode::Full).unwrap();
        assert!((result.total_effect - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_transition_and_entry_costs() {
        let states = vec![
            HealthState::transient("Well", 0.0, 1.0),
            HealthState::transient("Sick", 0.0, 0.5).with_one_time_cost(500.0),
            HealthState::absorbing("Dead"),
        ];
        let strategy = Strategy::new(
            "Costs",
            vec![
                Transition::new("Well", "Sick", 0.2).with_cost(100.0),
                Transition::new("Sick", "Dead", 0.5),
            ],
        );
        let model = CohortModel::new(settings(1.0), states, None).unwrap();
        let result = model.run(&strategy, TraceMode::Full).unwrap();
        // 200 move Well -> Sick: 200 * (100 + 500)
        assert!((result.total_cost - 120_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_strategy_overrides() {
        let model = CohortModel::new(settings(1.0), well_sick_dead(), None).unwrap();
        let strategy = base_strategy()
            .with_state_cost("Well", 0.0)
            .with_state_utility("Sick", 0.0);
        let result = model.run(&strategy, TraceMode::Full).unwrap();
        assert!((result.total_cost - 200_000.0).abs() < 1e-6);
        assert!((result.total_effect - 700.0).abs() < 1e-9);

        let bad = base_strategy().with_state_cost("Ghost", 1.0);
        assert!(matches!(
            model.run(&bad, TraceMode::Full),
            Err(EngineError::UnknownState(_))
        ));
    }

    #[test]
    fn test_initial_distribution_counts_and_fractions() {
        let mut counts = FxHashMap::default();
        counts.insert("Well".to_string(), 600.0);
        counts.insert("Sick".to_string(), 400.0);
        let model = CohortModel::new(settings(1.0), well_sick_dead(), Some(&counts)).unwrap();
        let by_count = model.run(&base_strategy(), TraceMode::Full).unwrap();

        let mut fractions = FxHashMap::default();
        fractions.insert("Well".to_string(), 0.6);
        fractions.insert("Sick".to_string(), 0.4);
        let model = CohortModel::new(settings(1.0), well_sick_dead(), Some(&fractions)).unwrap();
        let by_fraction = model.run(&base_strategy(), TraceMode::Full).unwrap();

        assert_eq!(by_count.trace.as_ref().unwrap()[0], vec![600.0, 400.0, 0.0]);
        assert!((by_count.total_cost - by_fraction.total_cost).abs() < 1e-6);

        let mut wrong = FxHashMap::default();
        wrong.insert("Well".to_string(), 10.0);
        assert!(CohortModel::new(settings(1.0), well_sick_dead(), Some(&wrong)).is_err());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(CohortModel::new(settings(0.0), well_sick_dead(), None).is_err());
        let no_cohort = ModelSettings {
            cohort_size: 0.0,
            ..settings(5.0)
        };
        assert!(CohortModel::new(no_cohort, well_sick_dead(), None).is_err());
        assert!(CohortModel::new(settings(5.0), Vec::new(), None).is_err());
    }

    #[test]
    fn test_tunnel_state_expansion() {
        let states = vec![
            HealthState::transient("Well", 0.0, 1.0),
            HealthState::tunnel("Recovery", 2, 1000.0, 0.6),
            HealthState::absorbing("Dead"),
        ];
        let strategy = Strategy::new(
            "Tunnel",
            vec![
                Transition::new("Well", "Recovery", 1.0),
                Transition::new("Recovery", "Well", 0.5),
                Transition::new("Recovery", "Dead", 0.25),
            ],
        );
        let model = CohortModel::new(settings(3.0), states, None).unwrap();
        assert_eq!(model.expanded_size(), 4);

        let m = model.transition_matrix(&strategy, 1).unwrap();
        assert!(m.is_row_stochastic(1e-9));
        // First sub-state: exits plus 0.25 advancing
        assert!((m.get(1, 0) - 0.5).abs() < 1e-12);
        assert!((m.get(1, 2) - 0.25).abs() < 1e-12);
        assert!((m.get(1, 3) - 0.25).abs() < 1e-12);
        // Last sub-state: exits rescaled to sum to 1
        assert!((m.get(2, 0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.get(2, 3) - 1.0 / 3.0).abs() < 1e-12);

        let result = model.run(&strategy, TraceMode::Full).unwrap();
        let trace = result.trace.unwrap();
        assert_eq!(trace[0].len(), 3);
        assert_eq!(trace[1], vec![0.0, 1000.0, 0.0]);
        // cycle 2: 500 back to Well, 250 advance inside the tunnel, 250 die
        assert!((trace[2][0] - 500.0).abs() < 1e-9);
        assert!((trace[2][1] - 250.0).abs() < 1e-9);
        assert!((trace[2][2] - 250.0).abs() < 1e-9);
        for row in &trace {
            assert!((row.iter().sum::<f64>() - 1000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tunnel_requires_length_and_exits() {
        let mut tunnel = HealthState::tunnel("Recovery", 0, 0.0, 0.5);
        let states = vec![HealthState::transient("Well", 0.0, 1.0), tunnel.clone()];
        assert!(CohortModel::new(settings(3.0), states, None).is_err());

        tunnel.tunnel_length = Some(2);
        let states = vec![HealthState::transient("Well", 0.0, 1.0), tunnel];
        let model = CohortModel::new(settings(3.0), states, None).unwrap();
        let strategy = Strategy::new("NoExit", vec![Transition::new("Well", "Recovery", 0.1)]);
        assert!(matches!(
            model.run(&strategy, TraceMode::Full),
            Err(EngineError::InvalidTransitions { state, .. }) if state == "Recovery"
        ));
    }

    #[test]
    fn test_time_dependent_matrix_changes_by_cycle() {
        let model = CohortModel::new(settings(10.0), well_sick_dead(), None).unwrap();
        let mut strategy = base_strategy();
        strategy.transitions[2] = Transition::new("Sick", "Dead", 0.1)
            .with_time_dependence(TimeDependence::LinearIncrease { rate: 0.1 });

        let early = model.transition_matrix(&strategy, 1).unwrap();
        let late = model.transition_matrix(&strategy, 5).unwrap();
        assert!((early.get(1, 2) - 0.11).abs() < 1e-12);
        assert!((late.get(1, 2) - 0.15).abs() < 1e-12);
        assert!(late.is_row_stochastic(1e-9));

        let result = model.run(&strategy, TraceMode::Full).unwrap();
        for row in result.trace.unwrap() {
            assert!((row.iter().sum::<f64>() - 1000.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_absorbing_rows_ignore_declared_exits() {
        let model = CohortModel::new(settings(2.0), well_sick_dead(), None).unwrap();
        let mut strategy = base_strategy();
        strategy.transitions.push(Transition::new("Dead", "Well", 0.5));
        let m = model.transition_matrix(&strategy, 1).unwrap();
        assert_eq!(m.row(2), &[0.0, 0.0, 1.0]);
    }
}
