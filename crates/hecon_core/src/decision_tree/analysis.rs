//! Roll-back evaluation, strategy extraction and one-way sensitivity

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::node::{NodeBody, TreeNode};
use super::spec::NodeSpec;
use crate::economics::{IcerResult, StrategyOutcome, compare_against_first, net_monetary_benefit};
use crate::error::{EngineError, Result};
use crate::markov::three_state::default_wtp_threshold;
use crate::stats::linspace;

fn default_n_steps() -> usize {
    10
}

fn default_tree_name() -> String {
    "Decision Tree Analysis".to_string()
}

/// Node attribute varied by a one-way sensitivity sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeAttribute {
    Probability,
    Cost,
    Effectiveness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeSensitivityRequest {
    /// `/`-separated child names starting below the root, or a node id
    pub node: String,
    pub attribute: TreeAttribute,
    pub low: f64,
    pub high: f64,
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionTreeRequest {
    #[serde(default = "default_tree_name")]
    pub name: String,
    #[serde(default = "default_wtp_threshold")]
    pub wtp_threshold: f64,
    #[serde(default)]
    pub tree: Option<NodeSpec>,
    #[serde(default)]
    pub sensitivity: Vec<TreeSensitivityRequest>,
}

/// A terminal reached from a strategy, with the product of the branch
/// probabilities along the way
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalOutcome {
    pub name: String,
    pub probability: f64,
    pub cost: f64,
    pub effectiveness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeStrategy {
    pub name: String,
    pub expected_cost: f64,
    pub expected_effectiveness: f64,
    pub outcomes: Vec<TerminalOutcome>,
}

impl TreeStrategy {
    #[must_use]
    pub fn outcome(&self) -> StrategyOutcome {
        StrategyOutcome::new(self.name.clone(), self.expected_cost, self.expected_effectiveness)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub value: f64,
    pub optimal_choice: Option<String>,
    pub strategies: Vec<StrategyOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSensitivity {
    pub node: String,
    pub attribute: TreeAttribute,
    pub original_value: f64,
    pub points: Vec<SweepPoint>,
}

/// An evaluable tree with its WTP threshold.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: TreeNode,
    wtp_threshold: f64,
}

fn roll_back(node: &mut TreeNode, wtp: f64) -> Result<(f64, f64)> {
    let (cost, effect) = match &mut node.body {
        NodeBody::Terminal {
            cost,
            effectiveness,
        } => (*cost, *effectiveness),
        NodeBody::Chance { children } => {
            let mut weighted = Vec::with_capacity(children.len());
            for child in children.iter_mut() {
                let (c, e) = roll_back(child, wtp)?;
                weighted.push((child.probability.unwrap_or(0.0), c, e));
            }
            let total: f64 = weighted.iter().map(|(p, _, _)| p).sum();
            if total <= 0.0 {
                return Err(EngineError::malformed(
                    &node.name,
                    "child probabilities sum to zero",
                ));
            }
            if (total - 1.0).abs() > 1e-9 {
                debug!(node = %node.name, total, "normalizing chance node probabilities");
            }
            weighted.iter().fold((0.0, 0.0), |(ac, ae), (p, c, e)| {
                (ac + c * p / total, ae + e * p / total)
            })
        }
        NodeBody::Decision {
            children,
            optimal_choice,
        } => {
            let mut best: Option<(f64, f64, f64, usize)> = None;
            for (i, child) in children.iter_mut().enumerate() {
                let (c, e) = roll_back(child, wtp)?;
                let nmb = net_monetary_benefit(c, e, wtp);
                if best.is_none_or(|(best_nmb, ..)| nmb > best_nmb) {
                    best = Some((nmb, c, e, i));
                }
            }
            let Some((_, c, e, i)) = best else {
                return Err(EngineError::malformed(&node.name, "node has no children"));
            };
            *optimal_choice = Some(children[i].name.clone());
            (c, e)
        }
    };
    node.expected_cost = Some(cost);
    node.expected_effectiveness = Some(effect);
    Ok((cost, effect))
}

fn collect_terminals(node: &TreeNode, path_probability: f64, out: &mut Vec<TerminalOutcome>) {
    match &node.body {
        NodeBody::Terminal {
            cost,
            effectiveness,
        } => out.push(TerminalOutcome {
            name: node.name.clone(),
            probability: path_probability,
            cost: *cost,
            effectiveness: *effectiveness,
        }),
        NodeBody::Chance { children } => {
            let total: f64 = children.iter().filter_map(|c| c.probability).sum();
            for child in children {
                let p = match child.probability {
                    Some(p) if total > 0.0 => p / total,
                    _ => 0.0,
                };
                collect_terminals(child, path_probability * p, out);
            }
        }
        NodeBody::Decision { children, .. } => {
            for child in children {
                collect_terminals(child, path_probability, out);
            }
        }
    }
}

impl DecisionTree {
    pub fn new(spec: &NodeSpec, wtp_threshold: f64) -> Result<Self> {
        Ok(Self {
            root: spec.build()?,
            wtp_threshold,
        })
    }

    #[must_use]
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    #[must_use]
    pub fn wtp_threshold(&self) -> f64 {
        self.wtp_threshold
    }

    /// Evaluate every node; returns the root's expected cost and
    /// effectiveness.
    pub fn rollback(&mut self) -> Result<(f64, f64)> {
        roll_back(&mut self.root, self.wtp_threshold)
    }

    /// Strategies are the children of a root decision node. Any other root
    /// is reported as a single strategy.
    pub fn strategies(&mut self) -> Result<Vec<TreeStrategy>> {
        self.rollback()?;
        let nodes: Vec<&TreeNode> = match &self.root.body {
            NodeBody::Decision { children, .. } => children.iter().collect(),
            _ => vec![&self.root],
        };
        Ok(nodes
            .into_iter()
            .map(|node| {
                let mut outcomes = Vec::new();
                collect_terminals(node, 1.0, &mut outcomes);
                TreeStrategy {
                    name: node.name.clone(),
                    expected_cost: node.expected_cost.unwrap_or(0.0),
                    expected_effectiveness: node.expected_effectiveness.unwrap_or(0.0),
                    outcomes,
                }
            })
            .collect())
    }

    /// Choice recorded at the root after the last roll-back
    #[must_use]
    pub fn optimal_strategy(&self) -> Option<&str> {
        self.root.optimal_choice()
    }

    fn locate(&mut self, node: &str) -> Result<&mut TreeNode> {
        let by_path = self
            .root
            .find_by_path_mut(node.split('/').filter(|s| !s.is_empty()))
            .is_some();
        let found = if by_path {
            self.root
                .find_by_path_mut(node.split('/').filter(|s| !s.is_empty()))
        } else {
            self.root.find_by_id_mut(node)
        };
        found.ok_or_else(|| EngineError::NodeNotFound(node.to_string()))
    }

    fn attribute_mut<'a>(
        node: &'a mut TreeNode,
        attribute: TreeAttribute,
    ) -> Result<&'a mut f64> {
        let name = node.name.clone();
        let slot = match attribute {
            TreeAttribute::Probability => node.probability.as_mut(),
            TreeAttribute::Cost => match &mut node.body {
                NodeBody::Terminal { cost, .. } => Some(cost),
                _ => None,
            },
            TreeAttribute::Effectiveness => match &mut node.body {
                NodeBody::Terminal { effectiveness, .. } => Some(effectiveness),
                _ => None,
            },
        };
        slot.ok_or_else(|| {
            EngineError::malformed(&name, format!("node has no {attribute:?} attribute"))
        })
    }

    /// Roll back at `n_steps` values between `low` and `high`, then restore
    /// the original value and roll back once more.
    pub fn one_way_sensitivity(&mut self, request: &TreeSensitivityRequest) -> Result<TreeSensitivity> {
        if request.attribute == TreeAttribute::Probability
            && !(request.low >= 0.0 && request.high >= 0.0)
        {
            return Err(EngineError::config("probabilities cannot be negative"));
        }
        if !(request.low.is_finite() && request.high.is_finite()) {
            return Err(EngineError::config("sensitivity bounds must be finite"));
        }

        let original =
            *Self::attribute_mut(self.locate(&request.node)?, request.attribute)?;

        let mut points = Vec::with_capacity(request.n_steps);
        let mut outcome = Ok(());
        for value in linspace(request.low, request.high, request.n_steps) {
            *Self::attribute_mut(self.locate(&request.node)?, request.attribute)? = value;
            match self.strategies() {
                Ok(strategies) => points.push(SweepPoint {
                    value,
                    optimal_choice: self.optimal_strategy().map(str::to_string),
                    strategies: strategies.iter().map(TreeStrategy::outcome).collect(),
                }),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        *Self::attribute_mut(self.locate(&request.node)?, request.attribute)? = original;
        self.rollback()?;
        outcome?;

        Ok(TreeSensitivity {
            node: request.node.clone(),
            attribute: request.attribute,
            original_value: original,
            points,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionTreeAnalysis {
    pub name: String,
    pub wtp_threshold: f64,
    pub optimal_strategy: Option<String>,
    pub strategies: Vec<TreeStrategy>,
    pub icers: Vec<IcerResult>,
    pub sensitivity: Vec<TreeSensitivity>,
    /// The evaluated tree
    pub tree: TreeNode,
}

pub fn run(request: &DecisionTreeRequest) -> Result<DecisionTreeAnalysis> {
    let spec = request.tree.as_ref().ok_or(EngineError::MissingRoot)?;
    let mut tree = DecisionTree::new(spec, request.wtp_threshold)?;

    let strategies = tree.strategies()?;
    let outcomes: Vec<StrategyOutcome> = strategies.iter().map(TreeStrategy::outcome).collect();
    let icers = compare_against_first(&outcomes, request.wtp_threshold);

    let sensitivity = request
        .sensitivity
        .iter()
        .map(|s| tree.one_way_sensitivity(s))
        .collect::<Result<Vec<_>>>()?;

    Ok(DecisionTreeAnalysis {
        name: request.name.clone(),
        wtp_threshold: request.wtp_threshold,
        optimal_strategy: tree.optimal_strategy().map(str::to_string),
        strategies,
        icers,
        sensitivity,
        tree: tree.root,
    })
}
