use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::node::{NodeBody, NodeKind, TreeNode};
use crate::error::{EngineError, Result};

/// Nested node declaration as it appears in a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    /// Generated from the node's position when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Required for children of chance nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn decision(name: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        Self::branch(NodeKind::Decision, name, children)
    }

    pub fn chance(name: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        Self::branch(NodeKind::Chance, name, children)
    }

    pub fn terminal(name: impl Into<String>, cost: f64, effectiveness: f64) -> Self {
        Self {
            kind: NodeKind::Terminal,
            name: name.into(),
            id: None,
            probability: None,
            cost: Some(cost),
            effectiveness: Some(effectiveness),
            children: Vec::new(),
        }
    }

    fn branch(kind: NodeKind, name: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        Self {
            kind,
            name: name.into(),
            id: None,
            probability: None,
            cost: None,
            effectiveness: None,
            children,
        }
    }

    #[must_use]
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Validate the declaration and build an evaluable tree.
    pub fn build(&self) -> Result<TreeNode> {
        let mut ids = FxHashSet::default();
        self.build_node("n", None, &mut ids)
    }

    fn build_node(
        &self,
        position: &str,
        parent: Option<NodeKind>,
        ids: &mut FxHashSet<String>,
    ) -> Result<TreeNode> {
        let id = self.id.clone().unwrap_or_else(|| position.to_string());
        if !ids.insert(id.clone()) {
            return Err(EngineError::malformed(
                &self.name,
                format!("duplicate node id '{id}'"),
            ));
        }

        let probability = match (parent, self.probability) {
            (Some(NodeKind::Chance), None) => {
                return Err(EngineError::malformed(
                    &self.name,
                    "children of chance nodes need a probability",
                ));
            }
            (_, Some(p)) if !(p >= 0.0 && p.is_finite()) => {
                return Err(EngineError::malformed(
                    &self.name,
                    format!("probability must be a non-negative number, got {p}"),
                ));
            }
            (_, p) => p,
        };

        let body = match self.kind {
            NodeKind::Terminal => {
                if !self.children.is_empty() {
                    return Err(EngineError::malformed(&self.name, "terminal nodes have no children"));
                }
                let (Some(cost), Some(effectiveness)) = (self.cost, self.effectiveness) else {
                    return Err(EngineError::malformed(
                        &self.name,
                        "terminal nodes need a cost and an effectiveness",
                    ));
                };
                if !(cost.is_finite() && effectiveness.is_finite()) {
                    return Err(EngineError::malformed(&self.name, "payoffs must be finite"));
                }
                NodeBody::Terminal {
                    cost,
                    effectiveness,
                }
            }
            kind => {
                if self.children.is_empty() {
                    return Err(EngineError::malformed(&self.name, "node has no children"));
                }
                let children = self
                    .children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| child.build_node(&format!("{position}.{i}"), Some(kind), ids))
                    .collect::<Result<Vec<_>>>()?;
                if kind == NodeKind::Decision {
                    NodeBody::Decision {
                        children,
                        optimal_choice: None,
                    }
                } else {
                    NodeBody::Chance { children }
                }
            }
        };

        Ok(TreeNode {
            id,
            name: self.name.clone(),
            probability,
            body,
            expected_cost: None,
            expected_effectiveness: None,
        })
    }
}
