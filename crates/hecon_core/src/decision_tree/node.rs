use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Decision,
    Chance,
    Terminal,
}

/// What a node does during roll-back
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeBody {
    /// Picks the child with the highest net monetary benefit
    Decision {
        children: Vec<TreeNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        optimal_choice: Option<String>,
    },
    /// Probability-weighted average of the children
    Chance { children: Vec<TreeNode> },
    Terminal { cost: f64, effectiveness: f64 },
}

/// A node of an evaluated tree. `expected_*` are filled by roll-back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    /// Branch probability when the parent is a chance node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(flatten)]
    pub body: NodeBody,
    pub expected_cost: Option<f64>,
    pub expected_effectiveness: Option<f64>,
}

impl TreeNode {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Decision { .. } => NodeKind::Decision,
            NodeBody::Chance { .. } => NodeKind::Chance,
            NodeBody::Terminal { .. } => NodeKind::Terminal,
        }
    }

    #[must_use]
    pub fn children(&self) -> &[TreeNode] {
        match &self.body {
            NodeBody::Decision { children, .. } | NodeBody::Chance { children } => children,
            NodeBody::Terminal { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [TreeNode] {
        match &mut self.body {
            NodeBody::Decision { children, .. } | NodeBody::Chance { children } => children,
            NodeBody::Terminal { .. } => &mut [],
        }
    }

    /// Recorded choice of a decision node after roll-back
    #[must_use]
    pub fn optimal_choice(&self) -> Option<&str> {
        match &self.body {
            NodeBody::Decision { optimal_choice, .. } => optimal_choice.as_deref(),
            _ => None,
        }
    }

    /// Depth-first search by id
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children_mut()
            .iter_mut()
            .find_map(|child| child.find_by_id_mut(id))
    }

    /// Follow child names, one segment per level
    pub fn find_by_path_mut<'a>(
        &mut self,
        mut segments: impl Iterator<Item = &'a str>,
    ) -> Option<&mut TreeNode> {
        match segments.next() {
            None => Some(self),
            Some(name) => self
                .children_mut()
                .iter_mut()
                .find(|c| c.name == name)?
                .find_by_path_mut(segments),
        }
    }
}
