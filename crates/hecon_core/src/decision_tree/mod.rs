//! Decision trees evaluated by roll-back
//!
//! Requests declare the tree as nested [`NodeSpec`]s; building validates
//! the declaration into an owned [`TreeNode`] structure that roll-back
//! annotates in place.

pub mod analysis;
pub mod node;
pub mod spec;

pub use analysis::{
    DecisionTree, DecisionTreeAnalysis, DecisionTreeRequest, TerminalOutcome, TreeAttribute,
    TreeSensitivity, TreeSensitivityRequest, TreeStrategy,
};
pub use node::{NodeBody, NodeKind, TreeNode};
pub use spec::NodeSpec;
