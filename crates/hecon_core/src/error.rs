use serde::Serialize;

/// Broad classification of engine failures.
///
/// Callers at the request boundary use this to decide how to report a
/// failure; the engine itself only ever aborts the offending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request describes a model that cannot be evaluated.
    InvalidConfiguration,
    /// The numerics failed (optimizer did not converge, non-finite output).
    NumericalInstability,
    /// The supplied data is empty or structurally unusable.
    InvalidInput,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown state '{0}'")]
    UnknownState(String),

    #[error("invalid transitions for state '{state}': {reason}")]
    InvalidTransitions { state: String, reason: String },

    #[error("unknown distribution family '{0}'")]
    UnknownDistribution(String),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("invalid {family} parameters: {reason}")]
    InvalidDistributionParameters {
        family: &'static str,
        reason: String,
    },

    #[error("malformed decision tree node '{node}': {reason}")]
    MalformedTree { node: String, reason: String },

    #[error("decision tree has no root node")]
    MissingRoot,

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("invalid market shares: {0}")]
    InvalidMarketShares(String),

    #[error("survival data is empty")]
    EmptyDataset,

    #[error("invalid survival data: {0}")]
    InvalidSurvivalData(String),

    #[error("value of information needs at least 2 strategies, found {0}")]
    InsufficientStrategies(usize),

    #[error("value of information batch is empty")]
    EmptyBatch,

    #[error("sample {sample} has no outcome for strategy '{strategy}'")]
    MissingStrategyOutcome { sample: usize, strategy: String },

    #[error("optimizer did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("non-finite result: {0}")]
    NonFinite(String),
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(_)
            | EngineError::UnknownState(_)
            | EngineError::InvalidTransitions { .. }
            | EngineError::UnknownDistribution(_)
            | EngineError::UnknownParameter(_)
            | EngineError::InvalidDistributionParameters { .. }
            | EngineError::MalformedTree { .. }
            | EngineError::NodeNotFound(_)
            | EngineError::InvalidMarketShares(_) => ErrorKind::InvalidConfiguration,
            EngineError::NonConvergence { .. } | EngineError::NonFinite(_) => {
                ErrorKind::NumericalInstability
            }
            EngineError::MissingRoot
            | EngineError::EmptyDataset
            | EngineError::InvalidSurvivalData(_)
            | EngineError::InsufficientStrategies(_)
            | EngineError::EmptyBatch
            | EngineError::MissingStrategyOutcome { .. } => ErrorKind::InvalidInput,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    pub(crate) fn transitions(state: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidTransitions {
            state: state.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(node: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedTree {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::transitions("Stable", "no outgoing transitions").kind(),
            ErrorKind::InvalidConfiguration
        );
        assert_eq!(
            EngineError::NonConvergence { iterations: 10 }.kind(),
            ErrorKind::NumericalInstability
        );
        assert_eq!(EngineError::EmptyDataset.kind(), ErrorKind::InvalidInput);
        assert_eq!(EngineError::MissingRoot.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::InsufficientStrategies(1);
        assert_eq!(
            err.to_string(),
            "value of information needs at least 2 strategies, found 1"
        );
    }
}
