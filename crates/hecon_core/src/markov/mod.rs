//! Discrete-time cohort state-transition models

pub mod engine;
pub mod flexible;
pub mod state;
pub mod three_state;
pub mod transition;

pub use engine::{CohortModel, CycleOutcome, ModelSettings, Strategy, StrategyResult, TraceMode};
pub use flexible::{FlexibleAnalysis, FlexibleModelConfig};
pub use state::{HealthState, StateKind};
pub use three_state::{CohortComparison, CohortParameter, CohortParams};
pub use transition::{TimeDependence, Transition, TransitionMatrix};
