//! Health-economic modeling engine
//!
//! This crate evaluates treatment strategies and produces the decision
//! metrics used in health technology assessment:
//! - Cohort state-transition (Markov) models, both a fixed 3-state
//!   two-drug comparison and arbitrary n-state models with tunnel states
//!   and time-dependent transitions
//! - Decision trees evaluated by roll-back, with one-way sensitivity
//! - Budget impact projections under market uptake
//! - Parametric survival fitting and extrapolation
//! - Tornado, one-way and probabilistic sensitivity analysis
//! - Expected value of perfect (and partial perfect) information
//!
//! # Entry points
//!
//! The [`api`] module exposes one `run_*` function per analysis. Each takes
//! a serde-deserializable request and returns a rounded, serializable
//! response:
//!
//! ```ignore
//! use hecon_core::api::run_cohort_analysis;
//! use hecon_core::markov::CohortParams;
//!
//! let params: CohortParams = serde_json::from_str(r#"{"time_horizon": 20}"#)?;
//! let response = run_cohort_analysis(&params)?;
//! println!("ICER: {:?}", response.icer.icer);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Analyses
// ============================================================================

pub mod budget_impact;
pub mod decision_tree;
pub mod markov;
pub mod sensitivity;
pub mod survival;
pub mod voi;

// ============================================================================
// Shared building blocks
// ============================================================================

pub mod api;
pub mod economics;
pub mod error;
pub mod optimization;
pub mod sampling;
pub mod stats;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use economics::{IcerResult, StrategyOutcome};
pub use error::{EngineError, ErrorKind, Result};
pub use markov::{CohortParams, FlexibleModelConfig};
pub use sampling::ParameterDistribution;
