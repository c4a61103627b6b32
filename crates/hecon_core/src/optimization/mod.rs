//! Numerical search routines used by the survival fitter.
//!
//! - [`minimize_nelder_mead`]: derivative-free minimization in N dimensions,
//!   used for maximum-likelihood fits over log-parameters.
//! - [`bisect`]: bracketed root finding for monotone scalar functions, used
//!   to locate median survival times.

mod bisection;
mod nelder_mead;

pub use bisection::{BisectionOptions, bisect};
pub use nelder_mead::{NelderMeadOptions, minimize_nelder_mead};

/// Why a search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Converged,
    MaxIterationsReached,
}

/// Outcome of a minimization
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub termination_reason: TerminationReason,
}

impl Minimum {
    #[must_use]
    pub fn converged(&self) -> bool {
        self.termination_reason == TerminationReason::Converged
    }
}
