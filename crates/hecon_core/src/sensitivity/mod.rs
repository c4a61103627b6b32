//! Sensitivity analyses over the 3-state cohort model
//!
//! - [`deterministic`]: tornado ranking and one-way sweeps
//! - [`probabilistic`]: Monte Carlo PSA with an acceptability curve
//!
//! Every model evaluation is independent, so both fan out over rayon when
//! the `parallel` feature is enabled.

pub mod deterministic;
pub mod probabilistic;

pub use deterministic::{
    OneWayPoint, OneWayRequest, OneWaySweep, ParameterRange, TornadoAnalysis, TornadoEntry,
    TornadoRequest,
};
pub use probabilistic::{
    CeacPoint, ParameterDraw, PsaAnalysis, PsaIteration, PsaRequest, PsaStatistics,
};
