//! Command-line front end for `hecon_core`
//!
//! Loads a request file, runs one analysis and renders the response.

#![warn(clippy::all)]

pub mod io;
pub mod logging;

use std::path::Path;

use clap::ValueEnum;
use color_eyre::eyre::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

use hecon_core::api;

pub use io::Format;
pub use logging::init_logging;

/// The analyses the CLI can run, one per `hecon_core::api` entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Analysis {
    /// 3-state two-drug cohort comparison
    Cohort,
    /// N-state cohort model with any number of strategies
    Flexible,
    /// Decision tree roll-back with optional sensitivity sweeps
    DecisionTree,
    /// Budget impact under market uptake
    BudgetImpact,
    /// Parametric survival fit and extrapolation
    Survival,
    /// Tornado ranking and one-way sweeps
    Tornado,
    /// Probabilistic sensitivity analysis
    Psa,
    /// Expected value of (partial) perfect information
    Voi,
}

impl Analysis {
    pub fn name(&self) -> &'static str {
        match self {
            Analysis::Cohort => "cohort",
            Analysis::Flexible => "flexible",
            Analysis::DecisionTree => "decision-tree",
            Analysis::BudgetImpact => "budget-impact",
            Analysis::Survival => "survival",
            Analysis::Tornado => "tornado",
            Analysis::Psa => "psa",
            Analysis::Voi => "voi",
        }
    }
}

fn evaluate<Req, Resp>(
    request_path: &Path,
    run: impl FnOnce(&Req) -> hecon_core::Result<Resp>,
    format: Format,
    compact: bool,
) -> color_eyre::Result<String>
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    let request: Req = io::read_request(request_path)?;
    let response = run(&request)?;
    io::render(&response, format, compact)
}

/// Run `analysis` on the request stored at `request_path` and render the
/// response in `format`.
pub fn execute(
    analysis: Analysis,
    request_path: &Path,
    format: Format,
    compact: bool,
) -> color_eyre::Result<String> {
    tracing::debug!(
        analysis = analysis.name(),
        request = %request_path.display(),
        "running analysis"
    );

    let rendered = match analysis {
        Analysis::Cohort => evaluate(request_path, api::run_cohort_analysis, format, compact),
        Analysis::Flexible => {
            evaluate(request_path, api::run_flexible_cohort_analysis, format, compact)
        }
        Analysis::DecisionTree => evaluate(request_path, api::run_decision_tree, format, compact),
        Analysis::BudgetImpact => evaluate(request_path, api::run_budget_impact, format, compact),
        Analysis::Survival => evaluate(request_path, api::run_survival_fit, format, compact),
        Analysis::Tornado => evaluate(request_path, api::run_tornado, format, compact),
        Analysis::Psa => evaluate(request_path, api::run_psa, format, compact),
        Analysis::Voi => evaluate(request_path, api::run_voi, format, compact),
    };
    rendered.wrap_err_with(|| format!("{} analysis failed", analysis.name()))
}
