//! Parametric survival analysis
//!
//! Fits censored time-to-event data to one of six families, extrapolates
//! the survival curve and converts it into per-cycle transition
//! probabilities for cohort models.

pub mod analysis;
pub mod family;
pub mod fit;

pub use analysis::{FamilyComparison, SurvivalAnalysis, SurvivalRequest};
pub use family::{SurvivalCurve, SurvivalFamily, SurvivalParams};
pub use fit::{FitResult, SurvivalData, compare_distributions, fit, log_likelihood};
