use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Steepness of the logistic uptake curve
const S_CURVE_STEEPNESS: f64 = 1.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationGrowth {
    #[default]
    Constant,
    /// `1 + rate * year`
    Linear,
    /// `(1 + rate)^year`
    Exponential,
}

impl PopulationGrowth {
    #[must_use]
    pub fn factor(&self, year: usize, rate: f64) -> f64 {
        match self {
            PopulationGrowth::Constant => 1.0,
            PopulationGrowth::Linear => 1.0 + rate * year as f64,
            PopulationGrowth::Exponential => (1.0 + rate).powi(year as i32),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UptakeCurve {
    /// Reaches the maximum share at the horizon
    Linear,
    /// Logistic curve centred on the middle of the horizon
    #[default]
    SCurve,
    /// Maximum share from year 1
    Immediate,
}

impl UptakeCurve {
    /// Share of the new treatment in `year` (1-based)
    #[must_use]
    pub fn share(&self, year: usize, horizon: usize, max_share: f64) -> f64 {
        let (y, h) = (year as f64, horizon as f64);
        match self {
            UptakeCurve::Linear => (max_share * y / h).min(max_share),
            UptakeCurve::SCurve => {
                let midpoint = h / 2.0;
                max_share / (1.0 + (-S_CURVE_STEEPNESS * (y - midpoint)).exp())
            }
            UptakeCurve::Immediate => max_share,
        }
    }
}

/// Shares of every treatment in one year, indexed like the treatment list
pub type ShareVector = Vec<f64>;

/// Year-by-year shares once the new treatment enters.
///
/// Year 0 keeps the current mix. Later years give the new treatment its
/// uptake share, remove that share from the displaced treatments in
/// proportion to their current shares, and renormalize to 1.
#[must_use]
pub fn project_shares(
    current: &[f64],
    new_index: usize,
    displaced: &[usize],
    curve: UptakeCurve,
    max_share: f64,
    horizon: usize,
) -> Vec<ShareVector> {
    let displaced_total: f64 = displaced.iter().map(|&i| current[i]).sum();

    let mut years = Vec::with_capacity(horizon + 1);
    years.push(current.to_vec());

    for year in 1..=horizon {
        let new_share = curve.share(year, horizon, max_share);
        let mut shares = current.to_vec();
        shares[new_index] = new_share;

        if displaced_total > 0.0 {
            for &i in displaced {
                let reduction = new_share * current[i] / displaced_total;
                shares[i] = (current[i] - reduction).max(0.0);
            }
        }

        let total: f64 = shares.iter().sum();
        if total > 0.0 {
            for share in &mut shares {
                *share /= total;
            }
        }
        years.push(shares);
    }

    years
}

/// Expand a name-keyed share map to treatment order; missing names are 0.
pub(crate) fn share_vector(names: &[String], shares: &FxHashMap<String, f64>) -> ShareVector {
    names
        .iter()
        .map(|name| shares.get(name).copied().unwrap_or(0.0))
        .collect()
}
