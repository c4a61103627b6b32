//! Small numeric helpers shared by the analyses.

/// Boundary precision for monetary amounts and cohort counts.
pub const CURRENCY_DECIMALS: i32 = 2;
/// Boundary precision for QALYs, probabilities and other ratios.
pub const RATIO_DECIMALS: i32 = 4;

#[must_use]
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[must_use]
#[inline]
pub fn round_currency(value: f64) -> f64 {
    round_to(value, CURRENCY_DECIMALS)
}

#[must_use]
#[inline]
pub fn round_ratio(value: f64) -> f64 {
    round_to(value, RATIO_DECIMALS)
}

/// Finite values round to currency precision, infinities become `None`.
#[must_use]
pub fn finite_currency(value: f64) -> Option<f64> {
    value.is_finite().then(|| round_currency(value))
}

/// `n` evenly spaced values from `start` to `end` inclusive.
#[must_use]
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `values` must already be sorted ascending; `q` is in `[0, 100]`.
#[must_use]
pub fn percentile_sorted(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

/// Copy, drop non-finite values, and sort ascending.
#[must_use]
pub fn sorted_finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    out.sort_by(f64::total_cmp);
    out
}

/// Trapezoidal integration of `ys` sampled at `xs`.
#[must_use]
pub fn trapezoid(xs: &[f64], ys: &[f64]) -> f64 {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}
