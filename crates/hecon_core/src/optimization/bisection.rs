//! Bracketed root finding for monotone scalar functions

#[derive(Debug, Clone, Copy)]
pub struct BisectionOptions {
    pub max_iterations: usize,
    /// Stop once the bracket is narrower than this
    pub tolerance: f64,
}

impl Default for BisectionOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
        }
    }
}

/// Find `x` in `[low, high]` with `f(x) = 0`.
///
/// Returns `None` when `f` does not change sign over the bracket (or is
/// not finite at an endpoint). Exact zeros at an endpoint are returned
/// as-is.
pub fn bisect<F>(f: F, low: f64, high: f64, options: &BisectionOptions) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let mut low = low;
    let mut high = high;
    let mut f_low = f(low);
    let f_high = f(high);

    if !f_low.is_finite() || !f_high.is_finite() {
        return None;
    }
    if f_low == 0.0 {
        return Some(low);
    }
    if f_high == 0.0 {
        return Some(high);
    }
    if f_low.signum() == f_high.signum() {
        return None;
    }

    for _ in 0..options.max_iterations {
        let mid = f64::midpoint(low, high);
        let f_mid = f(mid);

        if f_mid == 0.0 || (high - low) < options.tolerance {
            return Some(mid);
        }

        if f_mid.signum() == f_low.signum() {
            low = mid;
            f_low = f_mid;
        } else {
            high = mid;
        }
    }

    Some(f64::midpoint(low, high))
}
