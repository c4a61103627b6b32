use serde::{Deserialize, Serialize};

fn default_linear_rate() -> f64 {
    0.05
}

fn default_exponential_factor() -> f64 {
    1.02
}

fn default_weibull_shape() -> f64 {
    1.5
}

fn default_weibull_scale() -> f64 {
    10.0
}

/// How a transition probability changes with the cycle index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum TimeDependence {
    /// `min(1, p * (1 + rate * cycle))`
    LinearIncrease {
        #[serde(default = "default_linear_rate")]
        rate: f64,
    },
    /// `min(1, p * factor^cycle)`
    ExponentialIncrease {
        #[serde(default = "default_exponential_factor")]
        factor: f64,
    },
    /// Probability from a Weibull hazard at elapsed time; ignores the base
    /// probability.
    WeibullHazard {
        #[serde(default = "default_weibull_shape")]
        shape: f64,
        #[serde(default = "default_weibull_scale")]
        scale: f64,
    },
}

impl TimeDependence {
    /// Probability at `cycle` given the declared base probability.
    #[must_use]
    pub fn evaluate(&self, base: f64, cycle: usize, cycle_length: f64) -> f64 {
        match *self {
            TimeDependence::LinearIncrease { rate } => {
                (base * (1.0 + rate * cycle as f64)).min(1.0)
            }
            TimeDependence::ExponentialIncrease { factor } => {
                (base * factor.powi(cycle as i32)).min(1.0)
            }
            TimeDependence::WeibullHazard { shape, scale } => {
                let t = cycle as f64 * cycle_length;
                let hazard = (shape / scale) * (t / scale).powf(shape - 1.0);
                1.0 - (-hazard).exp()
            }
        }
    }
}

/// A declared transition between two states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub probability: f64,
    /// Charged per occupant moving along this transition
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_dependence: Option<TimeDependence>,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, probability: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            probability,
            cost: 0.0,
            time_dependence: None,
        }
    }

    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    #[must_use]
    pub fn with_time_dependence(mut self, time_dependence: TimeDependence) -> Self {
        self.time_dependence = Some(time_dependence);
        self
    }

    #[must_use]
    pub fn probability_at(&self, cycle: usize, cycle_length: f64) -> f64 {
        match &self.time_dependence {
            Some(td) => td.evaluate(self.probability, cycle, cycle_length),
            None => self.probability,
        }
    }
}

/// Dense row-major square matrix; row `i` holds the probabilities of
/// moving from state `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    n: usize,
    data: Vec<f64>,
}

impl TransitionMatrix {
    #[must_use]
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.n
    }

    #[must_use]
    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.n + to]
    }

    #[inline]
    pub fn set(&mut self, from: usize, to: usize, value: f64) {
        self.data[from * self.n + to] = value;
    }

    #[inline]
    pub fn add(&mut self, from: usize, to: usize, value: f64) {
        self.data[from * self.n + to] += value;
    }

    #[must_use]
    pub fn row(&self, from: usize) -> &[f64] {
        &self.data[from * self.n..(from + 1) * self.n]
    }

    #[must_use]
    pub fn row_sum(&self, from: usize) -> f64 {
        self.row(from).iter().sum()
    }

    /// `occupancy · M`
    #[must_use]
    pub fn propagate(&self, occupancy: &[f64]) -> Vec<f64> {
        let mut next = vec![0.0; self.n];
        for (i, &occ) in occupancy.iter().enumerate() {
            if occ == 0.0 {
                continue;
            }
            for (n, p) in next.iter_mut().zip(self.row(i)) {
                *n += occ * p;
            }
        }
        next
    }

    /// True when every row sums to 1 within `tolerance`
    #[must_use]
    pub fn is_row_stochastic(&self, tolerance: f64) -> bool {
        (0..self.n).all(|i| {
            (self.row_sum(i) - 1.0).abs() <= tolerance && self.row(i).iter().all(|&p| p >= 0.0)
        })
    }

    /// Rows as nested vectors, for reporting
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.n).map(|i| self.row(i).to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_increase_caps_at_one() {
        let td = TimeDependence::LinearIncrease { rate: 0.05 };
        assert!((td.evaluate(0.1, 10, 1.0) - 0.15).abs() < 1e-12);
        assert_eq!(td.evaluate(0.9, 100, 1.0), 1.0);
    }

    #[test]
    fn test_exponential_increase() {
        let td = TimeDependence::ExponentialIncrease { factor: 1.02 };
        assert!((td.evaluate(0.1, 2, 1.0) - 0.1 * 1.0404).abs() < 1e-12);
    }

    #[test]
    fn test_weibull_hazard_uses_elapsed_time() {
        let td = TimeDependence::WeibullHazard {
            shape: 1.5,
            scale: 10.0,
        };
        // t = 4 * 0.5 = 2
        let h: f64 = 0.15 * (0.2f64).powf(0.5);
        assert!((td.evaluate(0.3, 4, 0.5) - (1.0 - (-h).exp())).abs() < 1e-12);
        assert_eq!(td.evaluate(0.3, 0, 1.0), 0.0);
    }

    #[test]
    fn test_time_dependence_defaults() {
        let td: TimeDependence = serde_json::from_str(r#"{"function": "weibull_hazard"}"#).unwrap();
        assert_eq!(
            td,
            TimeDependence::WeibullHazard {
                shape: 1.5,
                scale: 10.0
            }
        );
        let td: TimeDependence =
            serde_json::from_str(r#"{"function": "linear_increase"}"#).unwrap();
        assert_eq!(td, TimeDependence::LinearIncrease { rate: 0.05 });
    }

    #[test]
    fn test_transition_from_json() {
        let t: Transition = serde_json::from_str(
            r#"{"from": "Well", "to": "Sick", "probability": 0.1,
                "time_dependence": {"function": "exponential_increase", "factor": 1.1}}"#,
        )
        .unwrap();
        assert_eq!(t.cost, 0.0);
        assert!((t.probability_at(1, 1.0) - 0.11).abs() < 1e-12);
    }

    #[test]
    fn test_propagate_conserves_mass() {
        let mut m = TransitionMatrix::zeros(3);
        m.set(0, 0, 0.7);
        m.set(0, 1, 0.2);
        m.set(0, 2, 0.1);
        m.set(1, 1, 0.8);
        m.set(1, 2, 0.2);
        m.set(2, 2, 1.0);
        assert!(m.is_row_stochastic(1e-12));

        let next = m.propagate(&[1000.0, 0.0, 0.0]);
        for (got, want) in next.iter().zip([700.0, 200.0, 100.0]) {
            assert!((got - want).abs() < 1e-9);
        }
        let after = m.propagate(&next);
        assert!((after.iter().sum::<f64>() - 1000.0).abs() < 1e-9);
    }
}
