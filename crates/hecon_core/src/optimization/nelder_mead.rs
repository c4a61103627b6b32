//! Nelder-Mead simplex minimization
//!
//! Maintains a simplex of N+1 points and moves it downhill by reflection,
//! expansion, contraction and shrinking. No gradients are needed, which
//! suits likelihoods whose derivatives are awkward (gamma, log-normal).

use super::{Minimum, TerminationReason};

const REFLECTION_COEF: f64 = 1.0;
const EXPANSION_COEF: f64 = 2.0;
const CONTRACTION_COEF: f64 = 0.5;
const SHRINK_COEF: f64 = 0.5;

/// Stopping rules for [`minimize_nelder_mead`]
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    pub max_iterations: usize,
    /// Converged once every vertex is within this distance of the centroid...
    pub x_tolerance: f64,
    /// ...and the objective spread across the simplex is below this.
    pub f_tolerance: f64,
    /// Relative size of the initial simplex around the start point
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            x_tolerance: 1e-7,
            f_tolerance: 1e-9,
            initial_step: 0.05,
        }
    }
}

#[derive(Clone)]
struct SimplexVertex {
    values: Vec<f64>,
    objective: f64,
}

/// Non-finite objective values are mapped to a large constant so the
/// simplex walks away from them instead of stalling on NaN comparisons.
fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 1e10 }
}

fn initialize_simplex<F>(f: &mut F, start: &[f64], step: f64) -> Vec<SimplexVertex>
where
    F: FnMut(&[f64]) -> f64,
{
    let n = start.len();
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(SimplexVertex {
        values: start.to_vec(),
        objective: sanitize(f(start)),
    });

    for i in 0..n {
        let mut point = start.to_vec();
        point[i] = if point[i] == 0.0 {
            0.00025
        } else {
            point[i] * (1.0 + step)
        };
        let objective = sanitize(f(&point));
        simplex.push(SimplexVertex {
            values: point,
            objective,
        });
    }

    simplex
}

/// Centroid of every vertex except the worst (last after sorting)
fn centroid(simplex: &[SimplexVertex]) -> Vec<f64> {
    let n = simplex[0].values.len();
    let mut center = vec![0.0; n];

    for vertex in simplex.iter().take(simplex.len() - 1) {
        for (c, v) in center.iter_mut().zip(&vertex.values) {
            *c += v;
        }
    }

    let count = (simplex.len() - 1) as f64;
    for c in &mut center {
        *c /= count;
    }
    center
}

/// `centroid + coef * (centroid - point)`
fn reflect(point: &[f64], centroid: &[f64], coef: f64) -> Vec<f64> {
    point
        .iter()
        .zip(centroid)
        .map(|(p, c)| c + coef * (c - p))
        .collect()
}

/// Largest distance from the best vertex
fn simplex_size(simplex: &[SimplexVertex]) -> f64 {
    let best = &simplex[0].values;
    simplex
        .iter()
        .skip(1)
        .map(|v| {
            v.values
                .iter()
                .zip(best)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max)
        })
        .fold(0.0_f64, f64::max)
}

fn objective_spread(simplex: &[SimplexVertex]) -> f64 {
    simplex
        .iter()
        .skip(1)
        .map(|v| (v.objective - simplex[0].objective).abs())
        .fold(0.0_f64, f64::max)
}

fn sort_simplex(simplex: &mut [SimplexVertex]) {
    simplex.sort_by(|a, b| a.objective.total_cmp(&b.objective));
}

/// Minimize `f` starting from `start`.
///
/// Always returns the best vertex found; callers decide what to do when
/// [`Minimum::converged`] is false.
pub fn minimize_nelder_mead<F>(mut f: F, start: &[f64], options: &NelderMeadOptions) -> Minimum
where
    F: FnMut(&[f64]) -> f64,
{
    if start.is_empty() {
        return Minimum {
            point: Vec::new(),
            value: sanitize(f(start)),
            iterations: 0,
            termination_reason: TerminationReason::Converged,
        };
    }

    let mut simplex = initialize_simplex(&mut f, start, options.initial_step);
    let mut iteration = 0;
    let mut termination_reason = TerminationReason::MaxIterationsReached;

    while iteration < options.max_iterations {
        sort_simplex(&mut simplex);

        if simplex_size(&simplex) <= options.x_tolerance
            && objective_spread(&simplex) <= options.f_tolerance
        {
            termination_reason = TerminationReason::Converged;
            break;
        }
        iteration += 1;

        let cent = centroid(&simplex);
        let worst_idx = simplex.len() - 1;
        let best_objective = simplex[0].objective;
        let second_worst_objective = simplex[worst_idx - 1].objective;
        let worst_objective = simplex[worst_idx].objective;
        let worst_values = simplex[worst_idx].values.clone();

        let reflected = reflect(&worst_values, &cent, REFLECTION_COEF);
        let reflected_obj = sanitize(f(&reflected));

        if reflected_obj < best_objective {
            let expanded = reflect(&worst_values, &cent, EXPANSION_COEF);
            let expanded_obj = sanitize(f(&expanded));
            simplex[worst_idx] = if expanded_obj < reflected_obj {
                SimplexVertex {
                    values: expanded,
                    objective: expanded_obj,
                }
            } else {
                SimplexVertex {
                    values: reflected,
                    objective: reflected_obj,
                }
            };
        } else if reflected_obj < second_worst_objective {
            simplex[worst_idx] = SimplexVertex {
                values: reflected,
                objective: reflected_obj,
            };
        } else {
            // Outside contraction when the reflection improved on the worst
            // vertex, inside contraction otherwise
            let (anchor, anchor_obj) = if reflected_obj < worst_objective {
                (&reflected, reflected_obj)
            } else {
                (&worst_values, worst_objective)
            };

            let contracted: Vec<f64> = cent
                .iter()
                .zip(anchor)
                .map(|(c, p)| c + CONTRACTION_COEF * (p - c))
                .collect();
            let contracted_obj = sanitize(f(&contracted));

            if contracted_obj < anchor_obj {
                simplex[worst_idx] = SimplexVertex {
                    values: contracted,
                    objective: contracted_obj,
                };
            } else {
                let best_values = simplex[0].values.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    let shrunk: Vec<f64> = best_values
                        .iter()
                        .zip(&vertex.values)
                        .map(|(b, v)| b + SHRINK_COEF * (v - b))
                        .collect();
                    let objective = sanitize(f(&shrunk));
                    *vertex = SimplexVertex {
                        values: shrunk,
                        objective,
                    };
                }
            }
        }
    }

    sort_simplex(&mut simplex);
    let best = simplex.swap_remove(0);
    Minimum {
        point: best.values,
        value: best.objective,
        iterations: iteration,
        termination_reason,
    }
}
