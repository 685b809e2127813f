//! Least-squares solvers for the model components
//!
//! A linear solve for the knee-free aperiodic line and a bounded
//! Levenberg-Marquardt for everything nonlinear. Bounds are enforced by
//! projecting each step back into the box.

use nalgebra::{DMatrix, DVector};

/// Box constraints, one pair per parameter
#[derive(Debug, Clone)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    fn project(&self, params: &mut [f64]) {
        for ((p, lo), hi) in params.iter_mut().zip(&self.lower).zip(&self.upper) {
            *p = p.clamp(*lo, *hi);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    /// Maximum number of model evaluations
    pub max_evals: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_evals: 5000,
            ftol: 1e-12,
            xtol: 1e-12,
        }
    }
}

fn sum_sq(residuals: &DVector<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Solve `min ||X b - y||` through the normal equations.
pub fn linear_least_squares(design: &DMatrix<f64>, ys: &[f64]) -> Option<Vec<f64>> {
    let y = DVector::from_column_slice(ys);
    let xtx = design.transpose() * design;
    let xty = design.transpose() * y;
    let solution = xtx
        .clone()
        .cholesky()
        .map(|c| c.solve(&xty))
        .or_else(|| xtx.lu().solve(&xty))?;
    if solution.iter().all(|v| v.is_finite()) {
        Some(solution.iter().copied().collect())
    } else {
        None
    }
}

/// Fit `model(xs, params) ≈ ys` starting at `p0`.
///
/// Returns the best parameters found, or `None` when the model cannot be
/// evaluated to finite values at the starting point or the problem has
/// fewer points than parameters.
pub fn levenberg_marquardt<F>(
    model: F,
    xs: &[f64],
    ys: &[f64],
    p0: &[f64],
    bounds: &Bounds,
    options: LmOptions,
) -> Option<Vec<f64>>
where
    F: Fn(&[f64], &[f64]) -> Vec<f64>,
{
    let n_params = p0.len();
    if xs.len() < n_params || n_params == 0 {
        return None;
    }

    let y = DVector::from_column_slice(ys);
    let residuals = |params: &[f64]| -> DVector<f64> {
        &y - DVector::from_vec(model(xs, params))
    };

    let mut params = p0.to_vec();
    bounds.project(&mut params);
    let mut r = residuals(&params);
    let mut cost = sum_sq(&r);
    if !cost.is_finite() {
        return None;
    }

    let mut lambda = 1e-3;
    let mut evals = 1;
    let step_eps = f64::EPSILON.sqrt();

    while evals < options.max_evals {
        // Forward-difference Jacobian of the model (= -d residual)
        let mut jac = DMatrix::<f64>::zeros(xs.len(), n_params);
        for j in 0..n_params {
            let mut h = step_eps * params[j].abs().max(1.0);
            if params[j] + h > bounds.upper[j] {
                h = -h;
            }
            let mut shifted = params.clone();
            shifted[j] += h;
            let r_shifted = residuals(&shifted);
            evals += 1;
            for i in 0..xs.len() {
                jac[(i, j)] = (r[i] - r_shifted[i]) / h;
            }
        }

        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &r;

        let mut improved = false;
        while evals < options.max_evals {
            let mut damped = jtj.clone();
            for j in 0..n_params {
                damped[(j, j)] += lambda * jtj[(j, j)].max(1e-12);
            }
            let Some(delta) = damped.lu().solve(&jtr) else {
                lambda *= 10.0;
                if lambda > 1e16 {
                    return Some(params);
                }
                continue;
            };

            let mut candidate: Vec<f64> =
                params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
            bounds.project(&mut candidate);
            let r_candidate = residuals(&candidate);
            evals += 1;
            let candidate_cost = sum_sq(&r_candidate);

            if candidate_cost.is_finite() && candidate_cost < cost {
                let step_norm: f64 = candidate
                    .iter()
                    .zip(&params)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let param_norm: f64 = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                let relative_drop = (cost - candidate_cost) / cost.max(f64::MIN_POSITIVE);

                params = candidate;
                r = r_candidate;
                cost = candidate_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;

                if relative_drop < options.ftol
                    || step_norm < options.xtol * (param_norm + options.xtol)
                {
                    return Some(params);
                }
                break;
            }

            lambda *= 10.0;
            if lambda > 1e16 {
                // No descent direction left: at a (constrained) minimum.
                return Some(params);
            }
        }

        if !improved {
            break;
        }
    }

    log::debug!("Levenberg-Marquardt stopped after {} evaluations", evals);
    Some(params)
}
