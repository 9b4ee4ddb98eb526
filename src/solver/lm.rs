//! The Levenberg-Marquardt minimizer.
//!
//! Works entirely in internal (unbounded) coordinates: bounded parameters
//! are transformed before values get here. Each iteration solves the damped
//! normal equations by Cholesky factorization and adapts the damping from
//! the step outcome: accepted steps shrink lambda, rejected steps grow it.

use crate::config::OptimizerOptions;
use crate::error::{Result, SpectraFitError};
use log::debug;
use ndarray::{Array1, Array2};

/// Relative step for forward-difference derivatives.
const DIFF_EPS: f64 = 1e-8;

/// A least-squares objective handed to the minimizer.
///
/// Implementations may keep mutable state between calls; the minimizer
/// never evaluates two points concurrently.
pub trait ResidualProblem {
    /// The residual vector at the given internal coordinates.
    fn residuals(&mut self, internal: &Array1<f64>) -> Result<Array1<f64>>;
}

impl<F> ResidualProblem for F
where
    F: FnMut(&Array1<f64>) -> Result<Array1<f64>>,
{
    fn residuals(&mut self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        self(internal)
    }
}

/// Outcome of one minimization run.
#[derive(Debug, Clone)]
pub struct Minimization {
    /// Solution in internal coordinates.
    pub internal: Array1<f64>,

    /// Residuals at the solution.
    pub residuals: Array1<f64>,

    /// Sum of squared residuals at the solution.
    pub cost: f64,

    /// Jacobian at the solution, internal coordinates.
    pub jacobian: Array2<f64>,

    /// Accepted iterations.
    pub iterations: usize,

    /// Residual evaluations, finite differences included.
    pub nfev: usize,

    /// Whether a convergence criterion was met.
    pub success: bool,

    /// Which criterion ended the run.
    pub message: String,
}

/// The Levenberg-Marquardt minimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    options: OptimizerOptions,
}

impl LevenbergMarquardt {
    /// A minimizer with the given options.
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Minimize the sum of squared residuals starting from `initial`.
    ///
    /// Returns `Ok` with `success = false` when the run stops without
    /// meeting a convergence criterion; hard failures (empty problem,
    /// residual shape changes) are errors.
    pub fn minimize<P>(&self, problem: &mut P, initial: Array1<f64>) -> Result<Minimization>
    where
        P: ResidualProblem,
    {
        let n = initial.len();
        if n == 0 {
            return Err(SpectraFitError::MinimizationFailure(
                "nothing to optimize, every parameter is fixed or constrained".to_string(),
            ));
        }
        let budget = self.options.nfev_budget(n);

        let mut params = initial;
        let mut residuals = problem.residuals(&params)?;
        let mut nfev = 1;
        if residuals.is_empty() {
            return Err(SpectraFitError::MinimizationFailure(
                "the residual vector is empty".to_string(),
            ));
        }
        let ndata = residuals.len();
        let mut cost = sum_of_squares(&residuals);
        let mut lambda = self.options.initial_lambda;
        let mut iterations = 0;
        let mut success = false;
        let mut message = format!(
            "Maximum iterations ({}) reached",
            self.options.max_iterations
        );
        // A Jacobian known to be evaluated at the current `params`.
        let mut jacobian_at_solution = None;

        'outer: while iterations < self.options.max_iterations {
            if nfev >= budget {
                message = format!("Maximum function evaluations ({}) reached", budget);
                break;
            }

            let jacobian = self.forward_jacobian(problem, &params, &residuals, &mut nfev)?;
            let gradient = jacobian.t().dot(&residuals);
            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if gradient_norm < self.options.gtol {
                success = true;
                message = format!(
                    "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                    gradient_norm, self.options.gtol
                );
                jacobian_at_solution = Some(jacobian);
                break;
            }
            let jtj = jacobian.t().dot(&jacobian);

            loop {
                if nfev >= budget {
                    message = format!("Maximum function evaluations ({}) reached", budget);
                    break 'outer;
                }

                let step = match damped_step(&jtj, &gradient, lambda) {
                    Some(step) => step,
                    None => {
                        if lambda >= self.options.max_lambda {
                            message =
                                "Normal equations stayed singular at maximum damping".to_string();
                            break 'outer;
                        }
                        lambda =
                            (lambda * self.options.lambda_up_factor).min(self.options.max_lambda);
                        continue;
                    }
                };

                let trial = &params + &step;
                let trial_residuals = problem.residuals(&trial)?;
                nfev += 1;
                if trial_residuals.len() != ndata {
                    return Err(SpectraFitError::DimensionMismatch(format!(
                        "residual length changed from {} to {} during minimization",
                        ndata,
                        trial_residuals.len()
                    )));
                }
                let trial_cost = sum_of_squares(&trial_residuals);

                if trial_cost.is_finite() && trial_cost < cost {
                    let step_size = step.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
                    let cost_drop = (cost - trial_cost) / cost.max(1e-10);

                    params = trial;
                    residuals = trial_residuals;
                    cost = trial_cost;
                    lambda = (lambda * self.options.lambda_down_factor).max(self.options.min_lambda);
                    iterations += 1;
                    debug!(
                        "iteration {}: cost = {:.6e}, lambda = {:.2e}, nfev = {}",
                        iterations, cost, lambda, nfev
                    );

                    if step_size < self.options.xtol {
                        success = true;
                        message = format!(
                            "Parameter convergence: |dx| = {:.2e} < {:.2e}",
                            step_size, self.options.xtol
                        );
                        break 'outer;
                    }
                    if cost_drop < self.options.ftol {
                        success = true;
                        message = format!(
                            "Cost convergence: |df|/f = {:.2e} < {:.2e}",
                            cost_drop, self.options.ftol
                        );
                        break 'outer;
                    }
                    break;
                }

                if lambda >= self.options.max_lambda {
                    message = "Failed to decrease cost with damping at its maximum".to_string();
                    break 'outer;
                }
                lambda = (lambda * self.options.lambda_up_factor).min(self.options.max_lambda);
            }
        }

        // The covariance step needs the Jacobian at the solution itself.
        let jacobian = match jacobian_at_solution {
            Some(jacobian) => jacobian,
            None => self.forward_jacobian(problem, &params, &residuals, &mut nfev)?,
        };

        Ok(Minimization {
            internal: params,
            residuals,
            cost,
            jacobian,
            iterations,
            nfev,
            success,
            message,
        })
    }

    /// Forward-difference Jacobian at `params`, reusing the residuals
    /// already evaluated there.
    fn forward_jacobian<P>(
        &self,
        problem: &mut P,
        params: &Array1<f64>,
        residuals: &Array1<f64>,
        nfev: &mut usize,
    ) -> Result<Array2<f64>>
    where
        P: ResidualProblem,
    {
        let n = params.len();
        let m = residuals.len();
        let mut jacobian = Array2::zeros((m, n));
        let mut shifted = params.clone();

        for j in 0..n {
            let step = DIFF_EPS * params[j].abs().max(1.0);
            shifted[j] = params[j] + step;
            let perturbed = problem.residuals(&shifted)?;
            *nfev += 1;
            if perturbed.len() != m {
                return Err(SpectraFitError::DimensionMismatch(format!(
                    "residual length changed from {} to {} during differentiation",
                    m,
                    perturbed.len()
                )));
            }
            let column = (&perturbed - residuals) / step;
            jacobian.column_mut(j).assign(&column);
            shifted[j] = params[j];
        }

        Ok(jacobian)
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r.powi(2)).sum()
}

/// Solve `(J^T J + lambda * diag(J^T J)) delta = -g` for the step.
///
/// Zero diagonal entries are damped by `lambda` itself so the system stays
/// positive definite. Returns `None` when the factorization still fails.
fn damped_step(jtj: &Array2<f64>, gradient: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let n = jtj.nrows();
    let mut damped = jtj.clone();
    for i in 0..n {
        let diagonal = jtj[[i, i]];
        damped[[i, i]] += lambda * if diagonal > 0.0 { diagonal } else { 1.0 };
    }
    let factor = cholesky(&damped)?;
    Some(cholesky_solve(&factor, &gradient.mapv(|g| -g)))
}

/// Lower Cholesky factor of a symmetric positive definite matrix, or `None`
/// when a pivot is not positive.
pub(crate) fn cholesky(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut factor = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[[i, j]];
            for k in 0..j {
                sum -= factor[[i, k]] * factor[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                factor[[i, j]] = sum.sqrt();
            } else {
                factor[[i, j]] = sum / factor[[j, j]];
            }
        }
    }

    Some(factor)
}

/// Solve `L L^T x = b` given the lower factor `L`.
pub(crate) fn cholesky_solve(factor: &Array2<f64>, rhs: &Array1<f64>) -> Array1<f64> {
    let n = factor.nrows();

    // Forward substitution: L y = b.
    let mut solution = rhs.clone();
    for i in 0..n {
        for j in 0..i {
            solution[i] -= factor[[i, j]] * solution[j];
        }
        solution[i] /= factor[[i, i]];
    }

    // Backward substitution: L^T x = y.
    for i in (0..n).rev() {
        for j in (i + 1)..n {
            solution[i] -= factor[[j, i]] * solution[j];
        }
        solution[i] /= factor[[i, i]];
    }

    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn line_problem(
        x: Vec<f64>,
        y: Vec<f64>,
    ) -> impl FnMut(&Array1<f64>) -> Result<Array1<f64>> {
        move |params: &Array1<f64>| {
            Ok(Array1::from_iter(
                x.iter()
                    .zip(y.iter())
                    .map(|(xi, yi)| params[0] * xi + params[1] - yi),
            ))
        }
    }

    #[test]
    fn test_linear_fit() {
        // Approximately y = 2x + 3.
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![5.1, 7.0, 8.9, 11.2, 13.0];
        let mut problem = line_problem(x, y);

        let lm = LevenbergMarquardt::new(OptimizerOptions::default());
        let fit = lm.minimize(&mut problem, array![1.0, 1.0]).unwrap();

        assert!(fit.success, "{}", fit.message);
        assert_relative_eq!(fit.internal[0], 2.0, epsilon = 0.1);
        assert_relative_eq!(fit.internal[1], 3.0, epsilon = 0.1);
        assert!(fit.cost < 0.1);
    }

    #[test]
    fn test_exponential_decay_fit() {
        // Noise-free y = 3 * exp(-0.7 x).
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|xi| 3.0 * (-0.7 * xi).exp()).collect();
        let mut problem = move |params: &Array1<f64>| -> Result<Array1<f64>> {
            Ok(Array1::from_iter(
                x.iter()
                    .zip(y.iter())
                    .map(|(xi, yi)| params[0] * (-params[1] * xi).exp() - yi),
            ))
        };

        let lm = LevenbergMarquardt::new(OptimizerOptions::default());
        let fit = lm.minimize(&mut problem, array![1.0, 0.1]).unwrap();

        assert!(fit.success, "{}", fit.message);
        assert_relative_eq!(fit.internal[0], 3.0, max_relative = 1e-4);
        assert_relative_eq!(fit.internal[1], 0.7, max_relative = 1e-4);
    }

    #[test]
    fn test_evaluation_budget_is_reported() {
        let mut problem = line_problem(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]);
        let options = OptimizerOptions::default().with_max_nfev(3);

        let lm = LevenbergMarquardt::new(options);
        let fit = lm.minimize(&mut problem, array![0.0, 0.0]).unwrap();

        assert!(!fit.success);
        assert!(fit.message.contains("function evaluations"));
    }

    #[test]
    fn test_empty_parameter_vector_is_an_error() {
        let mut problem = line_problem(vec![1.0], vec![1.0]);
        let lm = LevenbergMarquardt::new(OptimizerOptions::default());
        assert!(lm.minimize(&mut problem, Array1::zeros(0)).is_err());
    }

    #[test]
    fn test_inert_parameter_is_tolerated() {
        // The second parameter never enters the residual; its zero diagonal
        // must not break the damped solve.
        let mut problem = |params: &Array1<f64>| -> Result<Array1<f64>> {
            Ok(array![params[0] - 4.0])
        };

        let lm = LevenbergMarquardt::new(OptimizerOptions::default());
        let fit = lm.minimize(&mut problem, array![0.0, 1.0]).unwrap();

        assert!(fit.success, "{}", fit.message);
        assert_relative_eq!(fit.internal[0], 4.0, epsilon = 1e-6);
        assert_relative_eq!(fit.internal[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_solves_spd_system() {
        let matrix = array![[4.0, 2.0], [2.0, 3.0]];
        let factor = cholesky(&matrix).unwrap();
        let solution = cholesky_solve(&factor, &array![2.0, 5.0]);

        assert_relative_eq!(solution[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(solution[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite_matrix() {
        let matrix = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(&matrix).is_none());
    }
}
