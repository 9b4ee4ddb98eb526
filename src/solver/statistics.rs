//! Goodness-of-fit statistics and uncertainty estimates.
//!
//! Everything here is derived from the residuals and Jacobian the minimizer
//! reports at the solution; nothing re-evaluates the model.

use crate::parameters::{ParameterKey, Parameters};
use crate::solver::lm::{cholesky, cholesky_solve};
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::Serialize;

/// Goodness-of-fit summary for one minimization.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FitStatistics {
    /// Number of residual points.
    pub ndata: usize,

    /// Number of varying parameters.
    pub nvarys: usize,

    /// Degrees of freedom, `ndata - nvarys`.
    pub nfree: usize,

    /// Sum of squared residuals.
    pub chisqr: f64,

    /// Chi-square per degree of freedom.
    pub redchi: f64,

    /// Akaike information criterion.
    pub aic: f64,

    /// Bayesian information criterion.
    pub bic: f64,
}

/// Statistics from the residuals at the solution.
pub fn fit_statistics(residuals: &Array1<f64>, nvarys: usize) -> FitStatistics {
    let ndata = residuals.len();
    let nfree = ndata.saturating_sub(nvarys);
    let chisqr: f64 = residuals.iter().map(|r| r.powi(2)).sum();
    let redchi = chisqr / nfree.max(1) as f64;

    // The floor keeps the log finite for an exact fit.
    let n = ndata as f64;
    let chisqr_floored = chisqr.max(1e-250 * n);
    let log_likelihood_term = n * (chisqr_floored / n).ln();
    let aic = log_likelihood_term + 2.0 * nvarys as f64;
    let bic = log_likelihood_term + n.ln() * nvarys as f64;

    FitStatistics {
        ndata,
        nvarys,
        nfree,
        chisqr,
        redchi,
        aic,
        bic,
    }
}

/// Covariance of the external parameter values.
///
/// Computes `redchi * (J^T J)^-1` in internal coordinates and maps it to
/// external coordinates with the bound-transform derivatives in
/// `gradient_scale`. Returns `None` when `J^T J` is not positive definite.
pub fn covariance(
    jacobian: &Array2<f64>,
    redchi: f64,
    gradient_scale: &Array1<f64>,
) -> Option<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    let mut covar = cholesky_inverse(&jtj)?;
    let n = covar.nrows();
    for i in 0..n {
        for j in 0..n {
            covar[[i, j]] *= redchi * gradient_scale[i] * gradient_scale[j];
        }
    }
    Some(covar)
}

/// Standard errors from the covariance diagonal.
pub fn standard_errors(covar: &Array2<f64>) -> Array1<f64> {
    Array1::from_iter((0..covar.nrows()).map(|i| covar[[i, i]].max(0.0).sqrt()))
}

/// Correlation matrix of a covariance matrix.
///
/// Entries with a vanishing variance on either axis are reported as zero.
pub fn correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut matrix = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let denominator = (covar[[i, i]] * covar[[j, j]]).sqrt();
            matrix[[i, j]] = if denominator > 0.0 && denominator.is_finite() {
                covar[[i, j]] / denominator
            } else {
                0.0
            };
        }
    }
    matrix
}

fn cholesky_inverse(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let factor = cholesky(matrix)?;
    let n = matrix.nrows();
    let mut inverse = Array2::zeros((n, n));
    for j in 0..n {
        let mut unit = Array1::zeros(n);
        unit[j] = 1.0;
        inverse.column_mut(j).assign(&cholesky_solve(&factor, &unit));
    }
    Some(inverse)
}

/// A symmetric interval around a fitted value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    /// Half-width of the interval in standard errors.
    pub sigma: f64,

    /// Lower edge of the interval.
    pub lower: f64,

    /// Upper edge of the interval.
    pub upper: f64,
}

/// Sigma-multiple intervals around `value`.
///
/// Empty when no usable standard error is available; sigma levels that are
/// not finite and positive are dropped.
pub fn confidence_intervals(
    value: f64,
    stderr: Option<f64>,
    sigmas: &[f64],
) -> Vec<ConfidenceInterval> {
    let stderr = match stderr {
        Some(stderr) if stderr.is_finite() && stderr > 0.0 => stderr,
        _ => return Vec::new(),
    };

    sigmas
        .iter()
        .copied()
        .filter(|sigma| sigma.is_finite() && *sigma > 0.0)
        .map(|sigma| ConfidenceInterval {
            sigma,
            lower: value - sigma * stderr,
            upper: value + sigma * stderr,
        })
        .collect()
}

/// Post-fit flags for a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterAnnotation {
    /// The value did not move from its starting point.
    AtInitialValue,

    /// The value sits on one of its bounds.
    AtBoundary,
}

/// Flags for every varying parameter that ended up in a suspicious spot.
pub fn annotate(params: &Parameters) -> IndexMap<ParameterKey, Vec<ParameterAnnotation>> {
    let mut annotations = IndexMap::new();
    for (key, param) in params.iter() {
        if !param.vary() {
            continue;
        }
        let mut flags = Vec::new();
        if param.at_initial_value() {
            flags.push(ParameterAnnotation::AtInitialValue);
        }
        if param.at_boundary() {
            flags.push(ParameterAnnotation::AtBoundary);
        }
        if !flags.is_empty() {
            annotations.insert(key.clone(), flags);
        }
    }
    annotations
}
