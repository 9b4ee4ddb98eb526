//! Step, edge and cumulative-peak models.
//!
//! Width-like parameters are clamped away from zero before dividing, so a
//! degenerate transition width degrades to a sharp edge instead of NaN.

use super::peak::tch_eta;
use super::{clamp_sigma, FWHMG2SIG, FWHML2SIG};
use ndarray::Array1;
use std::f64::consts::PI;

/// An error-function step, f(x) = amplitude / 2 * (1 + erf((x - center) / sigma)).
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `sigma = 1.0`.
pub fn erf_step(x: &Array1<f64>, amplitude: f64, center: f64, sigma: f64) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);
    x.mapv(|x_val| amplitude * 0.5 * (1.0 + libm::erf((x_val - center) / sigma)))
}

/// A Heaviside step, f(x) = amplitude / 2 * (sign(x - center) + 1).
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`.
pub fn heaviside(x: &Array1<f64>, amplitude: f64, center: f64) -> Array1<f64> {
    x.mapv(|x_val| {
        if x_val > center {
            amplitude
        } else if x_val == center {
            amplitude * 0.5
        } else {
            0.0
        }
    })
}

/// An arctangent step, f(x) = amplitude * (1/2 + atan((x - center) / sigma) / pi).
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `sigma = 1.0`.
pub fn atan_step(x: &Array1<f64>, amplitude: f64, center: f64, sigma: f64) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);
    x.mapv(|x_val| amplitude * (0.5 + ((x_val - center) / sigma).atan() / PI))
}

/// A logistic step, f(x) = amplitude / (1 + exp(-(x - center) / sigma)).
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `sigma = 1.0`.
pub fn log_step(x: &Array1<f64>, amplitude: f64, center: f64, sigma: f64) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);
    x.mapv(|x_val| amplitude / (1.0 + (-(x_val - center) / sigma).exp()))
}

/// A cumulative Gaussian edge: the integral of [`super::peak::gaussian`]
/// scaled to step from 0 to `amplitude`, with sigma = fwhmg / (2 sqrt(2 ln 2)).
pub fn cgaussian(x: &Array1<f64>, amplitude: f64, center: f64, fwhmg: f64) -> Array1<f64> {
    let sigma = clamp_sigma(fwhmg * FWHMG2SIG);
    let scale = 1.0 / (sigma * 2.0_f64.sqrt());
    x.mapv(|x_val| amplitude * 0.5 * (1.0 + libm::erf((x_val - center) * scale)))
}

/// A cumulative Lorentzian edge: the integral of [`super::peak::lorentzian`]
/// scaled to step from 0 to `amplitude`, with gamma = fwhml / 2.
pub fn clorentzian(x: &Array1<f64>, amplitude: f64, center: f64, fwhml: f64) -> Array1<f64> {
    let gamma = clamp_sigma(fwhml * FWHML2SIG);
    x.mapv(|x_val| amplitude * (0.5 + ((x_val - center) / gamma).atan() / PI))
}

/// A cumulative Voigt edge, approximated as the eta-weighted mixture of the
/// cumulative Gaussian and cumulative Lorentzian at their common widths.
///
/// The mixing weight reuses the Thompson-Cox-Hastings fraction of the
/// pseudo-Voigt, which keeps the edge consistent with the peak it integrates.
pub fn cvoigt(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    fwhmv: f64,
    fwhml: f64,
) -> Array1<f64> {
    let (eta, f_total) = tch_eta(fwhmv, fwhml);

    let g = cgaussian(x, 1.0, center, f_total);
    let l = clorentzian(x, 1.0, center, f_total);

    (l * eta + g * (1.0 - eta)) * amplitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_erf_step_limits() {
        let x = Array1::from_vec(vec![-100.0, 0.0, 100.0]);
        let y = erf_step(&x, 2.0, 0.0, 1.0);
        assert_relative_eq!(y[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(y[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heaviside_midpoint() {
        let x = Array1::from_vec(vec![-1.0, 0.0, 1.0]);
        let y = heaviside(&x, 4.0, 0.0);
        assert_eq!(y.to_vec(), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_steps_share_half_height_at_center() {
        let x = Array1::from_vec(vec![3.0]);
        for y in [
            atan_step(&x, 1.0, 3.0, 0.5),
            log_step(&x, 1.0, 3.0, 0.5),
            erf_step(&x, 1.0, 3.0, 0.5),
            cgaussian(&x, 1.0, 3.0, 0.5),
            clorentzian(&x, 1.0, 3.0, 0.5),
            cvoigt(&x, 1.0, 3.0, 0.5, 0.5),
        ] {
            assert_relative_eq!(y[0], 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_degenerate_sigma_is_clamped() {
        // Zero width must not produce NaN.
        let x = Array1::from_vec(vec![-1.0, 1.0]);
        let y = log_step(&x, 1.0, 0.0, 0.0);
        assert!(y.iter().all(|v| v.is_finite()));
        assert_relative_eq!(y[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(y[1], 1.0, epsilon = 1e-12);
    }
}
