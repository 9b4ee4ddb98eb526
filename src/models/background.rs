//! Background and trend models.

use super::clamp_sigma;
use ndarray::Array1;

/// A constant offset. Default: `amplitude = 1.0`.
pub fn constant(x: &Array1<f64>, amplitude: f64) -> Array1<f64> {
    Array1::from_elem(x.len(), amplitude)
}

/// A straight line, f(x) = slope * x + intercept.
///
/// Defaults: `slope = 1.0`, `intercept = 0.0`.
pub fn linear(x: &Array1<f64>, slope: f64, intercept: f64) -> Array1<f64> {
    x.mapv(|x_val| slope * x_val + intercept)
}

/// An exponential trend, f(x) = amplitude * exp(-x / decay) + intercept.
///
/// Defaults: `amplitude = 1.0`, `decay = 1.0`, `intercept = 0.0`.
pub fn exponential(x: &Array1<f64>, amplitude: f64, decay: f64, intercept: f64) -> Array1<f64> {
    let decay = clamp_sigma(decay);
    x.mapv(|x_val| amplitude * (-x_val / decay).exp() + intercept)
}

/// A power law, f(x) = amplitude * x^exponent + intercept.
///
/// Defaults: `amplitude = 1.0`, `exponent = 1.0`, `intercept = 0.0`.
pub fn power(x: &Array1<f64>, amplitude: f64, exponent: f64, intercept: f64) -> Array1<f64> {
    x.mapv(|x_val| amplitude * x_val.powf(exponent) + intercept)
}

/// A second-order polynomial, f(x) = c0 + c1 * x + c2 * x².
pub fn polynom2(
    x: &Array1<f64>,
    coefficient0: f64,
    coefficient1: f64,
    coefficient2: f64,
) -> Array1<f64> {
    x.mapv(|x_val| coefficient0 + x_val * (coefficient1 + x_val * coefficient2))
}

/// A third-order polynomial, f(x) = c0 + c1 * x + c2 * x² + c3 * x³.
pub fn polynom3(
    x: &Array1<f64>,
    coefficient0: f64,
    coefficient1: f64,
    coefficient2: f64,
    coefficient3: f64,
) -> Array1<f64> {
    x.mapv(|x_val| {
        coefficient0 + x_val * (coefficient1 + x_val * (coefficient2 + x_val * coefficient3))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_values() {
        let x = Array1::from_vec(vec![0.0, 1.0, 2.0]);
        let y = linear(&x, 2.0, -1.0);
        assert_eq!(y.to_vec(), vec![-1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_constant_fills() {
        let x = Array1::zeros(5);
        let y = constant(&x, 3.5);
        assert!(y.iter().all(|&v| v == 3.5));
    }

    #[test]
    fn test_exponential_decay() {
        let x = Array1::from_vec(vec![0.0, 1.0]);
        let y = exponential(&x, 2.0, 1.0, 0.5);
        assert_relative_eq!(y[0], 2.5);
        assert_relative_eq!(y[1], 2.0 * (-1.0_f64).exp() + 0.5);
    }

    #[test]
    fn test_polynom_horner() {
        let x = Array1::from_vec(vec![2.0]);
        let y2 = polynom2(&x, 1.0, 2.0, 3.0);
        assert_relative_eq!(y2[0], 1.0 + 4.0 + 12.0);

        let y3 = polynom3(&x, 1.0, 2.0, 3.0, 4.0);
        assert_relative_eq!(y3[0], 1.0 + 4.0 + 12.0 + 32.0);
    }
}
