//! Peak-shape models.
//!
//! All peaks are parameterized by their full width at half maximum rather
//! than raw sigma, which keeps widths comparable across shape families. The
//! conversion constants live in the parent module.

use super::{clamp_sigma, FWHMG2SIG, FWHML2SIG, FWHMV2SIG};
use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Coefficients of the Thompson-Cox-Hastings total-FWHM polynomial.
const TCH: [f64; 4] = [2.69269, 2.42843, 4.47163, 0.07842];

/// A Gaussian peak.
///
/// f(x) = amplitude / (sigma * sqrt(2 * pi)) * exp(-(x - center)² / (2 * sigma²))
/// with sigma = fwhmg / (2 * sqrt(2 * ln 2)).
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `fwhmg = 1.0`.
pub fn gaussian(x: &Array1<f64>, amplitude: f64, center: f64, fwhmg: f64) -> Array1<f64> {
    let sigma = clamp_sigma(fwhmg * FWHMG2SIG);
    let norm = amplitude / (sigma * (2.0 * PI).sqrt());

    let result = x
        .iter()
        .map(|&x_val| {
            let arg = (x_val - center) / sigma;
            norm * (-0.5 * arg * arg).exp()
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// A Lorentzian peak.
///
/// f(x) = amplitude / pi * gamma / ((x - center)² + gamma²)
/// with gamma = fwhml / 2.
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `fwhml = 1.0`.
pub fn lorentzian(x: &Array1<f64>, amplitude: f64, center: f64, fwhml: f64) -> Array1<f64> {
    let gamma = clamp_sigma(fwhml * FWHML2SIG);

    let result = x
        .iter()
        .map(|&x_val| {
            let dx = x_val - center;
            amplitude / PI * gamma / (dx * dx + gamma * gamma)
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// A Voigt peak via the real part of the Faddeeva function.
///
/// f(x) = amplitude * Re[w(z)] / (sigma * sqrt(2 * pi)) with
/// z = ((x - center) + i * gamma) / (sigma * sqrt(2)) and
/// sigma = fwhmv / 3.60131. When `gamma` is not given it defaults to sigma.
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `fwhmv = 1.0`.
pub fn voigt(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    fwhmv: f64,
    gamma: Option<f64>,
) -> Array1<f64> {
    let sigma = clamp_sigma(fwhmv * FWHMV2SIG);
    let gamma = gamma.unwrap_or(sigma);
    let norm = amplitude / (sigma * (2.0 * PI).sqrt());
    let scale = 1.0 / (sigma * 2.0_f64.sqrt());

    let result = x
        .iter()
        .map(|&x_val| {
            let z = Complex64::new((x_val - center) * scale, gamma * scale);
            norm * faddeeva_w(z).re
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// A pseudo-Voigt peak: an FWHM-weighted linear combination of a Gaussian
/// and a Lorentzian evaluated at the common total FWHM.
///
/// The mixing fraction eta follows the empirical Thompson-Cox-Hastings
/// parameterization: with q = fwhml / fwhm_total,
/// eta = 1.36603 q - 0.47719 q² + 0.11116 q³.
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `fwhmg = 1.0`, `fwhml = 1.0`.
pub fn pseudovoigt(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    fwhmg: f64,
    fwhml: f64,
) -> Array1<f64> {
    let (eta, f_total) = tch_eta(fwhmg, fwhml);

    let g = gaussian(x, 1.0, center, f_total);
    let l = lorentzian(x, 1.0, center, f_total);

    (l * eta + g * (1.0 - eta)) * amplitude
}

/// The Thompson-Cox-Hastings mixing fraction and total FWHM for a
/// Gaussian/Lorentzian width pair. Returns `(eta, fwhm_total)`.
pub(crate) fn tch_eta(fwhmg: f64, fwhml: f64) -> (f64, f64) {
    let fg = fwhmg.abs();
    let fl = fwhml.abs();
    let f_pow5 = fg.powi(5)
        + TCH[0] * fg.powi(4) * fl
        + TCH[1] * fg.powi(3) * fl.powi(2)
        + TCH[2] * fg.powi(2) * fl.powi(3)
        + TCH[3] * fg * fl.powi(4)
        + fl.powi(5);
    let f_total = clamp_sigma(f_pow5.powf(0.2));

    let q = fl / f_total;
    let eta = 1.36603 * q - 0.47719 * q * q + 0.11116 * q * q * q;

    (eta, f_total)
}

/// A Gaussian parameterized by the raw width ORCA prints instead of FWHM.
///
/// f(x) = amplitude / (width * sqrt(2 * pi)) * exp(-(x - center)² / (2 * width²)).
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `width = 1.0`.
pub fn orcagaussian(x: &Array1<f64>, amplitude: f64, center: f64, width: f64) -> Array1<f64> {
    let sigma = clamp_sigma(width);
    let norm = amplitude / (sigma * (2.0 * PI).sqrt());

    let result = x
        .iter()
        .map(|&x_val| {
            let arg = (x_val - center) / sigma;
            norm * (-0.5 * arg * arg).exp()
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// Pearson type I peak: a beta-normalized symmetric power profile.
///
/// f(x) = amplitude / (sigma * B(exponent - 1/2, 1/2))
///        * (1 + ((x - center) / sigma)²)^(-exponent)
///
/// Defaults: `amplitude = 1.0`, `center = 0.0`, `sigma = 1.0`, `exponent = 1.0`.
pub fn pearson1(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    sigma: f64,
    exponent: f64,
) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);
    let norm = amplitude / (sigma * beta(exponent - 0.5, 0.5));

    let result = x
        .iter()
        .map(|&x_val| {
            let u = (x_val - center) / sigma;
            norm * (1.0 + u * u).powf(-exponent)
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// Pearson type II peak: the unnormalized symmetric power profile.
///
/// f(x) = amplitude * (1 + ((x - center) / sigma)²)^(-exponent)
pub fn pearson2(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    sigma: f64,
    exponent: f64,
) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);

    let result = x
        .iter()
        .map(|&x_val| {
            let u = (x_val - center) / sigma;
            amplitude * (1.0 + u * u).powf(-exponent)
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// Pearson type III peak: a gamma-shaped skewed profile with its maximum at
/// `center` and support where `1 + skewness * u > 0`.
///
/// f(x) = amplitude * (1 + skewness * u)^exponent * exp(-exponent * skewness * u)
/// with u = (x - center) / sigma. `skewness -> 0` broadens toward a flat top.
pub fn pearson3(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    sigma: f64,
    exponent: f64,
    skewness: f64,
) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);

    let result = x
        .iter()
        .map(|&x_val| {
            let u = (x_val - center) / sigma;
            let base = 1.0 + skewness * u;
            if base <= 0.0 {
                0.0
            } else {
                amplitude * base.powf(exponent) * (-exponent * skewness * u).exp()
            }
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// Pearson type IV peak in its canonical form.
///
/// f(x) = amplitude * (1 + u²)^(-exponent) * exp(-skewness * atan(u))
/// with u = (x - center) / sigma.
pub fn pearson4(
    x: &Array1<f64>,
    amplitude: f64,
    center: f64,
    sigma: f64,
    exponent: f64,
    skewness: f64,
) -> Array1<f64> {
    let sigma = clamp_sigma(sigma);

    let result = x
        .iter()
        .map(|&x_val| {
            let u = (x_val - center) / sigma;
            amplitude * (1.0 + u * u).powf(-exponent) * (-skewness * u.atan()).exp()
        })
        .collect::<Vec<f64>>();

    Array1::from_vec(result)
}

/// The Faddeeva function w(z) for Im(z) >= 0, Humlicek's four-region
/// rational approximation.
pub(crate) fn faddeeva_w(z: Complex64) -> Complex64 {
    let t = Complex64::new(z.im, -z.re);
    let s = z.re.abs() + z.im;

    if s >= 15.0 {
        t * 0.5641896 / (0.5 + t * t)
    } else if s >= 5.5 {
        let u = t * t;
        t * (1.410474 + u * 0.5641896) / (0.75 + u * (3.0 + u))
    } else if z.im >= 0.195 * z.re.abs() - 0.176 {
        (16.4955 + t * (20.20933 + t * (11.96482 + t * (3.778987 + t * 0.5642236))))
            / (16.4955 + t * (38.82363 + t * (39.27121 + t * (21.69274 + t * (6.699398 + t)))))
    } else {
        let u = t * t;
        let num = t
            * (36183.31
                - u * (3321.9905
                    - u * (1540.787
                        - u * (219.0313 - u * (35.76683 - u * (1.320522 - u * 0.56419))))));
        let den = 32066.6
            - u * (24322.84
                - u * (9022.228
                    - u * (2186.181 - u * (364.2191 - u * (61.57037 - u * (1.841439 - u))))));
        u.exp() - num / den
    }
}

/// The beta function via the gamma function.
fn beta(a: f64, b: f64) -> f64 {
    libm::tgamma(a) * libm::tgamma(b) / libm::tgamma(a + b)
}
