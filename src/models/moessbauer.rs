//! Mössbauer hyperfine patterns.
//!
//! Singlet, doublet, sextet and octet line groups built from Lorentzian
//! lines. Line positions follow a simplified first-order approximation:
//! magnetic splitting multipliers of 3x, 2x and 1x for the sextet lines and
//! a 0.1 correction factor on the quadrupole-magnetic cross term that splits
//! the outer octet lines. These coefficients are pinned by downstream tests
//! and must not be replaced with a fuller hyperfine Hamiltonian.
//!
//! Velocities are in mm/s, fields in Tesla, EFG main components in V/m².

use super::peak::lorentzian;
use ndarray::Array1;

/// Powder-average angle between field and beam, in degrees. The 2nd/5th
/// line weight `4 sin²θ / (1 + cos²θ)` equals 2 here.
pub const POWDER_ANGLE_DEG: f64 = 54.7356103172;

/// Simplified conversion of hyperfine field to one splitting unit, mm/s per
/// Tesla. A 33 T field spans the classic 10.6 mm/s outer-line separation.
pub const FIELD_TO_VELOCITY: f64 = 0.05365;

/// Fields below this produce no resolvable magnetic structure; the octet
/// cross term stays inactive.
pub const MIN_FIELD: f64 = 1.0;

/// EFG main components below this leave the octet cross term inactive.
pub const MIN_EFG_VZZ: f64 = 1e19;

/// Reference EFG magnitude for the cross-term velocity scale.
const EFG_SCALE: f64 = 1e21;

/// Empirical correction factor on the octet line-splitting cross term.
const EFG_CORRECTION: f64 = 0.1;

/// Magnetic splitting multipliers for the six sextet lines.
const SEXTET_SPLITTING: [f64; 6] = [-3.0, -2.0, -1.0, 1.0, 2.0, 3.0];

/// First-order quadrupole shift signs per sextet line: the outer pair moves
/// opposite to the inner four.
const SEXTET_QUAD_SIGN: [f64; 6] = [1.0, -1.0, -1.0, -1.0, -1.0, 1.0];

/// A single Mössbauer line at the isomer shift.
///
/// Defaults: `amplitude = 1.0`, `isomershift = 0.0`, `fwhml = 0.25`,
/// `background = 0.0`.
pub fn singlet(
    x: &Array1<f64>,
    amplitude: f64,
    isomershift: f64,
    fwhml: f64,
    background: f64,
) -> Array1<f64> {
    lorentzian(x, amplitude, isomershift, fwhml) + background
}

/// A symmetric quadrupole doublet: two half-weight lines split by
/// `quadrupolesplitting` around the isomer shift.
///
/// Defaults: `amplitude = 1.0`, `isomershift = 0.0`, `fwhml = 0.25`,
/// `quadrupolesplitting = 0.8`, `background = 0.0`.
pub fn doublet(
    x: &Array1<f64>,
    amplitude: f64,
    isomershift: f64,
    fwhml: f64,
    quadrupolesplitting: f64,
    background: f64,
) -> Array1<f64> {
    let half = quadrupolesplitting / 2.0;
    let low = lorentzian(x, amplitude / 2.0, isomershift - half, fwhml);
    let high = lorentzian(x, amplitude / 2.0, isomershift + half, fwhml);

    low + high + background
}

/// A magnetic sextet: six lines at `isomershift + m·Δ + q·QS/2` with
/// `Δ = magneticfield * FIELD_TO_VELOCITY`, multipliers `m = ±3, ±2, ±1` and
/// quadrupole signs `q = +,-,-,-,-,+`.
///
/// Relative line weights are `3 : r : 1 : 1 : r : 3` with
/// `r = 4 sin²θ / (1 + cos²θ)`, θ = `angle` in degrees between hyperfine
/// field and beam; the powder average θ ≈ 54.74° gives the familiar
/// 3:2:1:1:2:3 pattern.
///
/// Defaults: `amplitude = 1.0`, `isomershift = 0.0`, `fwhml = 0.25`,
/// `magneticfield = 33.0`, `quadrupolesplitting = 0.0`,
/// `angle = POWDER_ANGLE_DEG`, `background = 0.0`.
#[allow(clippy::too_many_arguments)]
pub fn sextet(
    x: &Array1<f64>,
    amplitude: f64,
    isomershift: f64,
    fwhml: f64,
    magneticfield: f64,
    quadrupolesplitting: f64,
    angle: f64,
    background: f64,
) -> Array1<f64> {
    let delta = magneticfield * FIELD_TO_VELOCITY;
    let theta = angle.to_radians();
    let r = 4.0 * theta.sin().powi(2) / (1.0 + theta.cos().powi(2));
    let weights = [3.0, r, 1.0, 1.0, r, 3.0];
    let total: f64 = weights.iter().sum();

    let mut y = Array1::zeros(x.len());
    for i in 0..6 {
        let position =
            isomershift + SEXTET_SPLITTING[i] * delta + SEXTET_QUAD_SIGN[i] * quadrupolesplitting / 2.0;
        y = y + lorentzian(x, amplitude * weights[i] / total, position, fwhml);
    }

    y + background
}

/// A sextet whose outer lines are split by the second-order
/// quadrupole-magnetic cross term, giving eight lines in total.
///
/// The cross term is active only when `magneticfield >= MIN_FIELD` and
/// `|efgvzz| >= MIN_EFG_VZZ`; below either threshold the output equals
/// [`sextet`] with the same arguments, exactly. The outer-line splitting is
/// `EFG_CORRECTION * (efgvzz / 1e21) * sqrt(1 + efgeta²/3)` mm/s, shared
/// half-and-half between two half-weight lines.
///
/// Defaults: as [`sextet`] plus `efgvzz = 0.0`, `efgeta = 0.0`.
#[allow(clippy::too_many_arguments)]
pub fn octet(
    x: &Array1<f64>,
    amplitude: f64,
    isomershift: f64,
    fwhml: f64,
    magneticfield: f64,
    quadrupolesplitting: f64,
    angle: f64,
    efgvzz: f64,
    efgeta: f64,
    background: f64,
) -> Array1<f64> {
    if magneticfield < MIN_FIELD || efgvzz.abs() < MIN_EFG_VZZ {
        return sextet(
            x,
            amplitude,
            isomershift,
            fwhml,
            magneticfield,
            quadrupolesplitting,
            angle,
            background,
        );
    }

    let delta = magneticfield * FIELD_TO_VELOCITY;
    let theta = angle.to_radians();
    let r = 4.0 * theta.sin().powi(2) / (1.0 + theta.cos().powi(2));
    let weights = [3.0, r, 1.0, 1.0, r, 3.0];
    let total: f64 = weights.iter().sum();

    let epsilon = EFG_CORRECTION * (efgvzz / EFG_SCALE) * (1.0 + efgeta * efgeta / 3.0).sqrt();

    let mut y = Array1::zeros(x.len());
    for i in 0..6 {
        let position =
            isomershift + SEXTET_SPLITTING[i] * delta + SEXTET_QUAD_SIGN[i] * quadrupolesplitting / 2.0;
        let line_amplitude = amplitude * weights[i] / total;

        if i == 0 || i == 5 {
            // Outer lines split into two half-weight lines.
            y = y + lorentzian(x, line_amplitude / 2.0, position - epsilon / 2.0, fwhml);
            y = y + lorentzian(x, line_amplitude / 2.0, position + epsilon / 2.0, fwhml);
        } else {
            y = y + lorentzian(x, line_amplitude, position, fwhml);
        }
    }

    y + background
}
