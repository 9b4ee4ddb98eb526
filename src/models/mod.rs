//! Distribution model library.
//!
//! Pure functions mapping `(x, shape parameters) -> y` for every supported
//! peak, background, step and Mössbauer pattern. Each function takes an
//! x-array and named parameters with documented defaults and returns a
//! same-length array; nothing here holds state.
//!
//! Dispatch goes through the closed [`ComponentKind`] registry: parsing a
//! kind name and evaluating a component use the same enum, so a parameter
//! accepted at assembly time can never be rejected at solve time.

pub mod background;
pub mod moessbauer;
pub mod peak;
pub mod step;

use crate::error::{Result, SpectraFitError};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversion of Gaussian FWHM to sigma: `1 / (2 * sqrt(2 * ln 2))`.
pub const FWHMG2SIG: f64 = 0.4246609001440095;

/// Conversion of Lorentzian FWHM to the half width gamma.
pub const FWHML2SIG: f64 = 0.5;

/// Empirical conversion of Voigt FWHM to sigma.
pub const FWHMV2SIG: f64 = 1.0 / 3.60131;

/// Floor for width-like parameters to avoid division by zero.
pub const SIGMA_FLOOR: f64 = 1e-13;

/// Clamp a width-like parameter away from zero.
#[inline]
pub fn clamp_sigma(sigma: f64) -> f64 {
    if sigma.abs() < SIGMA_FLOOR {
        SIGMA_FLOOR
    } else {
        sigma
    }
}

/// Named shape parameters collected for one component evaluation.
///
/// Insertion order follows the flat parameter set, so repeated evaluations
/// see identical argument order.
pub type ShapeArgs = IndexMap<String, f64>;

/// Look up a shape parameter, falling back to its documented default.
#[inline]
pub(crate) fn arg(args: &ShapeArgs, name: &str, default: f64) -> f64 {
    args.get(name).copied().unwrap_or(default)
}

/// The closed registry of component kinds.
///
/// The lowercase string form of each variant is the `component_kind` segment
/// of flat parameter names. Kind names never contain underscores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Gaussian,
    Lorentzian,
    Voigt,
    PseudoVoigt,
    OrcaGaussian,
    Pearson1,
    Pearson2,
    Pearson3,
    Pearson4,
    Constant,
    Linear,
    Exponential,
    Power,
    Polynom2,
    Polynom3,
    Erf,
    Heaviside,
    Atan,
    Log,
    CGaussian,
    CLorentzian,
    CVoigt,
    MoessbauerSinglet,
    MoessbauerDoublet,
    MoessbauerSextet,
    MoessbauerOctet,
}

impl ComponentKind {
    /// Every kind, in registry order.
    pub const ALL: [ComponentKind; 26] = [
        ComponentKind::Gaussian,
        ComponentKind::Lorentzian,
        ComponentKind::Voigt,
        ComponentKind::PseudoVoigt,
        ComponentKind::OrcaGaussian,
        ComponentKind::Pearson1,
        ComponentKind::Pearson2,
        ComponentKind::Pearson3,
        ComponentKind::Pearson4,
        ComponentKind::Constant,
        ComponentKind::Linear,
        ComponentKind::Exponential,
        ComponentKind::Power,
        ComponentKind::Polynom2,
        ComponentKind::Polynom3,
        ComponentKind::Erf,
        ComponentKind::Heaviside,
        ComponentKind::Atan,
        ComponentKind::Log,
        ComponentKind::CGaussian,
        ComponentKind::CLorentzian,
        ComponentKind::CVoigt,
        ComponentKind::MoessbauerSinglet,
        ComponentKind::MoessbauerDoublet,
        ComponentKind::MoessbauerSextet,
        ComponentKind::MoessbauerOctet,
    ];

    /// The lowercase name used in flat parameter keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Gaussian => "gaussian",
            ComponentKind::Lorentzian => "lorentzian",
            ComponentKind::Voigt => "voigt",
            ComponentKind::PseudoVoigt => "pseudovoigt",
            ComponentKind::OrcaGaussian => "orcagaussian",
            ComponentKind::Pearson1 => "pearson1",
            ComponentKind::Pearson2 => "pearson2",
            ComponentKind::Pearson3 => "pearson3",
            ComponentKind::Pearson4 => "pearson4",
            ComponentKind::Constant => "constant",
            ComponentKind::Linear => "linear",
            ComponentKind::Exponential => "exponential",
            ComponentKind::Power => "power",
            ComponentKind::Polynom2 => "polynom2",
            ComponentKind::Polynom3 => "polynom3",
            ComponentKind::Erf => "erf",
            ComponentKind::Heaviside => "heaviside",
            ComponentKind::Atan => "atan",
            ComponentKind::Log => "log",
            ComponentKind::CGaussian => "cgaussian",
            ComponentKind::CLorentzian => "clorentzian",
            ComponentKind::CVoigt => "cvoigt",
            ComponentKind::MoessbauerSinglet => "moessbauersinglet",
            ComponentKind::MoessbauerDoublet => "moessbauerdoublet",
            ComponentKind::MoessbauerSextet => "moessbauersextet",
            ComponentKind::MoessbauerOctet => "moessbaueroctet",
        }
    }

    /// The shape parameters this kind accepts. Defaults are documented on
    /// the model functions themselves.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            ComponentKind::Gaussian => &["amplitude", "center", "fwhmg"],
            ComponentKind::Lorentzian => &["amplitude", "center", "fwhml"],
            ComponentKind::Voigt => &["amplitude", "center", "fwhmv", "gamma"],
            ComponentKind::PseudoVoigt => &["amplitude", "center", "fwhmg", "fwhml"],
            ComponentKind::OrcaGaussian => &["amplitude", "center", "width"],
            ComponentKind::Pearson1 | ComponentKind::Pearson2 => {
                &["amplitude", "center", "sigma", "exponent"]
            }
            ComponentKind::Pearson3 | ComponentKind::Pearson4 => {
                &["amplitude", "center", "sigma", "exponent", "skewness"]
            }
            ComponentKind::Constant => &["amplitude"],
            ComponentKind::Linear => &["slope", "intercept"],
            ComponentKind::Exponential => &["amplitude", "decay", "intercept"],
            ComponentKind::Power => &["amplitude", "exponent", "intercept"],
            ComponentKind::Polynom2 => &["coefficient0", "coefficient1", "coefficient2"],
            ComponentKind::Polynom3 => {
                &["coefficient0", "coefficient1", "coefficient2", "coefficient3"]
            }
            ComponentKind::Erf | ComponentKind::Atan | ComponentKind::Log => {
                &["amplitude", "center", "sigma"]
            }
            ComponentKind::Heaviside => &["amplitude", "center"],
            ComponentKind::CGaussian => &["amplitude", "center", "fwhmg"],
            ComponentKind::CLorentzian => &["amplitude", "center", "fwhml"],
            ComponentKind::CVoigt => &["amplitude", "center", "fwhmv", "fwhml"],
            ComponentKind::MoessbauerSinglet => {
                &["amplitude", "isomershift", "fwhml", "background"]
            }
            ComponentKind::MoessbauerDoublet => &[
                "amplitude",
                "isomershift",
                "fwhml",
                "quadrupolesplitting",
                "background",
            ],
            ComponentKind::MoessbauerSextet => &[
                "amplitude",
                "isomershift",
                "fwhml",
                "magneticfield",
                "quadrupolesplitting",
                "angle",
                "background",
            ],
            ComponentKind::MoessbauerOctet => &[
                "amplitude",
                "isomershift",
                "fwhml",
                "magneticfield",
                "quadrupolesplitting",
                "angle",
                "efgvzz",
                "efgeta",
                "background",
            ],
        }
    }

    /// Evaluate this component at `x` with the collected shape arguments.
    ///
    /// Arguments not listed in [`parameter_names`](Self::parameter_names)
    /// are rejected; missing ones take their documented defaults.
    pub fn evaluate(&self, x: &Array1<f64>, args: &ShapeArgs) -> Result<Array1<f64>> {
        for name in args.keys() {
            if !self.parameter_names().contains(&name.as_str()) {
                return Err(SpectraFitError::InvalidParameter(format!(
                    "'{}' is not a parameter of {}",
                    name,
                    self.as_str()
                )));
            }
        }

        let y = match self {
            ComponentKind::Gaussian => peak::gaussian(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhmg", 1.0),
            ),
            ComponentKind::Lorentzian => peak::lorentzian(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhml", 1.0),
            ),
            ComponentKind::Voigt => peak::voigt(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhmv", 1.0),
                args.get("gamma").copied(),
            ),
            ComponentKind::PseudoVoigt => peak::pseudovoigt(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhmg", 1.0),
                arg(args, "fwhml", 1.0),
            ),
            ComponentKind::OrcaGaussian => peak::orcagaussian(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "width", 1.0),
            ),
            ComponentKind::Pearson1 => peak::pearson1(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
                arg(args, "exponent", 1.0),
            ),
            ComponentKind::Pearson2 => peak::pearson2(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
                arg(args, "exponent", 1.0),
            ),
            ComponentKind::Pearson3 => peak::pearson3(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
                arg(args, "exponent", 1.0),
                arg(args, "skewness", 1.0),
            ),
            ComponentKind::Pearson4 => peak::pearson4(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
                arg(args, "exponent", 1.0),
                arg(args, "skewness", 0.0),
            ),
            ComponentKind::Constant => background::constant(x, arg(args, "amplitude", 1.0)),
            ComponentKind::Linear => {
                background::linear(x, arg(args, "slope", 1.0), arg(args, "intercept", 0.0))
            }
            ComponentKind::Exponential => background::exponential(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "decay", 1.0),
                arg(args, "intercept", 0.0),
            ),
            ComponentKind::Power => background::power(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "exponent", 1.0),
                arg(args, "intercept", 0.0),
            ),
            ComponentKind::Polynom2 => background::polynom2(
                x,
                arg(args, "coefficient0", 1.0),
                arg(args, "coefficient1", 1.0),
                arg(args, "coefficient2", 1.0),
            ),
            ComponentKind::Polynom3 => background::polynom3(
                x,
                arg(args, "coefficient0", 1.0),
                arg(args, "coefficient1", 1.0),
                arg(args, "coefficient2", 1.0),
                arg(args, "coefficient3", 1.0),
            ),
            ComponentKind::Erf => step::erf_step(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
            ),
            ComponentKind::Heaviside => {
                step::heaviside(x, arg(args, "amplitude", 1.0), arg(args, "center", 0.0))
            }
            ComponentKind::Atan => step::atan_step(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
            ),
            ComponentKind::Log => step::log_step(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "sigma", 1.0),
            ),
            ComponentKind::CGaussian => step::cgaussian(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhmg", 1.0),
            ),
            ComponentKind::CLorentzian => step::clorentzian(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhml", 1.0),
            ),
            ComponentKind::CVoigt => step::cvoigt(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "center", 0.0),
                arg(args, "fwhmv", 1.0),
                arg(args, "fwhml", 1.0),
            ),
            ComponentKind::MoessbauerSinglet => moessbauer::singlet(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "isomershift", 0.0),
                arg(args, "fwhml", 0.25),
                arg(args, "background", 0.0),
            ),
            ComponentKind::MoessbauerDoublet => moessbauer::doublet(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "isomershift", 0.0),
                arg(args, "fwhml", 0.25),
                arg(args, "quadrupolesplitting", 0.8),
                arg(args, "background", 0.0),
            ),
            ComponentKind::MoessbauerSextet => moessbauer::sextet(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "isomershift", 0.0),
                arg(args, "fwhml", 0.25),
                arg(args, "magneticfield", 33.0),
                arg(args, "quadrupolesplitting", 0.0),
                arg(args, "angle", moessbauer::POWDER_ANGLE_DEG),
                arg(args, "background", 0.0),
            ),
            ComponentKind::MoessbauerOctet => moessbauer::octet(
                x,
                arg(args, "amplitude", 1.0),
                arg(args, "isomershift", 0.0),
                arg(args, "fwhml", 0.25),
                arg(args, "magneticfield", 33.0),
                arg(args, "quadrupolesplitting", 0.0),
                arg(args, "angle", moessbauer::POWDER_ANGLE_DEG),
                arg(args, "efgvzz", 0.0),
                arg(args, "efgeta", 0.0),
                arg(args, "background", 0.0),
            ),
        };

        Ok(y)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = SpectraFitError;

    fn from_str(s: &str) -> Result<Self> {
        ComponentKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| SpectraFitError::UnsupportedComponent(s.to_string()))
    }
}

/// The shape families automatic peak detection can seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoShape {
    Gaussian,
    OrcaGaussian,
    Lorentzian,
    Voigt,
    PseudoVoigt,
}

impl AutoShape {
    /// The component kind this shape seeds.
    pub fn kind(&self) -> ComponentKind {
        match self {
            AutoShape::Gaussian => ComponentKind::Gaussian,
            AutoShape::OrcaGaussian => ComponentKind::OrcaGaussian,
            AutoShape::Lorentzian => ComponentKind::Lorentzian,
            AutoShape::Voigt => ComponentKind::Voigt,
            AutoShape::PseudoVoigt => ComponentKind::PseudoVoigt,
        }
    }

    /// The width-family parameter names seeded for this shape.
    pub fn width_parameters(&self) -> &'static [&'static str] {
        match self {
            AutoShape::Gaussian => &["fwhmg"],
            AutoShape::OrcaGaussian => &["width"],
            AutoShape::Lorentzian => &["fwhml"],
            AutoShape::Voigt => &["fwhmv"],
            AutoShape::PseudoVoigt => &["fwhmg", "fwhml"],
        }
    }
}

impl Default for AutoShape {
    fn default() -> Self {
        AutoShape::Gaussian
    }
}

impl FromStr for AutoShape {
    type Err = SpectraFitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" => Ok(AutoShape::Gaussian),
            "orcagaussian" => Ok(AutoShape::OrcaGaussian),
            "lorentzian" => Ok(AutoShape::Lorentzian),
            "voigt" => Ok(AutoShape::Voigt),
            "pseudovoigt" => Ok(AutoShape::PseudoVoigt),
            _ => Err(SpectraFitError::UnsupportedAutoShape(s.to_string())),
        }
    }
}

impl fmt::Display for AutoShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_kind_round_trip() {
        for kind in ComponentKind::ALL {
            let parsed: ComponentKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "dummy".parse::<ComponentKind>().unwrap_err();
        assert_eq!(format!("{}", err), "dummy is not supported!");
    }

    #[test]
    fn test_kind_names_have_no_underscores() {
        for kind in ComponentKind::ALL {
            assert!(!kind.as_str().contains('_'), "{}", kind);
            for name in kind.parameter_names() {
                assert!(!name.contains('_'), "{}.{}", kind, name);
            }
        }
    }

    #[test]
    fn test_evaluate_rejects_unknown_argument() {
        let x = Array1::linspace(-1.0, 1.0, 11);
        let mut args = ShapeArgs::new();
        args.insert("amplitude".to_string(), 1.0);
        args.insert("llama".to_string(), 2.0);

        let err = ComponentKind::Gaussian.evaluate(&x, &args).unwrap_err();
        assert!(format!("{}", err).contains("llama"));
    }

    #[test]
    fn test_evaluate_uses_defaults_for_missing_arguments() {
        let x = Array1::linspace(-5.0, 5.0, 101);
        let args = ShapeArgs::new();

        let y = ComponentKind::Gaussian.evaluate(&x, &args).unwrap();
        assert_eq!(y.len(), x.len());
        // Default center is 0, the maximum sits at the middle sample.
        let max_idx = y
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(max_idx, 50);
    }

    #[test]
    fn test_auto_shape_default_is_gaussian() {
        assert_eq!(AutoShape::default(), AutoShape::Gaussian);
    }

    #[test]
    fn test_auto_shape_rejects_non_seedable_kind() {
        let err = "constant".parse::<AutoShape>().unwrap_err();
        assert!(format!("{}", err).contains("not supported for auto detection"));
    }
}
