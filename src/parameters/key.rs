//! Structured identity of a flat fit parameter.

use crate::error::{Result, SpectraFitError};
use crate::models::ComponentKind;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which component kind, which shape parameter, which peak, and (for global
/// fits) which spectrum column a flat parameter belongs to.
///
/// The canonical string form is `{kind}_{parameter}_{peak}` for local fits
/// and `{kind}_{parameter}_{peak}_{column}` for global fits. Kind and
/// parameter names never contain underscores, so the string form parses back
/// unambiguously; peak and column indices are 1-based. Internally the struct
/// is the identity; the string exists only at the minimizer and
/// serialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterKey {
    pub kind: ComponentKind,
    pub parameter: String,
    pub peak: usize,
    pub column: Option<usize>,
}

impl ParameterKey {
    /// A key for local fitting, without a column index.
    pub fn local(kind: ComponentKind, parameter: &str, peak: usize) -> Self {
        Self {
            kind,
            parameter: parameter.to_string(),
            peak,
            column: None,
        }
    }

    /// A key for global fitting, tagged with a 1-based spectrum column.
    pub fn global(kind: ComponentKind, parameter: &str, peak: usize, column: usize) -> Self {
        Self {
            kind,
            parameter: parameter.to_string(),
            peak,
            column: Some(column),
        }
    }

    /// The flat string form used by the minimizer boundary.
    pub fn name(&self) -> String {
        match self.column {
            Some(column) => format!("{}_{}_{}_{}", self.kind, self.parameter, self.peak, column),
            None => format!("{}_{}_{}", self.kind, self.parameter, self.peak),
        }
    }

    /// Parse a flat parameter name back into its structured form.
    ///
    /// An unknown component kind fails with the whole offending key in the
    /// message, so a misconfigured model is reported by the name the user
    /// wrote.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('_').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(SpectraFitError::InvalidParameter(format!(
                "'{}' is not of the form kind_parameter_peak[_column]",
                s
            )));
        }

        let kind = parts[0]
            .parse::<ComponentKind>()
            .map_err(|_| SpectraFitError::UnsupportedComponent(s.to_string()))?;

        let peak = parse_index(parts[2], s)?;
        let column = if parts.len() == 4 {
            Some(parse_index(parts[3], s)?)
        } else {
            None
        };

        Ok(Self {
            kind,
            parameter: parts[1].to_string(),
            peak,
            column,
        })
    }

    /// The regrouping key the dispatcher accumulates by: one component
    /// instance per `(kind, peak)` pair, per column in global mode.
    pub fn group(&self) -> (ComponentKind, usize, Option<usize>) {
        (self.kind, self.peak, self.column)
    }
}

fn parse_index(part: &str, whole: &str) -> Result<usize> {
    let index: usize = part.parse().map_err(|_| {
        SpectraFitError::InvalidParameter(format!("'{}' has a non-numeric index '{}'", whole, part))
    })?;
    if index == 0 {
        return Err(SpectraFitError::InvalidParameter(format!(
            "'{}' uses a zero index, indices start at 1",
            whole
        )));
    }
    Ok(index)
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ParameterKey {
    type Err = SpectraFitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ParameterKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for ParameterKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ParameterKey::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_local() {
        let key = ParameterKey::local(ComponentKind::Gaussian, "fwhmg", 2);
        assert_eq!(key.name(), "gaussian_fwhmg_2");
        assert_eq!(ParameterKey::parse("gaussian_fwhmg_2").unwrap(), key);
    }

    #[test]
    fn test_round_trip_global() {
        let key = ParameterKey::global(ComponentKind::PseudoVoigt, "amplitude", 1, 3);
        assert_eq!(key.name(), "pseudovoigt_amplitude_1_3");
        assert_eq!(ParameterKey::parse("pseudovoigt_amplitude_1_3").unwrap(), key);
    }

    #[test]
    fn test_unknown_kind_reports_whole_key() {
        let err = ParameterKey::parse("dummy_amplitude_1").unwrap_err();
        assert_eq!(format!("{}", err), "dummy_amplitude_1 is not supported!");
    }

    #[test]
    fn test_malformed_names_are_rejected() {
        assert!(ParameterKey::parse("gaussian_amplitude").is_err());
        assert!(ParameterKey::parse("gaussian_amplitude_one").is_err());
        assert!(ParameterKey::parse("gaussian_amplitude_0").is_err());
        assert!(ParameterKey::parse("gaussian_amplitude_1_2_3").is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let key = ParameterKey::local(ComponentKind::Lorentzian, "center", 1);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"lorentzian_center_1\"");

        let back: ParameterKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_group_distinguishes_columns() {
        let a = ParameterKey::global(ComponentKind::Gaussian, "amplitude", 1, 1);
        let b = ParameterKey::global(ComponentKind::Gaussian, "fwhmg", 1, 1);
        let c = ParameterKey::global(ComponentKind::Gaussian, "amplitude", 1, 2);

        assert_eq!(a.group(), b.group());
        assert_ne!(a.group(), c.group());
    }
}
