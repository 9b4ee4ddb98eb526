//! Automatic peak detection.
//!
//! Derives peak-search arguments from raw data statistics and delegates to
//! the [`find_peaks`] primitive. Every argument the user does not override
//! explicitly is filled from the data, so `autopeak = true` alone yields a
//! usable candidate set on well-behaved spectra.

pub mod find_peaks;

pub use find_peaks::{find_peaks, FindPeaksArgs, Interval, PeakCandidates};

use crate::error::{Result, SpectraFitError};
use indexmap::IndexMap;
use log::{debug, warn};
use ndarray::Array1;
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};

/// Keywords accepted as explicit detection overrides.
pub const SUPPORTED_KEYS: [&str; 8] = [
    "height",
    "threshold",
    "distance",
    "prominence",
    "width",
    "wlen",
    "rel_height",
    "plateau_size",
];

/// One override value: a scalar lower limit or an explicit `[min, max]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Limit {
    Scalar(f64),
    Pair(f64, f64),
}

impl Limit {
    fn interval(&self) -> Interval {
        match *self {
            Limit::Scalar(min) => Interval::at_least(min),
            Limit::Pair(min, max) => Interval::new(min, max),
        }
    }

    fn scalar(&self, key: &str) -> Result<f64> {
        match *self {
            Limit::Scalar(v) => Ok(v),
            Limit::Pair(..) => Err(SpectraFitError::InvalidInput(format!(
                "'{}' takes a single number, not a range",
                key
            ))),
        }
    }
}

/// The `autopeak` configuration value: a plain switch or explicit overrides
/// for the derived detection arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoPeak {
    Enabled(bool),
    Overrides(IndexMap<String, Limit>),
}

impl AutoPeak {
    /// Whether automatic detection is requested at all.
    pub fn is_active(&self) -> bool {
        match self {
            AutoPeak::Enabled(enabled) => *enabled,
            AutoPeak::Overrides(_) => true,
        }
    }
}

impl Default for AutoPeak {
    fn default() -> Self {
        AutoPeak::Enabled(false)
    }
}

/// Detect candidate peaks in `(x, y)` using derived defaults merged with the
/// user's overrides.
pub fn detect(x: &Array1<f64>, y: &Array1<f64>, autopeak: &AutoPeak) -> Result<PeakCandidates> {
    if x.len() != y.len() {
        return Err(SpectraFitError::DimensionMismatch(format!(
            "x has {} samples, y has {}",
            x.len(),
            y.len()
        )));
    }
    if !autopeak.is_active() {
        return Err(SpectraFitError::InvalidInput(
            "peak detection invoked with autopeak disabled".to_string(),
        ));
    }

    let mut args = derive_args(x, y)?;
    if let AutoPeak::Overrides(overrides) = autopeak {
        apply_overrides(&mut args, overrides)?;
    }

    let candidates = find_peaks(y, &args)?;
    debug!(
        "peak detection found {} candidate(s) in {} samples",
        candidates.positions.len(),
        y.len()
    );

    Ok(candidates)
}

/// Derive the full peak-search argument set from data statistics.
///
/// - height range: `(1 - mean(y) / std(y), max(y))`
/// - threshold range: `(min(y), max(y))`
/// - minimum peak distance: `max(min(diff(x)), 1.0)`
/// - prominence range: `(harmonic mean of y if computable else mean, max(y))`
/// - width range: `(min(diff(x)), |x[argmax(y)] - x[argmin(y)]| / 2)`
/// - relative height: `max(0, (harmonic-or-arithmetic mean - min(y)) / 4)`
/// - window length: `len(y) / 100`, floored to just above 1
/// - plateau size range: `(0, max(x))`
pub fn derive_args(x: &Array1<f64>, y: &Array1<f64>) -> Result<FindPeaksArgs> {
    if y.len() < 3 {
        return Err(SpectraFitError::InvalidInput(
            "peak detection needs at least 3 samples".to_string(),
        ));
    }

    let y_max = *y
        .max()
        .map_err(|e| SpectraFitError::InvalidInput(format!("no maximum in y: {}", e)))?;
    let y_min = *y
        .min()
        .map_err(|e| SpectraFitError::InvalidInput(format!("no minimum in y: {}", e)))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let y_std = y.std(0.0);

    let mut min_dx = f64::INFINITY;
    for i in 1..x.len() {
        min_dx = min_dx.min((x[i] - x[i - 1]).abs());
    }

    let central = harmonic_mean(y).unwrap_or_else(|| {
        warn!("harmonic mean undefined for non-positive data, using arithmetic mean");
        y_mean
    });

    let argmax = y
        .argmax()
        .map_err(|e| SpectraFitError::InvalidInput(format!("no maximum in y: {}", e)))?;
    let argmin = y
        .argmin()
        .map_err(|e| SpectraFitError::InvalidInput(format!("no minimum in y: {}", e)))?;
    let x_max = *x
        .max()
        .map_err(|e| SpectraFitError::InvalidInput(format!("no maximum in x: {}", e)))?;

    Ok(FindPeaksArgs {
        height: Some(Interval::new(1.0 - y_mean / y_std, y_max)),
        threshold: Some(Interval::new(y_min, y_max)),
        distance: Some(min_dx.max(1.0)),
        prominence: Some(Interval::new(central, y_max)),
        width: Some(Interval::new(min_dx, (x[argmax] - x[argmin]).abs() / 2.0)),
        wlen: Some((y.len() as f64 / 100.0).max(1.0 + f64::EPSILON)),
        rel_height: Some(((central - y_min) / 4.0).max(0.0)),
        plateau_size: Some(Interval::new(0.0, x_max)),
    })
}

/// Merge explicit overrides into derived arguments, rejecting unknown keys.
fn apply_overrides(args: &mut FindPeaksArgs, overrides: &IndexMap<String, Limit>) -> Result<()> {
    for (key, limit) in overrides {
        match key.as_str() {
            "height" => args.height = Some(limit.interval()),
            "threshold" => args.threshold = Some(limit.interval()),
            "distance" => args.distance = Some(limit.scalar(key)?),
            "prominence" => args.prominence = Some(limit.interval()),
            "width" => args.width = Some(limit.interval()),
            "wlen" => args.wlen = Some(limit.scalar(key)?),
            "rel_height" => args.rel_height = Some(limit.scalar(key)?),
            "plateau_size" => args.plateau_size = Some(limit.interval()),
            _ => return Err(SpectraFitError::UnsupportedDetectionKey(key.clone())),
        }
    }
    Ok(())
}

/// Harmonic mean of strictly positive data; `None` otherwise.
fn harmonic_mean(y: &Array1<f64>) -> Option<f64> {
    if y.iter().any(|&v| v <= 0.0) {
        return None;
    }
    let reciprocal_sum: f64 = y.iter().map(|&v| 1.0 / v).sum();
    Some(y.len() as f64 / reciprocal_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gaussian_bumps() -> (Array1<f64>, Array1<f64>) {
        // The tails underflow to exactly zero, which sends the harmonic
        // mean into its arithmetic fallback.
        let x = Array1::linspace(0.0, 20.0, 401);
        let y = x.mapv(|xv: f64| {
            let a = (-(xv - 6.0) * (xv - 6.0) / 0.02).exp();
            let b = (-(xv - 10.0) * (xv - 10.0) / 0.02).exp();
            2.0 * a + 3.0 * b
        });
        (x, y)
    }

    #[test]
    fn test_detect_finds_both_bumps() {
        let (x, y) = gaussian_bumps();
        let found = detect(&x, &y, &AutoPeak::Enabled(true)).unwrap();

        assert_eq!(found.positions.len(), 2);
        // True centers sit at x = 6.0 and x = 10.0, i.e. samples 120 and 200.
        assert!((found.positions[0] as i64 - 120).abs() <= 1);
        assert!((found.positions[1] as i64 - 200).abs() <= 1);

        let heights = found.property("peak_heights").unwrap();
        assert_relative_eq!(heights[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(heights[1], 3.0, epsilon = 1e-6);
        assert!(found.property("widths").unwrap().iter().all(|&w| w > 0.0));
    }

    #[test]
    fn test_detect_rejects_unknown_keyword() {
        let (x, y) = gaussian_bumps();
        let mut overrides = IndexMap::new();
        overrides.insert("sharpness".to_string(), Limit::Scalar(1.0));

        let err = detect(&x, &y, &AutoPeak::Overrides(overrides)).unwrap_err();
        assert!(matches!(err, SpectraFitError::UnsupportedDetectionKey(_)));
        assert!(format!("{}", err).contains("sharpness"));
    }

    #[test]
    fn test_detect_honors_height_override() {
        let (x, y) = gaussian_bumps();
        let mut overrides = IndexMap::new();
        // Only the taller bump clears 2.5.
        overrides.insert("height".to_string(), Limit::Pair(2.5, 10.0));

        let found = detect(&x, &y, &AutoPeak::Overrides(overrides)).unwrap();
        assert_eq!(found.positions.len(), 1);
        assert!((found.positions[0] as i64 - 200).abs() <= 1);
    }

    #[test]
    fn test_detect_with_disabled_switch_is_an_error() {
        let (x, y) = gaussian_bumps();
        assert!(detect(&x, &y, &AutoPeak::Enabled(false)).is_err());
    }

    #[test]
    fn test_harmonic_mean_fallback() {
        let positive = Array1::from_vec(vec![1.0, 2.0, 4.0]);
        let h = harmonic_mean(&positive).unwrap();
        assert_relative_eq!(h, 3.0 / (1.0 + 0.5 + 0.25));

        let mixed = Array1::from_vec(vec![1.0, 0.0, 4.0]);
        assert!(harmonic_mean(&mixed).is_none());
    }

    #[test]
    fn test_autopeak_deserializes_bool_and_map() {
        let enabled: AutoPeak = serde_json::from_str("true").unwrap();
        assert!(enabled.is_active());

        let overrides: AutoPeak =
            serde_json::from_str(r#"{"height": [0.5, 4.0], "distance": 3.0}"#).unwrap();
        assert!(overrides.is_active());
        match overrides {
            AutoPeak::Overrides(map) => {
                assert_eq!(map["height"], Limit::Pair(0.5, 4.0));
                assert_eq!(map["distance"], Limit::Scalar(3.0));
            }
            _ => panic!("expected overrides"),
        }

        // Neither bool nor map is a deserialization error.
        assert!(serde_json::from_str::<AutoPeak>("\"yes\"").is_err());
    }
}
