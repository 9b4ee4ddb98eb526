//! Box constraints and the MINUIT-style change of variables.
//!
//! The minimizer itself is unconstrained. Every bounded parameter is mapped
//! onto an unbounded internal coordinate before the solver sees it, and
//! mapped back whenever shape functions need the physical value:
//!
//! * lower bound only: `external = min - 1 + sqrt(internal^2 + 1)`
//! * upper bound only: `external = max + 1 - sqrt(internal^2 + 1)`
//! * both bounds: `external = min + (sin(internal) + 1) * (max - min) / 2`
//!
//! Gradients and covariances computed in internal coordinates are rescaled
//! back to physical units by the chain rule through the same mapping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoundsError {
    #[error("invalid bounds: min ({min}) must be strictly less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("value {value} is outside the bounds [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("non-finite parameter value is not allowed")]
    NonFiniteValue,
}

/// Lower and upper limits on a parameter value.
///
/// Infinite limits mean "unbounded on that side" and serialize as `null`.
/// `min < max` holds for every constructed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "BoundsRepr", try_from = "BoundsRepr")]
pub struct Bounds {
    min: f64,
    max: f64,
}

#[derive(Serialize, Deserialize)]
struct BoundsRepr {
    min: Option<f64>,
    max: Option<f64>,
}

impl From<Bounds> for BoundsRepr {
    fn from(bounds: Bounds) -> Self {
        Self {
            min: bounds.min.is_finite().then_some(bounds.min),
            max: bounds.max.is_finite().then_some(bounds.max),
        }
    }
}

impl TryFrom<BoundsRepr> for Bounds {
    type Error = BoundsError;

    fn try_from(repr: BoundsRepr) -> Result<Self, BoundsError> {
        Bounds::new(
            repr.min.unwrap_or(f64::NEG_INFINITY),
            repr.max.unwrap_or(f64::INFINITY),
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn min_only(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    pub fn max_only(max: f64) -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn has_lower(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper(&self) -> bool {
        self.max.is_finite()
    }

    pub fn is_bounded(&self) -> bool {
        self.has_lower() || self.has_upper()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Pull `value` inside the bounds without changing it otherwise.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Distance from `value` to the nearest finite limit.
    pub fn distance_to_edge(&self, value: f64) -> f64 {
        let lower = if self.has_lower() {
            (value - self.min).abs()
        } else {
            f64::INFINITY
        };
        let upper = if self.has_upper() {
            (self.max - value).abs()
        } else {
            f64::INFINITY
        };
        lower.min(upper)
    }

    /// Map an external (physical) value onto the unbounded internal axis.
    ///
    /// Fails when `external` is non-finite or lies outside the bounds, since
    /// the mapping is only defined on the box.
    pub fn to_internal(&self, external: f64) -> Result<f64, BoundsError> {
        if !external.is_finite() {
            return Err(BoundsError::NonFiniteValue);
        }
        if !self.contains(external) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external,
                min: self.min,
                max: self.max,
            });
        }

        let internal = match (self.has_lower(), self.has_upper()) {
            (false, false) => external,
            (true, false) => ((external - self.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((self.max - external + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let scaled = 2.0 * (external - self.min) / (self.max - self.min) - 1.0;
                // asin argument stays in [-1, 1]; the clamp guards round-off.
                scaled.clamp(-1.0, 1.0).asin()
            }
        };
        Ok(internal)
    }

    /// Map an internal coordinate back to the external (physical) value.
    pub fn to_external(&self, internal: f64) -> f64 {
        match (self.has_lower(), self.has_upper()) {
            (false, false) => internal,
            (true, false) => self.min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => self.max + 1.0 - (internal * internal + 1.0).sqrt(),
            (true, true) => self.min + (internal.sin() + 1.0) * (self.max - self.min) / 2.0,
        }
    }

    /// Chain-rule factor `d(external)/d(internal)` applied to a gradient,
    /// evaluated at the internal coordinate `internal`.
    pub fn scale_gradient(&self, gradient: f64, internal: f64) -> f64 {
        match (self.has_lower(), self.has_upper()) {
            (false, false) => gradient,
            (true, false) => gradient * internal / (internal * internal + 1.0).sqrt(),
            (false, true) => -gradient * internal / (internal * internal + 1.0).sqrt(),
            (true, true) => gradient * (self.max - self.min) * internal.cos() / 2.0,
        }
    }
}
