//! A single fit parameter: value, bounds, vary flag, optional expression.

use crate::parameters::bounds::{Bounds, BoundsError};
use crate::parameters::key::ParameterKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// np.allclose-style tolerances used for the post-fit annotations.
const CLOSE_RTOL: f64 = 1e-5;
const CLOSE_ATOL: f64 = 1e-8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    #[error("parameter '{name}' is expression-bound and cannot vary")]
    ExpressionAndVary { name: String },

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error("cannot evaluate expression for parameter '{name}': {message}")]
    ExpressionEvaluation { name: String, message: String },

    #[error("parameter '{name}' not found")]
    NotFound { name: String },

    #[error("circular dependency in expression for parameter '{name}'")]
    CircularDependency { name: String },

    #[error("expected {expected} values for varying parameters, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// One flat fit parameter.
///
/// A parameter either varies freely within its bounds, is held fixed, or is
/// bound to an expression over other parameters (in which case it never
/// varies on its own). The identity is a structured [`ParameterKey`]; the
/// flat string form appears only at the minimizer and serialization
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    key: ParameterKey,
    value: f64,
    init_value: f64,
    vary: bool,
    bounds: Bounds,
    expr: Option<String>,
    stderr: Option<f64>,
}

impl Parameter {
    /// A freely varying, unbounded parameter.
    pub fn new(key: ParameterKey, value: f64) -> Self {
        Self {
            key,
            value,
            init_value: value,
            vary: true,
            bounds: Bounds::default(),
            expr: None,
            stderr: None,
        }
    }

    /// A varying parameter constrained to `[min, max]`. The starting value
    /// is clamped into the box.
    pub fn with_bounds(
        key: ParameterKey,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max)?;
        let value = bounds.clamp(value);
        Ok(Self {
            key,
            value,
            init_value: value,
            vary: true,
            bounds,
            expr: None,
            stderr: None,
        })
    }

    /// A parameter whose value is computed from an expression over other
    /// parameters. Expression-bound parameters never vary.
    pub fn with_expr(key: ParameterKey, value: f64, expr: &str) -> Self {
        Self {
            key,
            value,
            init_value: value,
            vary: false,
            bounds: Bounds::default(),
            expr: Some(expr.to_string()),
            stderr: None,
        }
    }

    /// A parameter held fixed at `value`.
    pub fn fixed(key: ParameterKey, value: f64) -> Self {
        Self {
            key,
            value,
            init_value: value,
            vary: false,
            bounds: Bounds::default(),
            expr: None,
            stderr: None,
        }
    }

    pub fn key(&self) -> &ParameterKey {
        &self.key
    }

    /// Flat string form of the key.
    pub fn name(&self) -> String {
        self.key.name()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !self.bounds.contains(value) {
            return Err(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min(),
                max: self.bounds.max(),
            }
            .into());
        }
        self.value = value;
        Ok(())
    }

    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    /// Restore the starting value, clamped into the current bounds.
    pub fn reset(&mut self) {
        self.value = self.bounds.clamp(self.init_value);
    }

    pub fn vary(&self) -> bool {
        self.vary
    }

    pub fn set_vary(&mut self, vary: bool) -> Result<(), ParameterError> {
        if vary && self.expr.is_some() {
            return Err(ParameterError::ExpressionAndVary { name: self.name() });
        }
        self.vary = vary;
        Ok(())
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn min(&self) -> f64 {
        self.bounds.min()
    }

    pub fn max(&self) -> f64 {
        self.bounds.max()
    }

    /// Replace the bounds, clamping the current value into the new box.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        let bounds = Bounds::new(min, max)?;
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
        Ok(())
    }

    pub fn expr(&self) -> Option<&str> {
        self.expr.as_deref()
    }

    /// Attach or remove an expression. Attaching one stops the parameter
    /// from varying; removing one leaves the vary flag untouched.
    pub fn set_expr(&mut self, expr: Option<&str>) {
        match expr {
            Some(expr) => {
                self.expr = Some(expr.to_string());
                self.vary = false;
            }
            None => self.expr = None,
        }
    }

    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    pub fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }

    /// Internal (unbounded) coordinate of the current value.
    pub fn to_internal(&self) -> Result<f64, ParameterError> {
        self.bounds.to_internal(self.value).map_err(Into::into)
    }

    /// External value for an internal coordinate proposed by the solver.
    pub fn from_internal(&self, internal: f64) -> f64 {
        self.bounds.to_external(internal)
    }

    /// Chain-rule factor `d(external)/d(internal)` at the current value.
    pub fn gradient_scale(&self) -> Result<f64, ParameterError> {
        let internal = self.to_internal()?;
        Ok(self.bounds.scale_gradient(1.0, internal))
    }

    /// Whether the fitted value never moved away from its starting point.
    pub fn at_initial_value(&self) -> bool {
        close(self.value, self.init_value)
    }

    /// Whether the fitted value sits on one of its finite bounds.
    pub fn at_boundary(&self) -> bool {
        (self.bounds.has_lower() && close(self.value, self.bounds.min()))
            || (self.bounds.has_upper() && close(self.value, self.bounds.max()))
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= CLOSE_ATOL + CLOSE_RTOL * b.abs()
}
