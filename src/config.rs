//! Fit configuration.
//!
//! [`FitSettings`] describes one fitting task: which table columns hold the
//! data, how the mode flags resolve, the nested peak configuration, and the
//! solver and minimizer options. Every type here is serde-enabled so an
//! external loader can hand a parsed configuration file straight in. A
//! settings value is never mutated once a fit starts.

use crate::detection::AutoPeak;
use crate::error::{Result, SpectraFitError};
use crate::models::AutoShape;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One user-supplied parameter descriptor from the nested peak configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterHint {
    /// Starting value.
    pub value: f64,

    /// Lower bound. Default: unbounded.
    #[serde(default)]
    pub min: Option<f64>,

    /// Upper bound. Default: unbounded.
    #[serde(default)]
    pub max: Option<f64>,

    /// Whether the optimizer may vary this parameter. Default: true
    #[serde(default = "default_vary")]
    pub vary: bool,

    /// Constraint expression tying this parameter to others. A hint with an
    /// expression is never varied independently.
    #[serde(default)]
    pub expr: Option<String>,
}

fn default_vary() -> bool {
    true
}

impl ParameterHint {
    /// A freely varying, unbounded hint starting at `value`.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            min: None,
            max: None,
            vary: true,
            expr: None,
        }
    }

    /// Set the lower bound.
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set the upper bound.
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Set both bounds.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Fix the parameter at its starting value.
    pub fn fixed(mut self) -> Self {
        self.vary = false;
        self
    }

    /// Tie the parameter to a constraint expression.
    pub fn with_expr(mut self, expr: impl Into<String>) -> Self {
        self.expr = Some(expr.into());
        self
    }
}

/// Parameter hints for one component: parameter name to hint.
pub type ComponentConfig = IndexMap<String, ParameterHint>;

/// Components attached to one peak index, keyed by kind name.
///
/// Kind names stay plain strings here; they are validated when the nested
/// configuration is flattened into parameter keys, so an unknown kind is
/// reported with the full flattened name it would have produced.
pub type PeakConfig = IndexMap<String, ComponentConfig>;

/// The nested peak configuration: peak index to components.
pub type PeaksConfig = IndexMap<usize, PeakConfig>;

/// Pre-specified global configuration: spectrum column to peaks.
pub type ColumnPeaksConfig = IndexMap<usize, PeaksConfig>;

/// The four mutually exclusive fitting modes.
///
/// Resolved once from the raw configuration flags; the illegal combination
/// of global fitting with automatic peak detection cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// One spectrum, peaks taken from the configuration.
    LocalManual,

    /// One spectrum, peaks seeded by automatic detection.
    LocalAuto,

    /// Several spectra sharing shape parameters, with one independent
    /// amplitude per spectrum.
    GlobalStandard,

    /// Several spectra with a fully independent parameter set per spectrum.
    GlobalPrespecified,
}

impl FitMode {
    /// Resolve the mode from the raw configuration flags.
    ///
    /// `global_fitting` is 0 (local), 1 (standard global) or 2 (pre-specified
    /// global). Automatic peak detection combines with local fitting only.
    pub fn resolve(global_fitting: u8, autopeak: bool) -> Result<Self> {
        match (global_fitting, autopeak) {
            (0, false) => Ok(FitMode::LocalManual),
            (0, true) => Ok(FitMode::LocalAuto),
            (1 | 2, true) => Err(SpectraFitError::GlobalWithAutopeak),
            (1, false) => Ok(FitMode::GlobalStandard),
            (2, false) => Ok(FitMode::GlobalPrespecified),
            (n, _) => Err(SpectraFitError::InvalidInput(format!(
                "global_fitting must be 0, 1 or 2, got {}",
                n
            ))),
        }
    }

    /// Whether this mode fits several spectra at once.
    pub fn is_global(&self) -> bool {
        matches!(self, FitMode::GlobalStandard | FitMode::GlobalPrespecified)
    }

    /// Short name used in log records and fit reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::LocalManual => "local",
            FitMode::LocalAuto => "local-auto",
            FitMode::GlobalStandard => "global",
            FitMode::GlobalPrespecified => "global-prespecified",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FitMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// How non-finite values in the residual vector are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NanPolicy {
    /// Fail the fit on the first non-finite residual.
    Raise,

    /// Leave non-finite values in place and let the cost carry them.
    Propagate,

    /// Drop non-finite entries from the residual vector.
    Omit,
}

impl Default for NanPolicy {
    fn default() -> Self {
        NanPolicy::Raise
    }
}

/// Options controlling the solver around the minimizer itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Treatment of non-finite residual values. Default: raise
    pub nan_policy: NanPolicy,

    /// Whether to compute the covariance matrix and standard errors.
    /// Default: true
    pub calc_covar: bool,

    /// Sigma levels at which confidence intervals are requested.
    /// Default: none
    pub confidence: Option<Vec<f64>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            nan_policy: NanPolicy::Raise,
            calc_covar: true,
            confidence: None,
        }
    }
}

impl SolverOptions {
    /// Set the NaN policy.
    pub fn with_nan_policy(mut self, nan_policy: NanPolicy) -> Self {
        self.nan_policy = nan_policy;
        self
    }

    /// Enable or disable covariance computation.
    pub fn with_calc_covar(mut self, calc_covar: bool) -> Self {
        self.calc_covar = calc_covar;
        self
    }

    /// Request confidence intervals at the given sigma levels.
    pub fn with_confidence(mut self, sigmas: Vec<f64>) -> Self {
        self.confidence = Some(sigmas);
        self
    }
}

/// Options for the Levenberg-Marquardt minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    /// Maximum number of accepted iterations. Default: 100
    pub max_iterations: usize,

    /// Maximum number of residual evaluations. Default: `2000 * (nvarys + 1)`
    pub max_nfev: Option<usize>,

    /// Tolerance for the relative change in cost. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for the largest parameter step. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for the gradient norm. Default: 1e-8
    pub gtol: f64,

    /// Initial value of the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor applied to lambda after a rejected step. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor applied to lambda after an accepted step. Default: 0.1
    pub lambda_down_factor: f64,

    /// Smallest allowed damping. Default: 1e-10
    pub min_lambda: f64,

    /// Largest allowed damping. Default: 1e10
    pub max_lambda: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_nfev: None,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
        }
    }
}

impl OptimizerOptions {
    /// Residual-evaluation budget for `nvarys` varying parameters.
    pub fn nfev_budget(&self, nvarys: usize) -> usize {
        self.max_nfev.unwrap_or(2000 * (nvarys + 1))
    }

    /// Set the maximum number of accepted iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the maximum number of residual evaluations.
    pub fn with_max_nfev(mut self, max_nfev: usize) -> Self {
        self.max_nfev = Some(max_nfev);
        self
    }

    /// Set the tolerance for the relative change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    /// Set the tolerance for the largest parameter step.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Set the tolerance for the gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Set the initial damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    /// Set the factor applied to lambda after a rejected step.
    pub fn with_lambda_up_factor(mut self, factor: f64) -> Self {
        self.lambda_up_factor = factor;
        self
    }

    /// Set the factor applied to lambda after an accepted step.
    pub fn with_lambda_down_factor(mut self, factor: f64) -> Self {
        self.lambda_down_factor = factor;
        self
    }
}

/// Immutable description of one fitting task.
///
/// Construct programmatically with the `with_*` builders or deserialize from
/// a configuration file. The x column comes first in `columns`, followed by
/// one intensity column per spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Column names: x first, then one intensity column per spectrum.
    /// Default: `["energy", "intensity"]`
    pub columns: Vec<String>,

    /// Global fitting switch: 0 local, 1 standard global, 2 pre-specified
    /// global. Default: 0
    pub global_fitting: u8,

    /// Automatic peak detection switch or explicit detection overrides.
    /// Default: off
    pub autopeak: AutoPeak,

    /// Shape family seeded for automatically detected peaks.
    /// Default: gaussian
    pub auto_shape: AutoShape,

    /// Nested peak configuration for the manual modes.
    pub peaks: PeaksConfig,

    /// Per-spectrum peak configuration for pre-specified global fitting.
    pub column_peaks: ColumnPeaksConfig,

    /// Solver options.
    pub solver: SolverOptions,

    /// Minimizer options.
    pub optimizer: OptimizerOptions,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            columns: vec!["energy".to_string(), "intensity".to_string()],
            global_fitting: 0,
            autopeak: AutoPeak::default(),
            auto_shape: AutoShape::default(),
            peaks: PeaksConfig::default(),
            column_peaks: ColumnPeaksConfig::default(),
            solver: SolverOptions::default(),
            optimizer: OptimizerOptions::default(),
        }
    }
}

impl FitSettings {
    /// Settings with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the fitting mode from the configured flags.
    pub fn mode(&self) -> Result<FitMode> {
        FitMode::resolve(self.global_fitting, self.autopeak.is_active())
    }

    /// The x column name.
    pub fn x_column(&self) -> Result<&str> {
        self.check_columns()?;
        Ok(&self.columns[0])
    }

    /// The intensity column names, one per spectrum.
    pub fn intensity_columns(&self) -> Result<&[String]> {
        self.check_columns()?;
        Ok(&self.columns[1..])
    }

    fn check_columns(&self) -> Result<()> {
        if self.columns.len() < 2 {
            return Err(SpectraFitError::InvalidInput(
                "columns must name the x column and at least one intensity column".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the column names, x first.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the global fitting switch.
    pub fn with_global_fitting(mut self, global_fitting: u8) -> Self {
        self.global_fitting = global_fitting;
        self
    }

    /// Set the automatic peak detection configuration.
    pub fn with_autopeak(mut self, autopeak: AutoPeak) -> Self {
        self.autopeak = autopeak;
        self
    }

    /// Set the shape family seeded for detected peaks.
    pub fn with_auto_shape(mut self, auto_shape: AutoShape) -> Self {
        self.auto_shape = auto_shape;
        self
    }

    /// Add one parameter hint to the nested peak configuration.
    pub fn with_peak(
        mut self,
        peak: usize,
        kind: impl Into<String>,
        parameter: impl Into<String>,
        hint: ParameterHint,
    ) -> Self {
        self.peaks
            .entry(peak)
            .or_default()
            .entry(kind.into())
            .or_default()
            .insert(parameter.into(), hint);
        self
    }

    /// Add one parameter hint to the pre-specified global configuration.
    pub fn with_column_peak(
        mut self,
        column: usize,
        peak: usize,
        kind: impl Into<String>,
        parameter: impl Into<String>,
        hint: ParameterHint,
    ) -> Self {
        self.column_peaks
            .entry(column)
            .or_default()
            .entry(peak)
            .or_default()
            .entry(kind.into())
            .or_default()
            .insert(parameter.into(), hint);
        self
    }

    /// Set the solver options.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Set the minimizer options.
    pub fn with_optimizer(mut self, optimizer: OptimizerOptions) -> Self {
        self.optimizer = optimizer;
        self
    }
}
