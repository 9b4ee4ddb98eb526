//! The fitting pipeline.
//!
//! [`Solver::fit`] assembles the flat parameter set from the settings,
//! regroups it into per-component keyword arguments for model evaluation,
//! runs the Levenberg-Marquardt minimizer over the stacked residuals and
//! derives statistics, uncertainties and annotations from the solution.

pub mod lm;
pub mod statistics;

pub use lm::{LevenbergMarquardt, Minimization, ResidualProblem};
pub use statistics::{
    annotate, confidence_intervals, correlation, covariance, fit_statistics, standard_errors,
    ConfidenceInterval, FitStatistics, ParameterAnnotation,
};

use crate::assembly::assemble;
use crate::config::{FitMode, FitSettings, NanPolicy};
use crate::data::SpectraTable;
use crate::detection::PeakCandidates;
use crate::error::{Result, SpectraFitError};
use crate::models::{ComponentKind, ShapeArgs};
use crate::parameters::{ParameterKey, Parameters};
use indexmap::IndexMap;
use log::debug;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::fmt;

/// Regroup the flat parameter set into per-component keyword arguments.
///
/// Parameters addressed to a different column are skipped; column-free
/// parameters apply everywhere. Components keep the insertion order of
/// their first parameter.
pub fn group_components(
    params: &Parameters,
    column: Option<usize>,
) -> IndexMap<(ComponentKind, usize), ShapeArgs> {
    let mut groups: IndexMap<(ComponentKind, usize), ShapeArgs> = IndexMap::new();
    for (key, param) in params.iter() {
        if key.column.is_some() && key.column != column {
            continue;
        }
        groups
            .entry((key.kind, key.peak))
            .or_default()
            .insert(key.parameter.clone(), param.value());
    }
    groups
}

/// Evaluate the sum of all components addressed to the given column.
pub fn build_model(
    params: &Parameters,
    x: &Array1<f64>,
    column: Option<usize>,
) -> Result<Array1<f64>> {
    let mut model = Array1::zeros(x.len());
    for ((kind, _peak), args) in group_components(params, column) {
        model += &kind.evaluate(x, &args)?;
    }
    Ok(model)
}

/// Residual evaluation over one or more spectra sharing the x column.
struct FitProblem<'a> {
    params: Parameters,
    x: &'a Array1<f64>,
    /// Intensity spectra with the column index used for parameter lookup.
    spectra: Vec<(Option<usize>, &'a Array1<f64>)>,
    nan_policy: NanPolicy,
}

impl FitProblem<'_> {
    /// Model-minus-data residuals, spectrum-major order.
    fn model_residuals(&self) -> Result<Array1<f64>> {
        let mut residuals = Vec::with_capacity(self.x.len() * self.spectra.len());
        for (column, data) in &self.spectra {
            if data.len() != self.x.len() {
                return Err(SpectraFitError::DimensionMismatch(format!(
                    "spectrum of length {} does not match the x column of length {}",
                    data.len(),
                    self.x.len()
                )));
            }
            let model = build_model(&self.params, self.x, *column)?;
            residuals.extend(model.iter().zip(data.iter()).map(|(m, d)| m - d));
        }
        apply_nan_policy(residuals, self.nan_policy)
    }
}

impl ResidualProblem for FitProblem<'_> {
    fn residuals(&mut self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        self.params.update_from_internal(slice_of(internal)?)?;
        self.model_residuals()
    }
}

fn slice_of(values: &Array1<f64>) -> Result<&[f64]> {
    values.as_slice().ok_or_else(|| {
        SpectraFitError::InvalidInput("parameter vector is not contiguous".to_string())
    })
}

fn apply_nan_policy(residuals: Vec<f64>, policy: NanPolicy) -> Result<Array1<f64>> {
    match policy {
        NanPolicy::Raise => {
            if residuals.iter().any(|r| !r.is_finite()) {
                return Err(SpectraFitError::MinimizationFailure(
                    "the residual vector contains a non-finite value; check the data or relax \
                     nan_policy"
                        .to_string(),
                ));
            }
            Ok(Array1::from(residuals))
        }
        NanPolicy::Propagate => Ok(Array1::from(residuals)),
        NanPolicy::Omit => Ok(Array1::from_iter(
            residuals.into_iter().filter(|r| r.is_finite()),
        )),
    }
}

/// Everything the minimizer and the statistics stage produced.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Which criterion ended the run, verbatim from the minimizer.
    pub message: String,

    /// Whether a convergence criterion was met.
    pub success: bool,

    /// Accepted iterations.
    pub iterations: usize,

    /// Residual evaluations, finite differences included.
    pub nfev: usize,

    /// Residuals at the solution, spectrum-major order.
    pub residuals: Array1<f64>,

    /// Goodness-of-fit summary.
    pub statistics: FitStatistics,

    /// Keys of the varying parameters, in covariance row order.
    pub varying: Vec<ParameterKey>,

    /// Covariance of the varying parameters in external coordinates.
    pub covar: Option<Array2<f64>>,

    /// Pairwise correlations, ordered like `covar`.
    pub correlations: Option<Array2<f64>>,

    /// Requested sigma intervals per varying parameter.
    pub confidence: IndexMap<ParameterKey, Vec<ConfidenceInterval>>,

    /// Parameters that ended the fit in a suspicious spot.
    pub annotations: IndexMap<ParameterKey, Vec<ParameterAnnotation>>,

    /// Human-readable warnings gathered during the run.
    pub warnings: Vec<String>,
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.success {
            "converged"
        } else {
            "did not converge"
        };
        writeln!(f, "Fit {}: {}", verdict, self.message)?;
        writeln!(f, "  iterations: {}", self.iterations)?;
        writeln!(f, "  nfev:       {}", self.nfev)?;
        writeln!(f, "  ndata:      {}", self.statistics.ndata)?;
        writeln!(f, "  nvarys:     {}", self.statistics.nvarys)?;
        writeln!(f, "  chisqr:     {:.6e}", self.statistics.chisqr)?;
        writeln!(f, "  redchi:     {:.6e}", self.statistics.redchi)?;
        writeln!(f, "  aic:        {:.6e}", self.statistics.aic)?;
        writeln!(f, "  bic:        {:.6e}", self.statistics.bic)?;
        for warning in &self.warnings {
            writeln!(f, "  warning:    {}", warning)?;
        }
        Ok(())
    }
}

/// Snapshot taken before the minimizer ran, for reproducing the fit.
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    /// Mode the settings resolved to.
    pub mode: FitMode,

    /// Parameter set exactly as assembled, before optimization.
    pub initial_parameters: Parameters,

    /// Peak detection output when auto seeding was used.
    pub detection: Option<PeakCandidates>,
}

/// A fitted parameter set together with its result and provenance.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Parameters at the solution, expressions re-evaluated.
    pub parameters: Parameters,

    /// Minimizer outcome and statistics.
    pub result: FitResult,

    /// Snapshot for reproducing the run.
    pub report: FitReport,
}

/// One-shot fitting front end over a spectra table.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    settings: FitSettings,
}

impl Solver {
    /// A solver with the given settings.
    pub fn new(settings: FitSettings) -> Self {
        Self { settings }
    }

    /// The settings this solver fits with.
    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    /// Assemble parameters from the settings, fit them against `table` and
    /// derive statistics from the solution.
    ///
    /// Local modes fit the first intensity column; global modes stack the
    /// residuals of every intensity column into one vector.
    pub fn fit(&self, table: &SpectraTable) -> Result<FitOutcome> {
        let mode = self.settings.mode()?;
        let x = table.column(self.settings.x_column()?)?;
        let intensity_columns = self.settings.intensity_columns()?;

        let assembly = assemble(&self.settings, table)?;
        let initial_parameters = assembly.parameters.clone();

        let mut spectra = Vec::new();
        if mode.is_global() {
            for (index, name) in intensity_columns.iter().enumerate() {
                spectra.push((Some(index + 1), table.column(name)?));
            }
        } else {
            spectra.push((None, table.column(&intensity_columns[0])?));
        }

        let mut problem = FitProblem {
            params: assembly.parameters,
            x,
            spectra,
            nan_policy: self.settings.solver.nan_policy,
        };

        let varying = problem.params.varying_keys();
        if varying.is_empty() {
            return Err(SpectraFitError::InvalidInput(
                "no varying parameters to fit".to_string(),
            ));
        }
        let initial_internal = Array1::from(problem.params.varying_internal()?);

        debug!(
            "fitting {} varying parameters ({} total) in {} mode",
            varying.len(),
            problem.params.len(),
            mode
        );

        let minimizer = LevenbergMarquardt::new(self.settings.optimizer.clone());
        let minimization = minimizer.minimize(&mut problem, initial_internal)?;

        // Finite differencing leaves the parameter set at the last probe
        // point; re-apply the solution before reading values off it.
        problem
            .params
            .update_from_internal(slice_of(&minimization.internal)?)?;
        let mut params = problem.params;

        let statistics = fit_statistics(&minimization.residuals, varying.len());
        let mut warnings = Vec::new();

        let mut covar = None;
        let mut correlations = None;
        if self.settings.solver.calc_covar {
            let scale = gradient_scales(&params, &varying)?;
            match covariance(&minimization.jacobian, statistics.redchi, &scale) {
                Some(matrix) => {
                    let stderr = standard_errors(&matrix);
                    for (i, key) in varying.iter().enumerate() {
                        if let Some(param) = params.get_mut(key) {
                            param.set_stderr(Some(stderr[i]));
                        }
                    }
                    correlations = Some(correlation(&matrix));
                    covar = Some(matrix);
                }
                None => warnings.push(
                    "covariance estimation failed; standard errors are unavailable".to_string(),
                ),
            }
        }

        let annotations = annotate(&params);
        for (key, flags) in &annotations {
            for flag in flags {
                match flag {
                    ParameterAnnotation::AtInitialValue => {
                        warnings.push(format!("{} did not move from its starting value", key));
                    }
                    ParameterAnnotation::AtBoundary => {
                        warnings.push(format!("{} sits on a bound", key));
                    }
                }
            }
        }

        let mut confidence = IndexMap::new();
        if let Some(sigmas) = &self.settings.solver.confidence {
            for key in &varying {
                if let Some(param) = params.get(key) {
                    confidence.insert(
                        key.clone(),
                        confidence_intervals(param.value(), param.stderr(), sigmas),
                    );
                }
            }
        }

        debug!(
            "fit finished after {} iterations: {}",
            minimization.iterations, minimization.message
        );

        let result = FitResult {
            message: minimization.message,
            success: minimization.success,
            iterations: minimization.iterations,
            nfev: minimization.nfev,
            residuals: minimization.residuals,
            statistics,
            varying,
            covar,
            correlations,
            confidence,
            annotations,
            warnings,
        };
        let report = FitReport {
            mode,
            initial_parameters,
            detection: assembly.detection,
        };

        Ok(FitOutcome {
            parameters: params,
            result,
            report,
        })
    }
}

fn gradient_scales(params: &Parameters, varying: &[ParameterKey]) -> Result<Array1<f64>> {
    let mut scales = Vec::with_capacity(varying.len());
    for key in varying {
        let param = params
            .get(key)
            .ok_or_else(|| SpectraFitError::ParameterNotFound(key.name()))?;
        scales.push(param.gradient_scale()?);
    }
    Ok(Array1::from(scales))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Parameter;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn constant_key(peak: usize) -> ParameterKey {
        ParameterKey::local(ComponentKind::Constant, "amplitude", peak)
    }

    #[test]
    fn test_group_components_splits_by_kind_and_peak() {
        let mut params = Parameters::new();
        let g1 = ParameterKey::local(ComponentKind::Gaussian, "amplitude", 1);
        let g1c = ParameterKey::local(ComponentKind::Gaussian, "center", 1);
        let l2 = ParameterKey::local(ComponentKind::Lorentzian, "amplitude", 2);
        params.add(Parameter::new(g1, 5.0)).unwrap();
        params.add(Parameter::new(g1c, 1.0)).unwrap();
        params.add(Parameter::new(l2, 3.0)).unwrap();

        let groups = group_components(&params, None);
        assert_eq!(groups.len(), 2);

        let gaussian = &groups[&(ComponentKind::Gaussian, 1)];
        assert_eq!(gaussian.len(), 2);
        assert_relative_eq!(gaussian["amplitude"], 5.0);
        assert_relative_eq!(gaussian["center"], 1.0);

        let lorentzian = &groups[&(ComponentKind::Lorentzian, 2)];
        assert_relative_eq!(lorentzian["amplitude"], 3.0);
    }

    #[test]
    fn test_group_components_filters_by_column() {
        let mut params = Parameters::new();
        let col1 = ParameterKey::global(ComponentKind::Gaussian, "amplitude", 1, 1);
        let col2 = ParameterKey::global(ComponentKind::Gaussian, "amplitude", 1, 2);
        params.add(Parameter::new(col1, 1.0)).unwrap();
        params.add(Parameter::new(col2, 2.0)).unwrap();

        let groups = group_components(&params, Some(2));
        assert_eq!(groups.len(), 1);
        assert_relative_eq!(groups[&(ComponentKind::Gaussian, 1)]["amplitude"], 2.0);

        // Column-free parameters apply to every column.
        let mut mixed = Parameters::new();
        mixed.add(Parameter::new(constant_key(1), 7.0)).unwrap();
        let groups = group_components(&mixed, Some(3));
        assert_relative_eq!(groups[&(ComponentKind::Constant, 1)]["amplitude"], 7.0);
    }

    #[test]
    fn test_build_model_sums_components() {
        let mut params = Parameters::new();
        params.add(Parameter::new(constant_key(1), 2.0)).unwrap();
        params.add(Parameter::new(constant_key(2), 3.0)).unwrap();

        let x = array![0.0, 1.0, 2.0];
        let model = build_model(&params, &x, None).unwrap();
        for value in model.iter() {
            assert_relative_eq!(*value, 5.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_nan_policy_raise_rejects_non_finite() {
        let residuals = vec![1.0, f64::NAN, 2.0];
        assert!(apply_nan_policy(residuals, NanPolicy::Raise).is_err());
    }

    #[test]
    fn test_nan_policy_omit_drops_non_finite() {
        let residuals = vec![1.0, f64::NAN, 2.0, f64::INFINITY];
        let filtered = apply_nan_policy(residuals, NanPolicy::Omit).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_relative_eq!(filtered[0], 1.0);
        assert_relative_eq!(filtered[1], 2.0);
    }

    #[test]
    fn test_nan_policy_propagate_keeps_everything() {
        let residuals = vec![1.0, f64::NAN];
        let kept = apply_nan_policy(residuals, NanPolicy::Propagate).unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept[1].is_nan());
    }

    #[test]
    fn test_fit_recovers_constant_offset() {
        use crate::config::ParameterHint;

        let x = Array1::linspace(0.0, 9.0, 10);
        let y = Array1::from_elem(10, 4.2);
        let mut table = SpectraTable::new();
        table.insert("energy", x).unwrap();
        table.insert("intensity", y).unwrap();

        let settings = FitSettings::new().with_peak(
            1,
            "constant",
            "amplitude",
            ParameterHint::new(1.0),
        );
        let outcome = Solver::new(settings).fit(&table).unwrap();

        assert!(outcome.result.success, "{}", outcome.result.message);
        let key = constant_key(1);
        assert_relative_eq!(
            outcome.parameters.get(&key).unwrap().value(),
            4.2,
            epsilon = 1e-6
        );
        assert_eq!(outcome.report.mode, FitMode::LocalManual);
        assert!(outcome.report.detection.is_none());
    }

    #[test]
    fn test_fit_without_varying_parameters_is_rejected() {
        use crate::config::ParameterHint;

        let mut table = SpectraTable::new();
        table.insert("energy", array![0.0, 1.0]).unwrap();
        table.insert("intensity", array![1.0, 1.0]).unwrap();

        let settings = FitSettings::new().with_peak(
            1,
            "constant",
            "amplitude",
            ParameterHint::new(1.0).fixed(),
        );
        assert!(Solver::new(settings).fit(&table).is_err());
    }
}
