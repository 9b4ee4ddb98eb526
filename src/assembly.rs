//! Building the flat parameter set from fit settings.
//!
//! Every configured hint becomes one flat parameter named
//! `{kind}_{parameter}_{peak}` with a `_{column}` suffix in global modes.
//! Component kinds are plain strings up to this point; an unknown kind
//! surfaces here, reported with the full flat name.

use crate::config::{FitMode, FitSettings, ParameterHint, PeaksConfig};
use crate::data::SpectraTable;
use crate::detection::{detect, PeakCandidates};
use crate::error::{Result, SpectraFitError};
use crate::models::AutoShape;
use crate::parameters::{Parameter, ParameterKey, Parameters};
use log::debug;
use ndarray::Array1;

/// The flat parameter set and, in auto mode, the detection it came from.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Parameters in configuration order.
    pub parameters: Parameters,

    /// Detection output when auto seeding ran.
    pub detection: Option<PeakCandidates>,
}

/// Build the flat parameter set for the configured fit mode.
pub fn assemble(settings: &FitSettings, table: &SpectraTable) -> Result<Assembly> {
    let mode = settings.mode()?;
    let mut parameters = Parameters::new();
    let mut detection = None;

    match mode {
        FitMode::LocalManual => {
            assemble_peaks(&mut parameters, &settings.peaks, None)?;
        }
        FitMode::LocalAuto => {
            let x = table.column(settings.x_column()?)?;
            let intensity = table.column(&settings.intensity_columns()?[0])?;
            let candidates = detect(x, intensity, &settings.autopeak)?;
            seed_from_candidates(&mut parameters, &candidates, x, settings.auto_shape)?;
            detection = Some(candidates);
        }
        FitMode::GlobalStandard => {
            assemble_global_standard(&mut parameters, settings)?;
        }
        FitMode::GlobalPrespecified => {
            assemble_global_prespecified(&mut parameters, settings)?;
        }
    }

    parameters.update_expressions()?;
    debug!(
        "assembled {} parameter(s) in {} mode",
        parameters.len(),
        mode
    );

    Ok(Assembly {
        parameters,
        detection,
    })
}

fn assemble_peaks(
    parameters: &mut Parameters,
    peaks: &PeaksConfig,
    column: Option<usize>,
) -> Result<()> {
    for (peak, components) in peaks {
        for (kind, component) in components {
            for (name, hint) in component {
                let key = flat_key(kind, name, *peak, column)?;
                parameters.add(parameter_from_hint(key, hint)?)?;
            }
        }
    }
    Ok(())
}

/// Standard global mode: column 1 carries the full hints, later columns get
/// an independent amplitude and link every other parameter to column 1.
fn assemble_global_standard(parameters: &mut Parameters, settings: &FitSettings) -> Result<()> {
    let n_spectra = settings.intensity_columns()?.len();
    for column in 1..=n_spectra {
        for (peak, components) in &settings.peaks {
            for (kind, component) in components {
                for (name, hint) in component {
                    let key = flat_key(kind, name, *peak, Some(column))?;
                    if column == 1 || name == "amplitude" {
                        parameters.add(parameter_from_hint(key, hint)?)?;
                    } else {
                        let reference = flat_key(kind, name, *peak, Some(1))?;
                        let linked = Parameter::with_expr(key, hint.value, &reference.name());
                        parameters.add(linked)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Pre-specified global mode: every intensity column carries its own full
/// hint set under `column_peaks`.
fn assemble_global_prespecified(
    parameters: &mut Parameters,
    settings: &FitSettings,
) -> Result<()> {
    let n_spectra = settings.intensity_columns()?.len();
    for column in 1..=n_spectra {
        let peaks = settings.column_peaks.get(&column).ok_or_else(|| {
            SpectraFitError::InvalidInput(format!(
                "global_fitting = 2 needs peaks for every intensity column, column {} is missing",
                column
            ))
        })?;
        assemble_peaks(parameters, peaks, Some(column))?;
    }
    Ok(())
}

fn flat_key(
    kind: &str,
    parameter: &str,
    peak: usize,
    column: Option<usize>,
) -> Result<ParameterKey> {
    let name = match column {
        Some(column) => format!("{}_{}_{}_{}", kind, parameter, peak, column),
        None => format!("{}_{}_{}", kind, parameter, peak),
    };
    ParameterKey::parse(&name)
}

fn parameter_from_hint(key: ParameterKey, hint: &ParameterHint) -> Result<Parameter> {
    if let Some(expr) = &hint.expr {
        // The expression defines the value; bounds do not apply to it.
        return Ok(Parameter::with_expr(key, hint.value, expr));
    }
    let mut param = Parameter::with_bounds(
        key,
        hint.value,
        hint.min.unwrap_or(f64::NEG_INFINITY),
        hint.max.unwrap_or(f64::INFINITY),
    )?;
    if !hint.vary {
        param.set_vary(false)?;
    }
    Ok(param)
}

/// Seed one component of the configured shape family per detected peak.
///
/// Detected widths are in samples; the median sample spacing converts them
/// to x units.
fn seed_from_candidates(
    parameters: &mut Parameters,
    candidates: &PeakCandidates,
    x: &Array1<f64>,
    shape: AutoShape,
) -> Result<()> {
    let heights = candidates
        .property("peak_heights")
        .ok_or_else(|| SpectraFitError::Other("peak detection reported no heights".to_string()))?;
    let widths = candidates
        .property("widths")
        .ok_or_else(|| SpectraFitError::Other("peak detection reported no widths".to_string()))?;
    let spacing = median_spacing(x);
    let kind = shape.kind();

    for (i, &position) in candidates.positions.iter().enumerate() {
        let peak = i + 1;
        let height = heights[i];
        let center = x[position];
        let width = widths[i] * spacing;

        let amplitude_key = ParameterKey::local(kind, "amplitude", peak);
        let amplitude_bounds = sorted_pair(-1.25 * height, 1.25 * height);
        parameters.add(bounded_seed(amplitude_key, height, amplitude_bounds)?)?;

        let center_key = ParameterKey::local(kind, "center", peak);
        let center_bounds = if center == 0.0 {
            (-spacing, spacing)
        } else {
            sorted_pair(0.5 * center, 2.0 * center)
        };
        parameters.add(bounded_seed(center_key, center, center_bounds)?)?;

        for name in shape.width_parameters() {
            let key = ParameterKey::local(kind, name, peak);
            parameters.add(bounded_seed(key, width, (0.0, 2.5 * width))?)?;
        }
    }
    Ok(())
}

/// A varying parameter with the given bounds, unbounded when the interval
/// is degenerate.
fn bounded_seed(key: ParameterKey, value: f64, bounds: (f64, f64)) -> Result<Parameter> {
    let (min, max) = bounds;
    if min.is_finite() && max.is_finite() && min < max {
        Ok(Parameter::with_bounds(key, value, min, max)?)
    } else {
        Ok(Parameter::new(key, value))
    }
}

fn sorted_pair(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Median spacing of the x samples; one when there are fewer than two.
fn median_spacing(x: &Array1<f64>) -> f64 {
    let mut gaps: Vec<f64> = x
        .windows(2)
        .into_iter()
        .map(|pair| (pair[1] - pair[0]).abs())
        .collect();
    if gaps.is_empty() {
        return 1.0;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    gaps[gaps.len() / 2]
}
