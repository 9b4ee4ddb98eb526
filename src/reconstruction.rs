//! Rebuilding per-component curves from a fitted parameter set.
//!
//! Pure post-processing over the same grouping rules the solver fits with:
//! each `(kind, peak[, column])` group is evaluated into its own named
//! column so the individual contributions can be inspected next to the data.

use crate::config::FitSettings;
use crate::data::SpectraTable;
use crate::error::Result;
use crate::models::ComponentKind;
use crate::parameters::Parameters;
use crate::solver::group_components;
use log::debug;
use ndarray::Array1;

/// Evaluate every component of `parameters` over the x column and return a
/// copy of `table` extended with one column per contribution, the summed
/// `fit` column and the signed `residual` column.
///
/// Contribution columns are named `{kind}_{peak}`; in global modes every
/// name carries the `_{column}` suffix, including `fit_{column}` and
/// `residual_{column}`. The input table is not touched.
pub fn calculated_model(
    parameters: &Parameters,
    table: &SpectraTable,
    settings: &FitSettings,
) -> Result<SpectraTable> {
    let mode = settings.mode()?;
    let x = table.column(settings.x_column()?)?;
    let intensity_columns = settings.intensity_columns()?;
    let mut extended = table.clone();

    if mode.is_global() {
        for (index, name) in intensity_columns.iter().enumerate() {
            let column = index + 1;
            let observed = table.column(name)?;
            append_spectrum(&mut extended, parameters, x, observed, Some(column))?;
        }
    } else {
        let observed = table.column(&intensity_columns[0])?;
        append_spectrum(&mut extended, parameters, x, observed, None)?;
    }

    debug!(
        "reconstructed {} column(s) from {} parameter(s)",
        extended.n_columns() - table.n_columns(),
        parameters.len()
    );

    Ok(extended)
}

fn append_spectrum(
    extended: &mut SpectraTable,
    parameters: &Parameters,
    x: &Array1<f64>,
    observed: &Array1<f64>,
    column: Option<usize>,
) -> Result<()> {
    let mut fit = Array1::zeros(x.len());
    for ((kind, peak), args) in group_components(parameters, column) {
        let contribution = kind.evaluate(x, &args)?;
        fit += &contribution;
        extended.insert(&contribution_name(kind, peak, column), contribution)?;
    }
    let residual = &fit - observed;
    extended.insert(&suffixed("fit", column), fit)?;
    extended.insert(&suffixed("residual", column), residual)?;
    Ok(())
}

fn contribution_name(kind: ComponentKind, peak: usize, column: Option<usize>) -> String {
    match column {
        Some(column) => format!("{}_{}_{}", kind, peak, column),
        None => format!("{}_{}", kind, peak),
    }
}

fn suffixed(stem: &str, column: Option<usize>) -> String {
    match column {
        Some(column) => format!("{}_{}", stem, column),
        None => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Parameter, ParameterKey};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn local_params() -> Parameters {
        let mut params = Parameters::new();
        let amplitude = ParameterKey::local(ComponentKind::Gaussian, "amplitude", 1);
        let center = ParameterKey::local(ComponentKind::Gaussian, "center", 1);
        let width = ParameterKey::local(ComponentKind::Gaussian, "fwhmg", 1);
        let offset = ParameterKey::local(ComponentKind::Constant, "amplitude", 2);
        params.add(Parameter::new(amplitude, 3.0)).unwrap();
        params.add(Parameter::new(center, 1.0)).unwrap();
        params.add(Parameter::new(width, 0.5)).unwrap();
        params.add(Parameter::new(offset, 0.25)).unwrap();
        params
    }

    fn local_table() -> SpectraTable {
        let mut table = SpectraTable::new();
        table
            .insert("energy", Array1::linspace(0.0, 2.0, 21))
            .unwrap();
        table.insert("intensity", Array1::from_elem(21, 0.5)).unwrap();
        table
    }

    #[test]
    fn test_local_reconstruction_adds_named_columns() {
        let params = local_params();
        let table = local_table();
        let settings = FitSettings::new();

        let extended = calculated_model(&params, &table, &settings).unwrap();
        for name in ["energy", "intensity", "gaussian_1", "constant_2", "fit", "residual"] {
            assert!(extended.contains(name), "missing column {}", name);
        }

        let gaussian = extended.column("gaussian_1").unwrap();
        let constant = extended.column("constant_2").unwrap();
        let fit = extended.column("fit").unwrap();
        let residual = extended.column("residual").unwrap();
        for i in 0..extended.n_rows() {
            assert_relative_eq!(fit[i], gaussian[i] + constant[i], epsilon = 1e-12);
            assert_relative_eq!(residual[i], fit[i] - 0.5, epsilon = 1e-12);
        }

        // The gaussian contribution peaks at its center with the
        // area-normalized height.
        let sigma = 0.5 * crate::models::FWHMG2SIG;
        let top = 3.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt());
        assert_relative_eq!(gaussian[10], top, epsilon = 1e-9);
    }

    #[test]
    fn test_input_table_is_left_alone() {
        let params = local_params();
        let table = local_table();
        let settings = FitSettings::new();

        let _ = calculated_model(&params, &table, &settings).unwrap();
        assert_eq!(table.n_columns(), 2);
    }

    #[test]
    fn test_reconstruction_is_bit_identical() {
        let params = local_params();
        let table = local_table();
        let settings = FitSettings::new();

        let first = calculated_model(&params, &table, &settings).unwrap();
        let second = calculated_model(&params, &table, &settings).unwrap();

        assert_eq!(first.column_names(), second.column_names());
        for name in first.column_names() {
            let a = first.column(&name).unwrap();
            let b = second.column(&name).unwrap();
            for (va, vb) in a.iter().zip(b.iter()) {
                assert_eq!(va.to_bits(), vb.to_bits(), "column {}", name);
            }
        }
    }

    #[test]
    fn test_global_reconstruction_suffixes_every_column() {
        let mut params = Parameters::new();
        for column in 1..=2 {
            let amplitude = ParameterKey::global(ComponentKind::Gaussian, "amplitude", 1, column);
            params
                .add(Parameter::new(amplitude, column as f64))
                .unwrap();
        }

        let mut table = SpectraTable::new();
        table.insert("energy", array![0.0, 1.0, 2.0]).unwrap();
        table.insert("s1", array![0.1, 0.2, 0.3]).unwrap();
        table.insert("s2", array![0.3, 0.2, 0.1]).unwrap();

        let settings = FitSettings::new()
            .with_columns(["energy", "s1", "s2"])
            .with_global_fitting(1);

        let extended = calculated_model(&params, &table, &settings).unwrap();
        for name in ["gaussian_1_1", "gaussian_1_2", "fit_1", "fit_2", "residual_1", "residual_2"] {
            assert!(extended.contains(name), "missing column {}", name);
        }
        assert!(!extended.contains("fit"));
    }
}
