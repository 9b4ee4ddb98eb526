//! Global fits across several spectra sharing one x axis.
//!
//! In standard global mode every shape parameter except the amplitude is
//! linked back to the first intensity column by constraint expressions, so
//! the spectra share peak positions and widths while scaling freely.

use approx::assert_relative_eq;
use ndarray::Array1;
use spectrafit::error::Result;
use spectrafit::models::peak;
use spectrafit::{
    ComponentKind, FitSettings, ParameterHint, ParameterKey, Solver, SpectraTable,
};

/// Two pseudo-Voigt spectra with a common line shape and different
/// amplitudes.
fn shared_shape_table() -> SpectraTable {
    let x = Array1::linspace(0.0, 4.0, 161);
    let weak = peak::pseudovoigt(&x, 3.0, 2.0, 0.8, 0.6);
    let strong = peak::pseudovoigt(&x, 5.0, 2.0, 0.8, 0.6);

    let mut table = SpectraTable::new();
    table.insert("energy", x).unwrap();
    table.insert("intensity_1", weak).unwrap();
    table.insert("intensity_2", strong).unwrap();
    table
}

fn shared_shape_settings() -> FitSettings {
    FitSettings::new()
        .with_columns(["energy", "intensity_1", "intensity_2"])
        .with_global_fitting(1)
        .with_peak(1, "pseudovoigt", "amplitude", ParameterHint::new(2.0))
        .with_peak(1, "pseudovoigt", "center", ParameterHint::new(1.8))
        .with_peak(1, "pseudovoigt", "fwhmg", ParameterHint::new(1.0))
        .with_peak(1, "pseudovoigt", "fwhml", ParameterHint::new(1.0))
}

#[test]
fn test_standard_global_fit_recovers_shared_shape() -> Result<()> {
    let table = shared_shape_table();
    let outcome = Solver::new(shared_shape_settings()).fit(&table)?;

    assert!(outcome.result.success, "{}", outcome.result.message);
    assert_eq!(outcome.result.statistics.ndata, 322);
    assert_eq!(outcome.result.statistics.nvarys, 5);

    let params = &outcome.parameters;
    let value = |parameter: &str, column: usize| {
        let key = ParameterKey::global(ComponentKind::PseudoVoigt, parameter, 1, column);
        params.get(&key).unwrap().value()
    };
    assert_relative_eq!(value("amplitude", 1), 3.0, max_relative = 1e-4);
    assert_relative_eq!(value("amplitude", 2), 5.0, max_relative = 1e-4);
    assert_relative_eq!(value("center", 1), 2.0, max_relative = 1e-4);
    assert_relative_eq!(value("fwhmg", 1), 0.8, max_relative = 1e-4);
    assert_relative_eq!(value("fwhml", 1), 0.6, max_relative = 1e-4);

    Ok(())
}

#[test]
fn test_linked_parameters_track_the_reference_column() -> Result<()> {
    let table = shared_shape_table();
    let outcome = Solver::new(shared_shape_settings()).fit(&table)?;

    let params = &outcome.parameters;
    for parameter in ["center", "fwhmg", "fwhml"] {
        let reference = ParameterKey::global(ComponentKind::PseudoVoigt, parameter, 1, 1);
        let linked = ParameterKey::global(ComponentKind::PseudoVoigt, parameter, 1, 2);
        let linked = params.get(&linked).unwrap();

        assert!(!linked.vary());
        assert_eq!(linked.expr(), Some(reference.name().as_str()));
        assert_eq!(linked.value(), params.get(&reference).unwrap().value());
    }

    // Amplitudes stay independent in both columns.
    for column in [1, 2] {
        let key = ParameterKey::global(ComponentKind::PseudoVoigt, "amplitude", 1, column);
        let amplitude = params.get(&key).unwrap();
        assert!(amplitude.vary());
        assert!(amplitude.expr().is_none());
    }

    Ok(())
}

#[test]
fn test_prespecified_global_fit_keeps_columns_independent() -> Result<()> {
    let x = Array1::linspace(0.0, 4.0, 161);
    let first = peak::gaussian(&x, 3.0, 2.0, 0.6);
    let second = peak::gaussian(&x, 5.0, 2.2, 0.8);

    let mut table = SpectraTable::new();
    table.insert("energy", x).unwrap();
    table.insert("intensity_1", first).unwrap();
    table.insert("intensity_2", second).unwrap();

    let settings = FitSettings::new()
        .with_columns(["energy", "intensity_1", "intensity_2"])
        .with_global_fitting(2)
        .with_column_peak(1, 1, "gaussian", "amplitude", ParameterHint::new(2.0))
        .with_column_peak(1, 1, "gaussian", "center", ParameterHint::new(1.8))
        .with_column_peak(1, 1, "gaussian", "fwhmg", ParameterHint::new(1.0))
        .with_column_peak(2, 1, "gaussian", "amplitude", ParameterHint::new(4.0))
        .with_column_peak(2, 1, "gaussian", "center", ParameterHint::new(2.5))
        .with_column_peak(2, 1, "gaussian", "fwhmg", ParameterHint::new(1.0));

    let outcome = Solver::new(settings).fit(&table)?;
    assert!(outcome.result.success, "{}", outcome.result.message);
    assert_eq!(outcome.result.statistics.nvarys, 6);

    let params = &outcome.parameters;
    let value = |parameter: &str, column: usize| {
        let key = ParameterKey::global(ComponentKind::Gaussian, parameter, 1, column);
        params.get(&key).unwrap().value()
    };
    assert_relative_eq!(value("amplitude", 1), 3.0, max_relative = 1e-4);
    assert_relative_eq!(value("center", 1), 2.0, max_relative = 1e-4);
    assert_relative_eq!(value("fwhmg", 1), 0.6, max_relative = 1e-4);
    assert_relative_eq!(value("amplitude", 2), 5.0, max_relative = 1e-4);
    assert_relative_eq!(value("center", 2), 2.2, max_relative = 1e-4);
    assert_relative_eq!(value("fwhmg", 2), 0.8, max_relative = 1e-4);

    Ok(())
}

#[test]
fn test_global_fitting_with_autopeak_is_rejected() {
    let table = shared_shape_table();
    let settings = FitSettings::new()
        .with_columns(["energy", "intensity_1", "intensity_2"])
        .with_global_fitting(1)
        .with_autopeak(spectrafit::AutoPeak::Enabled(true));

    let err = Solver::new(settings).fit(&table).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Automatic peak detection is not supported for global fitting!"
    );
}
