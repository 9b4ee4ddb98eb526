//! Automatic peak detection driving a local fit.
//!
//! The fixtures use narrow Gaussian bumps whose tails underflow to zero,
//! so the detector's derived arguments fall back to the arithmetic mean
//! and both candidates survive the width filter.

use approx::assert_relative_eq;
use indexmap::IndexMap;
use ndarray::Array1;
use spectrafit::detection::Limit;
use spectrafit::error::Result;
use spectrafit::{
    AutoPeak, ComponentKind, FitMode, FitSettings, ParameterKey, Solver, SpectraTable,
};

/// Two well separated bumps of height 2 and 3 at x = 6 and x = 10.
fn two_bump_table() -> SpectraTable {
    let x = Array1::linspace(0.0, 20.0, 401);
    let y = x.mapv(|xv: f64| {
        let a = (-(xv - 6.0) * (xv - 6.0) / 0.02).exp();
        let b = (-(xv - 10.0) * (xv - 10.0) / 0.02).exp();
        2.0 * a + 3.0 * b
    });

    let mut table = SpectraTable::new();
    table.insert("energy", x).unwrap();
    table.insert("intensity", y).unwrap();
    table
}

#[test]
fn test_detection_report_lists_both_candidates() -> Result<()> {
    let table = two_bump_table();
    let settings = FitSettings::new().with_autopeak(AutoPeak::Enabled(true));

    let outcome = Solver::new(settings).fit(&table)?;
    assert_eq!(outcome.report.mode, FitMode::LocalAuto);

    let detection = outcome.report.detection.as_ref().unwrap();
    assert_eq!(detection.positions, vec![120, 200]);

    let heights = detection.property("peak_heights").unwrap();
    assert_relative_eq!(heights[0], 2.0, epsilon = 1e-9);
    assert_relative_eq!(heights[1], 3.0, epsilon = 1e-9);

    Ok(())
}

#[test]
fn test_detected_candidates_seed_gaussian_parameters() -> Result<()> {
    let table = two_bump_table();
    let settings = FitSettings::new().with_autopeak(AutoPeak::Enabled(true));

    let outcome = Solver::new(settings).fit(&table)?;
    let seeds = &outcome.report.initial_parameters;
    assert_eq!(
        seeds.names(),
        vec![
            "gaussian_amplitude_1",
            "gaussian_center_1",
            "gaussian_fwhmg_1",
            "gaussian_amplitude_2",
            "gaussian_center_2",
            "gaussian_fwhmg_2",
        ]
    );

    // Amplitude seeds carry the detected heights, centers the peak
    // positions mapped back onto the x axis.
    let amplitude = ParameterKey::local(ComponentKind::Gaussian, "amplitude", 1);
    let amplitude = seeds.get(&amplitude).unwrap();
    assert_relative_eq!(amplitude.value(), 2.0, epsilon = 1e-9);
    assert_eq!(amplitude.bounds().min(), -2.5);
    assert_eq!(amplitude.bounds().max(), 2.5);

    let center = ParameterKey::local(ComponentKind::Gaussian, "center", 2);
    let center = seeds.get(&center).unwrap();
    assert_relative_eq!(center.value(), 10.0, epsilon = 1e-9);
    assert_eq!(center.bounds().min(), 5.0);
    assert_eq!(center.bounds().max(), 20.0);

    // Widths come out in x units: samples times the median grid spacing.
    let fwhmg = ParameterKey::local(ComponentKind::Gaussian, "fwhmg", 1);
    let fwhmg = seeds.get(&fwhmg).unwrap();
    assert!(fwhmg.value() > 0.0);
    assert_eq!(fwhmg.bounds().min(), 0.0);
    assert_relative_eq!(fwhmg.bounds().max(), 2.5 * fwhmg.value(), max_relative = 1e-12);

    Ok(())
}

#[test]
fn test_height_override_narrows_the_candidate_set() -> Result<()> {
    let table = two_bump_table();
    let mut overrides = IndexMap::new();
    overrides.insert("height".to_string(), Limit::Pair(2.5, 10.0));
    let settings = FitSettings::new().with_autopeak(AutoPeak::Overrides(overrides));

    let outcome = Solver::new(settings).fit(&table)?;
    let detection = outcome.report.detection.as_ref().unwrap();
    assert_eq!(detection.positions, vec![200]);
    assert_eq!(outcome.report.initial_parameters.names().len(), 3);

    Ok(())
}

#[test]
fn test_unsupported_detection_keyword_is_rejected() {
    let table = two_bump_table();
    let mut overrides = IndexMap::new();
    overrides.insert("sharpness".to_string(), Limit::Scalar(1.0));
    let settings = FitSettings::new().with_autopeak(AutoPeak::Overrides(overrides));

    let err = Solver::new(settings).fit(&table).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsupported peak detection keyword: sharpness"
    );
}
