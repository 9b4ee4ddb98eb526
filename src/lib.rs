//! # spectrafit
//!
//! `spectrafit` fits 1D spectra as sums of named distribution components,
//! with flat `{kind}_{parameter}_{peak}` parameter naming end to end.
//!
//! The library provides:
//! - A distribution model library: peaks, backgrounds, step edges and
//!   Mössbauer hyperfine patterns
//! - Automatic peak detection with search arguments derived from the data
//! - A parameter assembler that flattens nested per-peak configuration into
//!   bounded, optionally expression-linked parameters
//! - A Levenberg-Marquardt solver with goodness-of-fit statistics and
//!   parameter uncertainties
//! - A post-fit reconstructor that expands the fitted parameters back into
//!   per-component contribution columns
//!
//! ## Basic usage
//!
//! ```
//! use ndarray::Array1;
//! use spectrafit::{FitSettings, ParameterHint, Solver, SpectraTable};
//!
//! # fn main() -> spectrafit::Result<()> {
//! let mut table = SpectraTable::new();
//! table.insert("energy", Array1::linspace(0.0, 4.0, 30))?;
//! table.insert("intensity", Array1::from_elem(30, 2.5))?;
//!
//! let settings = FitSettings::new()
//!     .with_peak(1, "constant", "amplitude", ParameterHint::new(1.0));
//! let outcome = Solver::new(settings).fit(&table)?;
//! assert!(outcome.result.success);
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod error;

// Parameter system
pub mod parameters;

// Configuration and data tables
pub mod config;
pub mod data;

// Model library and peak detection
pub mod detection;
pub mod models;

// Fitting pipeline
pub mod assembly;
pub mod reconstruction;
pub mod solver;

// Re-exports for convenience
pub use config::{
    FitMode, FitSettings, NanPolicy, OptimizerOptions, ParameterHint, SolverOptions,
};
pub use data::SpectraTable;
pub use detection::AutoPeak;
pub use error::{Result, SpectraFitError};
pub use models::{AutoShape, ComponentKind};
pub use parameters::{Parameter, ParameterKey, Parameters};
pub use reconstruction::calculated_model;
pub use solver::{FitOutcome, FitReport, FitResult, Solver};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
