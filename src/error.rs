use thiserror::Error;

/// Error types for the spectrafit library.
#[derive(Error, Debug)]
pub enum SpectraFitError {
    /// A flattened parameter name references a component kind outside the
    /// model registry. The message carries the offending key verbatim.
    #[error("{0} is not supported!")]
    UnsupportedComponent(String),

    /// The shape family requested for automatic peak detection is not one of
    /// the seedable kinds.
    #[error("{0} is not supported for auto detection! Valid shapes: gaussian, orcagaussian, lorentzian, voigt, pseudovoigt")]
    UnsupportedAutoShape(String),

    /// An explicit peak-detection override used a keyword outside the
    /// supported set.
    #[error("Unsupported peak detection keyword: {0}")]
    UnsupportedDetectionKey(String),

    /// Global fitting and automatic peak detection are mutually exclusive.
    #[error("Automatic peak detection is not supported for global fitting!")]
    GlobalWithAutopeak,

    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A named column is missing from the fit-data table.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Error indicating the minimizer failed to make progress.
    #[error("Minimization failed: {0}")]
    MinimizationFailure(String),

    /// Error for invalid parameter values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Error for parameter-related problems.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// Parameter not found.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

impl From<crate::parameters::parameter::ParameterError> for SpectraFitError {
    fn from(err: crate::parameters::parameter::ParameterError) -> Self {
        SpectraFitError::ParameterError(format!("{}", err))
    }
}

impl From<crate::parameters::bounds::BoundsError> for SpectraFitError {
    fn from(err: crate::parameters::bounds::BoundsError) -> Self {
        SpectraFitError::ParameterError(format!("{}", err))
    }
}

/// Result type alias for spectrafit operations.
pub type Result<T> = std::result::Result<T, SpectraFitError>;

impl From<String> for SpectraFitError {
    fn from(s: String) -> Self {
        SpectraFitError::Other(s)
    }
}

impl From<&str> for SpectraFitError {
    fn from(s: &str) -> Self {
        SpectraFitError::Other(s.to_string())
    }
}
