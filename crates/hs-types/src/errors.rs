use thiserror::Error;

/// Main error type for the HyperSweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Dataset and fold-construction errors. These are setup failures and abort a
/// whole sweep.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Dataset is empty")]
    Empty,

    #[error("Feature/label length mismatch: {features} feature rows, {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("Ragged feature row {row}: expected {expected} features, got {got}")]
    RaggedRow { row: usize, expected: usize, got: usize },

    #[error("Label {label} at row {row} is out of range for {n_classes} classes")]
    LabelOutOfRange { row: usize, label: usize, n_classes: usize },

    #[error("Label {label} at row {row} is not a dense class id for {n_samples} samples")]
    SparseLabel { row: usize, label: usize, n_samples: usize },

    #[error("Invalid fold count {n_folds}: at least 2 folds are required")]
    InvalidFoldCount { n_folds: usize },

    #[error("Insufficient data: {n_samples} samples cannot be split into {n_folds} folds")]
    InsufficientSamples { n_samples: usize, n_folds: usize },

    #[error("Class sizes too small: largest class has {largest} members, {n_folds} folds requested")]
    ClassTooSmall { largest: usize, n_folds: usize },

    #[error("Invalid generator configuration: {message}")]
    InvalidGenerator { message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error at line {line}: {message}")]
    ParseError { line: usize, message: String },
}

/// Search space declaration and materialization errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Duplicate dimension: {name}")]
    DuplicateDimension { name: String },

    #[error("Invalid bounds for {name}: low ({low}) must be <= high ({high})")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("Invalid log bounds for {name}: low must be positive")]
    InvalidLogBounds { name: String },

    #[error("Categorical dimension {name} has no choices")]
    EmptyChoices { name: String },

    #[error("Dimension {name} is guarded on undeclared dimension {guard}")]
    UnknownGuard { name: String, guard: String },

    #[error("Dimension {name} is guarded on non-categorical dimension {guard}")]
    GuardNotCategorical { name: String, guard: String },

    #[error("Dimension {name} is guarded on {guard} == {value}, which is not one of its choices")]
    GuardValueNotAllowed { name: String, guard: String, value: String },

    #[error("Proposal is missing a value for active dimension {name}")]
    MissingValue { name: String },

    #[error("Value {value} is outside the domain of dimension {name}")]
    OutOfDomain { name: String, value: String },
}

/// Model construction and training errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Missing model parameter: {name}")]
    MissingParameter { name: String },

    #[error("Model parameter {name} has the wrong type: expected {expected}")]
    WrongType { name: String, expected: String },

    #[error("Invalid model parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Unsupported value {value} for model parameter {name}")]
    UnsupportedValue { name: String, value: String },

    #[error("Model training failed: {message}")]
    TrainingFailed { message: String },

    #[error("Model has not been fitted")]
    NotFitted,
}

/// Failures talking to a sampler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("Sampler could not propose trial {trial_number}: {message}")]
    ProposeFailed { trial_number: usize, message: String },

    #[error("Sampler rejected the report for trial {trial_number}: {message}")]
    ReportFailed { trial_number: usize, message: String },

    #[error("Sampler produced an invalid proposal for trial {trial_number}: {source}")]
    InvalidProposal {
        trial_number: usize,
        #[source]
        source: SpaceError,
    },
}

/// Result type alias for HyperSweep operations
pub type HsResult<T> = Result<T, HsError>;

impl From<csv::Error> for HsError {
    fn from(e: csv::Error) -> Self {
        HsError::Csv(e.to_string())
    }
}

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HsError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DataError::InsufficientSamples {
            n_samples: 3,
            n_folds: 5,
        };

        assert!(error.to_string().contains("Insufficient data"));
        assert!(error.to_string().contains('3'));
        assert!(error.to_string().contains('5'));
    }

    #[test]
    fn test_error_conversion() {
        let space_error = SpaceError::MissingValue {
            name: "eta".to_string(),
        };
        let hs_error: HsError = space_error.into();

        match hs_error {
            HsError::Space(_) => (),
            _ => panic!("Expected Space error"),
        }
    }

    #[test]
    fn invalid_proposal_keeps_source() {
        use std::error::Error as _;

        let err = SamplerError::InvalidProposal {
            trial_number: 4,
            source: SpaceError::MissingValue {
                name: "rate".into(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("trial 4"));
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid budget: {}", 0);
        assert!(matches!(validation_err, HsError::Validation(_)));
        let internal_err = internal_error!("Something went wrong");
        assert!(matches!(internal_err, HsError::Internal(_)));
        let config_err = config_error!("Missing required field: {}", "budgets");
        assert!(matches!(config_err, HsError::Config(_)));
    }
}
