use thiserror::Error;

/// Main error type for the Hypertune system
#[derive(Error, Debug)]
pub enum HtError {
    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Objective error: {0}")]
    Objective(#[from] ObjectiveError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Search space construction and sample validation errors.
///
/// All of these are raised before an expensive evaluation is started.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("search space has no dimensions")]
    Empty,

    #[error("dimension {index} has an empty name")]
    EmptyName { index: usize },

    #[error("duplicate dimension name: {name}")]
    DuplicateName { name: String },

    #[error("invalid bounds for {name}: {message}")]
    InvalidBounds { name: String, message: String },

    #[error("invalid prior for {name}: {message}")]
    InvalidPrior { name: String, message: String },

    #[error("categorical dimension {name} has no categories")]
    EmptyCategories { name: String },

    #[error("categorical dimension {name} lists {category} more than once")]
    DuplicateCategory { name: String, category: String },

    #[error("point has {actual} values but the space has {expected} dimensions")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{name} expects a {expected} value, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{name}={value} is outside [{low}, {high}]")]
    OutOfBounds {
        name: String,
        value: String,
        low: String,
        high: String,
    },

    #[error("{value} is not a category of {name}")]
    UnknownCategory { name: String, value: String },
}

/// Checkpoint read/write errors.
///
/// A missing checkpoint is not an error: loaders return `Ok(None)` for a cold
/// start. Everything here means prior work exists but cannot be trusted.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint {path} could not be read: {message}")]
    Unreadable { path: String, message: String },

    #[error("checkpoint {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u64, expected: u64 },

    #[error("checkpoint {path} was produced with a different search space")]
    SpaceMismatch { path: String },

    #[error("checkpoint was written by strategy {found}, but {expected} is configured")]
    StrategyMismatch { expected: String, found: String },

    #[error("checkpoint record {index} is invalid: {message}")]
    InvalidRecord { index: usize, message: String },

    #[error("checkpoint {path} could not be written: {message}")]
    WriteFailed { path: String, message: String },
}

/// Objective evaluation errors. These abort the run; nothing retries them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectiveError {
    #[error("evaluator failed: {message}")]
    EvaluatorFailed { message: String },

    #[error("metric {metric} missing from evaluator output")]
    MissingMetric { metric: String },

    #[error("metric {metric} is not finite: {value}")]
    NonFiniteMetric { metric: String, value: f64 },

    #[error("sampled parameter {key} would override a fixed trainer setting")]
    ReservedKey { key: String },

    #[error("invalid evaluator output: {message}")]
    InvalidOutput { message: String },
}

/// Result type alias for Hypertune operations
pub type HtResult<T> = Result<T, HtError>;

#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpaceError::OutOfBounds {
            name: "lr0".to_string(),
            value: "0.5".to_string(),
            low: "0.001".to_string(),
            high: "0.1".to_string(),
        };

        let text = error.to_string();
        assert!(text.contains("lr0=0.5"));
        assert!(text.contains("[0.001, 0.1]"));
    }

    #[test]
    fn test_error_conversion() {
        let checkpoint_error = CheckpointError::Corrupt {
            path: "checkpoint.json".to_string(),
            message: "expected value".to_string(),
        };
        let ht_error: HtError = checkpoint_error.into();

        match ht_error {
            HtError::Checkpoint(CheckpointError::Corrupt { .. }) => (),
            _ => panic!("Expected Checkpoint error"),
        }
    }

    #[test]
    fn test_objective_error_is_distinct_from_checkpoint() {
        let err: HtError = ObjectiveError::MissingMetric {
            metric: "metrics/recall(B)".to_string(),
        }
        .into();
        assert!(matches!(err, HtError::Objective(_)));
        assert!(err.to_string().contains("metrics/recall(B)"));
    }

    #[test]
    fn test_macros() {
        let _validation_err = validation_error!("Invalid value: {}", 42);
        let _internal_err = internal_error!("Something went wrong");
        let config_err = config_error!("Missing required field: {}", "space");
        assert!(matches!(config_err, HtError::Config(_)));
    }
}
