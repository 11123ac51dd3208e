use thiserror::Error;

/// Main error type for the Tunebay system
#[derive(Error, Debug)]
pub enum TbError {
    #[error("Parameter space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Surrogate error: {0}")]
    Surrogate(#[from] SurrogateError),

    #[error("Study error: {0}")]
    Study(#[from] StudyError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Parameter space construction and encoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("space.{name}: high must be > low (low={low}, high={high})")]
    InvertedBounds { name: String, low: f64, high: f64 },

    #[error("space.{name}: bounds and their span must be finite")]
    NonFiniteBounds { name: String },

    #[error("space.{name}: log_float requires low > 0 (got {low})")]
    NonPositiveLogBound { name: String, low: f64 },

    #[error("space.{name}: categorical requires non-empty choices")]
    EmptyChoices { name: String },

    #[error("space.{name}: unsupported type {kind:?} (use float|log_float|int|categorical)")]
    UnsupportedKind { name: String, kind: String },

    #[error("space.{name}: {message}")]
    InvalidField { name: String, message: String },

    #[error("Duplicate parameter name: {name}")]
    DuplicateName { name: String },

    #[error("Parameter space must define at least one parameter")]
    Empty,

    #[error("Candidate has no value for parameter {name}")]
    MissingValue { name: String },

    #[error("Value for parameter {name} has the wrong type, expected {expected}")]
    TypeMismatch { name: String, expected: String },

    #[error("Value {value} is not a choice of categorical parameter {name}")]
    UnknownChoice { name: String, value: String },

    #[error("Encoded point has {actual} dimensions, space has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Surrogate model fitting errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurrogateError {
    #[error("Cannot fit surrogate on an empty training set")]
    EmptyTrainingSet,

    #[error("Training inputs ({points}) and targets ({targets}) differ in length")]
    LengthMismatch { points: usize, targets: usize },

    #[error("Point has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Kernel matrix is singular")]
    Singular,
}

/// Study-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudyError {
    #[error("All {n_trials} trials failed")]
    AllTrialsFailed { n_trials: usize },

    #[error("Invalid study configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Worker pool disconnected with {in_flight} trials in flight")]
    WorkerDisconnected { in_flight: usize },
}

/// Failure of a single objective evaluation. Recorded on the trial, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("exit={code} ({elapsed_secs:.2}s): {tail}")]
    NonZeroExit {
        code: String,
        elapsed_secs: f64,
        tail: String,
    },

    #[error("timed out after {timeout_secs:.2}s")]
    Timeout { timeout_secs: f64 },

    #[error("metric_key={key:?} not found in stdout JSON")]
    MissingMetric { key: String },

    #[error("invalid float for metric {key}: {value}")]
    InvalidMetric { key: String, value: String },

    #[error("failed to spawn command: {message}")]
    Spawn { message: String },

    #[error("empty command")]
    EmptyCommand,

    #[error("objective panicked: {message}")]
    Panicked { message: String },

    #[error("{message}")]
    Failed { message: String },
}

impl EvaluationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Result type alias for Tunebay operations
pub type TbResult<T> = Result<T, TbError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TbError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TbError::Config(format!($($arg)*))
    };
}
