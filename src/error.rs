//! Error kinds shared by the selection engine and the experiment drivers.
//!
//! Every variant aborts the current experiment run; there is no partial-failure
//! recovery in the core.

use thiserror::Error;

/// Failure raised by an external collaborator (trainer, model or evaluator)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrainingError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training set needs both classes, only found label {0}")]
    SingleClass(u8),

    #[error("Model expects {expected} features, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Evaluation set is empty")]
    EmptyEvaluationSet,

    #[error("Trainer failed: {0}")]
    Other(String),
}

/// Errors that abort an experiment run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExperimentError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Feature mismatch for example {id}: expected {expected} dimensions, found {found}")]
    FeatureMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("Training failure: {0}")]
    TrainingFailure(#[from] TrainingError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ExperimentError {
    /// Short, stable name of the error kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "InvalidConfiguration",
            Self::InsufficientData(_) => "InsufficientData",
            Self::FeatureMismatch { .. } => "FeatureMismatch",
            Self::TrainingFailure(_) => "TrainingFailure",
            Self::InvalidInput(_) => "InvalidInput",
        }
    }
}

/// Result alias for experiment operations
pub type Result<T, E = ExperimentError> = std::result::Result<T, E>;
