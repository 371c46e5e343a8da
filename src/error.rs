//! Error types for the depfusion pipeline

use thiserror::Error;

/// Result type alias for depfusion operations
pub type Result<T> = std::result::Result<T, DepFusionError>;

/// Main error type for the pipeline and its collaborators
#[derive(Error, Debug)]
pub enum DepFusionError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("No recognised {field} column; available columns: {available:?}")]
    LabelSchema {
        field: &'static str,
        available: Vec<String>,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl From<polars::error::PolarsError> for DepFusionError {
    fn from(err: polars::error::PolarsError) -> Self {
        DepFusionError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for DepFusionError {
    fn from(err: serde_json::Error) -> Self {
        DepFusionError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DepFusionError {
    fn from(err: ndarray::ShapeError) -> Self {
        DepFusionError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
