// Error handling utilities
// Author: Gabriel Demetrios Lafis

use thiserror::Error;

use crate::data::DataError;
use crate::processing::ProcessingError;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for AppError
pub type AppResult<T> = Result<T, AppError>;
