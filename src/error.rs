//! Error types for Sleepwatch

use thiserror::Error;

/// Errors that can occur around scoring: decoding, configuration, storage and control
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse reading: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid weight vector: {0}")]
    InvalidWeights(String),

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Invalid light schedule: {0}")]
    InvalidSchedule(String),

    #[error("Unknown measurement: {0}")]
    UnknownMeasurement(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Publish error: {0}")]
    Publish(String),
}
