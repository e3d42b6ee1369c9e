//! Common error types for the telemetry pipeline

use thiserror::Error;

use crate::models::MetricId;

/// Result type for registry and store operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised by registry lookups, store updates and configuration
///
/// None of these are raised for bad frames or link trouble: decode failures
/// become invalid readings and link failures surface through `LinkStatus`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// Metric is not part of the loaded registry
    #[error("Unknown metric: {0}")]
    UnknownMetric(MetricId),

    /// Same metric id declared twice in a catalog
    #[error("Duplicate metric: {0}")]
    DuplicateMetric(MetricId),

    /// Invalid catalog or pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied query parameter out of bounds
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TelemetryError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TelemetryError::UnknownMetric(_) => 404,
            TelemetryError::DuplicateMetric(_) => 500,
            TelemetryError::Config(_) => 500,
            TelemetryError::InvalidArgument(_) => 400,
        }
    }
}
