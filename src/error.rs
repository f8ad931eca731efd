//! Error types shared by the forecaster adapter and the RNN layer.

use thiserror::Error;

/// Errors raised by forecasting operations.
///
/// Operations return `anyhow::Result`; callers that need to branch on the
/// failure kind can recover this type with `downcast_ref::<ForecastError>()`.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Model is not fitted yet.")]
    NotFitted,

    #[error("Future covariates are declared in the schema but no test dataframe was supplied")]
    MissingFutureCovariates,

    #[error("Series '{id}' is missing from the {table} table")]
    MissingSeries { id: String, table: String },

    #[error("Column '{column}' not found in the {table} table")]
    ColumnNotFound { column: String, table: String },

    #[error("Column '{column}' contains {count} null value(s)")]
    NullValues { column: String, count: usize },

    #[error("Insufficient data for {what}: need at least {required} points, got {actual}")]
    InsufficientData {
        what: String,
        required: usize,
        actual: usize,
    },

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("Length mismatch: expected {expected} rows, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_fitted_display() {
        assert_eq!(ForecastError::NotFitted.to_string(), "Model is not fitted yet.");
    }

    #[test]
    fn test_insufficient_data_display() {
        let error = ForecastError::InsufficientData {
            what: "series 'a'".to_string(),
            required: 25,
            actual: 10,
        };
        assert_eq!(
            error.to_string(),
            "Insufficient data for series 'a': need at least 25 points, got 10"
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ForecastError::MissingFutureCovariates.into();
        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::MissingFutureCovariates)
        ));
    }
}
