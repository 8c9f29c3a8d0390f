//! Error taxonomy shared by the forecasting and allocation subsystems
//!
//! Only `Validation` and `Persistence` are returned to callers as hard
//! failures. The other kinds are absorbed into degraded results and appear
//! in training reports, prediction outcomes and allocation statuses.

use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input; rejected before any computation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Too few labeled rows to train a (resource, horizon) pair
    #[error("insufficient data for {key}: {rows} labeled rows, need {required}")]
    InsufficientData {
        key: String,
        rows: usize,
        required: usize,
    },

    /// No trained model for a requested (resource, horizon) pair
    #[error("no trained model for {0}")]
    ModelUnavailable(String),

    /// Constraint conjunction unsatisfiable or solver unreachable
    #[error("optimization infeasible: {0}")]
    OptimizationInfeasible(String),

    /// Registry load or save failure
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    pub fn persistence(context: impl Display, err: impl Display) -> Self {
        Error::Persistence(format!("{}: {}", context, err))
    }

    /// True for the kinds that must be surfaced to callers
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Persistence(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_failure_classification() {
        assert!(Error::Validation("x".into()).is_hard_failure());
        assert!(Error::Persistence("x".into()).is_hard_failure());
        assert!(!Error::ModelUnavailable("admissions_next_1h".into()).is_hard_failure());
        assert!(!Error::OptimizationInfeasible("x".into()).is_hard_failure());
        assert!(!Error::InsufficientData {
            key: "admissions_next_24h".into(),
            rows: 10,
            required: 50
        }
        .is_hard_failure());
    }

    #[test]
    fn test_persistence_message() {
        let err = Error::persistence("Failed to read metadata.json", "file not found");
        assert_eq!(
            err.to_string(),
            "persistence error: Failed to read metadata.json: file not found"
        );
    }
}
