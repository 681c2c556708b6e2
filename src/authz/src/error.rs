//! Error types for the policy engine

use thiserror::Error;

use crate::cel::CelError;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// No enforcer is registered under the handle
    #[error("enforcer not found: {0}")]
    EnforcerNotFound(i32),

    /// No adapter is registered under the handle
    #[error("adapter not found: {0}")]
    AdapterNotFound(i32),

    /// Driver name is outside the allow-list
    #[error("unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// Driver is recognised but this build cannot talk to it
    #[error("driver unavailable in this build: {0}")]
    DriverUnavailable(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model text could not be parsed
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// ABAC token could not be encoded or decoded
    #[error("invalid ABAC attributes: {0}")]
    InvalidAbac(String),

    /// Matcher evaluation failed
    #[error("matcher evaluation failed: {0}")]
    Evaluation(#[from] CelError),

    /// Rule store failure
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// A compound operation failed part way through
    #[error("{stage} failed: {source}")]
    PartialFailure {
        stage: &'static str,
        #[source]
        source: Box<AuthzError>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// True when the error means the addressed enforcer or adapter does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EnforcerNotFound(_) | Self::AdapterNotFound(_))
    }

    pub(crate) fn at_stage(stage: &'static str, source: AuthzError) -> Self {
        Self::PartialFailure {
            stage,
            source: Box::new(source),
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AuthzError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Result type for policy engine operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable() {
        assert!(AuthzError::EnforcerNotFound(3).is_not_found());
        assert!(AuthzError::AdapterNotFound(0).is_not_found());
        assert!(!AuthzError::InvalidInput("x".into()).is_not_found());
    }

    #[test]
    fn partial_failure_names_stage() {
        let err = AuthzError::at_stage("remove grouping rules", AuthzError::Adapter("down".into()));
        assert_eq!(err.to_string(), "remove grouping rules failed: adapter error: down");
    }
}
