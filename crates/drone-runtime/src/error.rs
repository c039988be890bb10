//! # Runtime Error Types
//!
//! Unified error handling for commands, queries and stat ingestion.

use drone_domain::CommandError;
use drone_progress::{CatalogError, ProgressError};
use thiserror::Error;

/// Errors surfaced to callers of the runtime
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl CoreError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Catalog(_) => "CATALOG_ERROR",
        }
    }
}

impl From<CommandError> for CoreError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::PreconditionFailed(msg) => Self::PreconditionFailed(msg),
            CommandError::Conflict(msg) => Self::Conflict(msg),
            CommandError::Validation(msg) => Self::Validation(msg),
        }
    }
}

impl From<ProgressError> for CoreError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::Validation(msg) => Self::Validation(msg),
            ProgressError::NotFound(msg) => Self::NotFound(msg),
        }
    }
}

/// Result type for runtime operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = [
            (CoreError::from(CommandError::PreconditionFailed("x".into())), "PRECONDITION_FAILED"),
            (CoreError::from(CommandError::Conflict("x".into())), "CONFLICT"),
            (CoreError::from(CommandError::Validation("x".into())), "VALIDATION_ERROR"),
            (CoreError::from(ProgressError::Validation("x".into())), "VALIDATION_ERROR"),
            (CoreError::from(ProgressError::NotFound("x".into())), "NOT_FOUND"),
            (
                CoreError::from(CatalogError::DuplicateId("a".into())),
                "CATALOG_ERROR",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.error_code(), code, "{err}");
        }
    }

    #[test]
    fn test_message_is_preserved() {
        let err = CoreError::from(CommandError::Conflict("mission running".into()));
        assert_eq!(err.to_string(), "Conflict: mission running");
    }
}
