//! Error types for the progression engine.

use drone_domain::StatKey;
use thiserror::Error;

/// Rejections from stat ingestion and progress queries
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type ProgressResult<T> = Result<T, ProgressError>;

/// Reasons an achievement catalog is refused at load time
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read achievement catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse achievement catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate achievement id: {0}")]
    DuplicateId(String),

    #[error("achievement {0} must reward at least one point")]
    InvalidReward(String),

    #[error("achievement {id} has invalid threshold for {stat}")]
    InvalidCriterion { id: String, stat: StatKey },

    #[error("achievement {id} requires unknown achievement {prerequisite}")]
    UnknownPrerequisite { id: String, prerequisite: String },

    #[error("prerequisite cycle through achievement {0}")]
    PrerequisiteCycle(String),
}
