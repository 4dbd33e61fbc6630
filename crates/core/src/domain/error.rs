// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Invalid priority: {0} (expected low, normal or high)")]
    InvalidPriority(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
