//! Error types for the persistence layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("constraint violated: {0}")]
    ConstraintViolated(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
