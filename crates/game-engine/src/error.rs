//! Engine error types.

use thiserror::Error;

use ai_bridge::LlmError;
use game_database::DatabaseError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("constraint violated: {0}")]
    ConstraintViolated(String),

    /// Boot-time failures: unresolvable starting space, unsaveable seed.
    #[error("initialization failed: {0}")]
    Initialization(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
