//! Error types for the LLM bridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("reply unparsable: {0}")]
    Parse(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("request cancelled")]
    Cancelled,

    #[error("no API key configured")]
    MissingApiKey,
}

pub type LlmResult<T> = Result<T, LlmError>;
