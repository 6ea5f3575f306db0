//! Runtime errors raised while evaluating a chunk.

use thiserror::Error;

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that halt evaluation of the current chunk.
///
/// Non-zero exit codes are not errors; they surface as `Status` values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("variable ${0} not found")]
    UndefinedName(String),
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: String, len: usize },
    #[error("key {0} not found")]
    KeyNotFound(String),
    #[error("cannot index a {0}")]
    NotIndexable(&'static str),
    #[error("${0} is read-only")]
    ReadOnly(String),
    #[error("arity mismatch: expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("{0} is not callable")]
    NotCallable(String),
    #[error("{0} is not a number")]
    NotANumber(String),
    #[error("{command}: {message}")]
    BadArgument { command: String, message: String },
    #[error("io error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn bad_argument(command: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::BadArgument {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EvalError {
    fn from(err: std::io::Error) -> Self {
        EvalError::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EvalError {
    fn from(err: tokio::task::JoinError) -> Self {
        EvalError::Internal(format!("stage task failed: {}", err))
    }
}
