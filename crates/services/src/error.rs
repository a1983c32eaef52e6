use thiserror::Error;

use crate::dao::DaoError;

/// Outcome classes surfaced to callers of the real-time core.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store still contended after {attempts} attempts: {message}")]
    TransientStore { attempts: u32, message: String },
    #[error("Store error: {0}")]
    Store(DaoError),
    /// Failure after the message was stored. Logged, never returned to a sender.
    #[error("Background task error: {0}")]
    Background(String),
}

impl From<DaoError> for ChatError {
    fn from(err: DaoError) -> Self {
        match err {
            DaoError::NotFound => ChatError::NotFound("Entity not found".to_string()),
            DaoError::DuplicateKey(msg) => ChatError::Conflict(msg),
            DaoError::Forbidden(msg) => ChatError::Permission(msg),
            DaoError::Validation(msg) => ChatError::Validation(msg),
            other => ChatError::Store(other),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
