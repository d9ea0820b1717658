use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

/// Coarse classification used for logging and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Configuration,
    Internal,
}

#[derive(Error, Debug)]
pub enum CallSessionError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Call session not found: {session_id}")]
    SessionNotFound { session_id: Uuid },

    #[error("Call channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("Media relay not configured: {missing} is not set")]
    NotConfigured { missing: &'static str },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CallSessionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CallSessionError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CallSessionError::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CallSessionError::InvalidInput { .. } => ErrorKind::InvalidInput,
            CallSessionError::SessionNotFound { .. } | CallSessionError::ChannelNotFound { .. } => {
                ErrorKind::NotFound
            }
            CallSessionError::NotConfigured { .. } => ErrorKind::Configuration,
            CallSessionError::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<CallSessionError> for AppError {
    fn from(err: CallSessionError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::InvalidInput => AppError::BadRequest(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Configuration => AppError::Configuration(message),
            ErrorKind::Internal => AppError::Internal(message),
        }
    }
}
