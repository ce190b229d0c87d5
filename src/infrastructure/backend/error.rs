use crate::shared::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request to {path} failed with status {status}: {body}")]
    Http {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(msg) => AppError::Network(msg),
            RemoteError::InvalidIdentifier(msg) => AppError::InvalidInput(msg),
            RemoteError::Http { status: 404, .. } => AppError::NotFound(err.to_string()),
            other => AppError::Remote(other.to_string()),
        }
    }
}
