//! Backend API error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Failed to parse response: {0}")]
    Decode(String),

    /// Error text reported by the backend itself (`{"error": ...}`).
    #[error("{0}")]
    Server(String),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// The backend's own error text, when the failure carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server(msg) => Some(msg.as_str()),
            _ => None,
        }
    }

    /// Whether the failure happened before a response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
