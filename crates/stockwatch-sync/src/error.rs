//! Read-model and bulk transfer error types.

use stockwatch_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Rejected locally, nothing was sent.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Error text reported by the backend, verbatim.
    #[error("{0}")]
    Server(String),

    #[error(transparent)]
    Api(ApiError),

    /// Every slice of a full refresh failed.
    #[error("Refresh failed: {0}")]
    RefreshFailed(String),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err.server_message() {
            Some(msg) => Self::Server(msg.to_string()),
            None => Self::Api(err),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
