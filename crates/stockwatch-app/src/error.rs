//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(#[from] stockwatch_core::CoreError),

    #[error("Backend error: {0}")]
    Api(#[from] stockwatch_api::ApiError),

    #[error("Job error: {0}")]
    Job(#[from] stockwatch_jobs::JobError),

    #[error(transparent)]
    Sync(#[from] stockwatch_sync::SyncError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] stockwatch_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
