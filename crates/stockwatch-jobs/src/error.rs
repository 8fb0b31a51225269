//! Job orchestration error types.

use stockwatch_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// The request was rejected before any network call.
    #[error("Invalid job request: {0}")]
    Validation(#[from] CoreError),

    #[error("Orchestrator has been shut down")]
    ShutDown,
}

pub type JobResult<T> = Result<T, JobError>;
