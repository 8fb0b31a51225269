//! Job drivers: how to start one job class and read its status.

use crate::error::JobResult;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use stockwatch_api::{ApiResult, BackendApi};
use stockwatch_core::{BacktestRequest, BacktestStatus, JobStatus, StartStatus};

/// What one status tick means for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still running.
    Progress,
    Completed,
    /// The job reported an error (verbatim).
    Failed(String),
}

impl TickOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress)
    }
}

/// Presentation fields extracted from one status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    pub stage: String,
    pub progress: u8,
    pub message: String,
}

/// One backend job class.
#[async_trait]
pub trait JobDriver: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Status: Clone + Debug + Send + Sync + 'static;

    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Reject a request before any network call.
    fn validate(&self, _request: &Self::Request) -> JobResult<()> {
        Ok(())
    }

    async fn start(&self, request: &Self::Request) -> ApiResult<StartStatus>;

    async fn fetch_status(&self) -> ApiResult<Self::Status>;

    fn classify(&self, status: &Self::Status) -> TickOutcome;

    fn describe(&self, status: &Self::Status) -> StatusLine;
}

/// The daily analysis run.
pub struct AnalysisJob {
    backend: Arc<dyn BackendApi>,
}

impl AnalysisJob {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl JobDriver for AnalysisJob {
    type Request = ();
    type Status = JobStatus;

    fn name(&self) -> &'static str {
        "analysis"
    }

    async fn start(&self, _request: &()) -> ApiResult<StartStatus> {
        self.backend.run_analysis().await
    }

    async fn fetch_status(&self) -> ApiResult<JobStatus> {
        self.backend.analysis_status().await
    }

    fn classify(&self, status: &JobStatus) -> TickOutcome {
        if let Some(err) = &status.error {
            TickOutcome::Failed(err.clone())
        } else if status.is_finished() {
            TickOutcome::Completed
        } else {
            TickOutcome::Progress
        }
    }

    fn describe(&self, status: &JobStatus) -> StatusLine {
        StatusLine {
            stage: status.current_stage.clone(),
            progress: status.progress,
            message: status.message.clone(),
        }
    }
}

/// A single-symbol backtest.
pub struct BacktestJob {
    backend: Arc<dyn BackendApi>,
}

impl BacktestJob {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl JobDriver for BacktestJob {
    type Request = BacktestRequest;
    type Status = BacktestStatus;

    fn name(&self) -> &'static str {
        "backtest"
    }

    fn validate(&self, request: &BacktestRequest) -> JobResult<()> {
        request.validate()?;
        Ok(())
    }

    async fn start(&self, request: &BacktestRequest) -> ApiResult<StartStatus> {
        self.backend.run_backtest(request).await
    }

    async fn fetch_status(&self) -> ApiResult<BacktestStatus> {
        self.backend.backtest_status().await
    }

    fn classify(&self, status: &BacktestStatus) -> TickOutcome {
        match (&status.error, status.is_terminal()) {
            (Some(err), true) => TickOutcome::Failed(err.clone()),
            (None, true) => TickOutcome::Completed,
            (_, false) => TickOutcome::Progress,
        }
    }

    fn describe(&self, status: &BacktestStatus) -> StatusLine {
        StatusLine {
            stage: status.current_step.clone(),
            progress: status.progress,
            message: status.message.clone(),
        }
    }
}
