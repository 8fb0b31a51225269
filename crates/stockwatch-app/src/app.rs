//! Main application wiring.
//!
//! Builds the backend client, the read-model coordinator, the bulk
//! reconciler and one orchestrator per job class. Both orchestrators refresh
//! the read models when a run completes.

use crate::config::AppConfig;
use crate::error::AppResult;
use std::sync::Arc;
use std::time::Duration;
use stockwatch_api::{BackendApi, HttpBackend};
use stockwatch_core::{BacktestRequest, BacktestStatus, JobStatus, ProcessingState};
use stockwatch_jobs::{
    AnalysisJob, BacktestJob, CompletionHook, JobDriver, JobOrchestrator, JobView,
};
use stockwatch_sync::{BulkReconciler, DataSyncCoordinator, RefreshReport};
use tracing::info;

/// Main application.
pub struct Application {
    config: AppConfig,
    coordinator: Arc<DataSyncCoordinator>,
    reconciler: BulkReconciler,
    analysis: JobOrchestrator<AnalysisJob>,
    backtest: JobOrchestrator<BacktestJob>,
}

impl Application {
    /// Create the application against the configured HTTP backend.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let backend = HttpBackend::new(&config.backend.base_url, config.request_timeout())?;
        info!(base_url = %backend.base_url(), "Backend client created");
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    pub fn with_backend(config: AppConfig, backend: Arc<dyn BackendApi>) -> Self {
        let coordinator = Arc::new(DataSyncCoordinator::new(
            backend.clone(),
            (&config.prices).into(),
        ));
        let hook: Arc<dyn CompletionHook> = coordinator.clone();

        let analysis =
            JobOrchestrator::new(AnalysisJob::new(backend.clone()), config.polling.analysis())
                .with_completion_hook(hook.clone());
        let backtest = JobOrchestrator::new(BacktestJob::new(backend), config.polling.backtest())
            .with_completion_hook(hook);

        Self {
            reconciler: BulkReconciler::new(coordinator.clone()),
            coordinator,
            analysis,
            backtest,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<DataSyncCoordinator> {
        &self.coordinator
    }

    pub fn reconciler(&self) -> &BulkReconciler {
        &self.reconciler
    }

    pub fn analysis(&self) -> &JobOrchestrator<AnalysisJob> {
        &self.analysis
    }

    pub fn backtest(&self) -> &JobOrchestrator<BacktestJob> {
        &self.backtest
    }

    pub async fn refresh(&self) -> AppResult<RefreshReport> {
        Ok(self.coordinator.refresh_all().await?)
    }

    /// Trigger the analysis and wait until the run settles.
    pub async fn run_analysis(
        &self,
        on_update: impl FnMut(&JobView<JobStatus>),
    ) -> AppResult<JobView<JobStatus>> {
        self.analysis.start(()).await?;
        Ok(watch(&self.analysis, self.config.polling.analysis().interval, on_update).await)
    }

    /// Trigger a backtest and wait until the run settles.
    pub async fn run_backtest(
        &self,
        request: BacktestRequest,
        on_update: impl FnMut(&JobView<BacktestStatus>),
    ) -> AppResult<JobView<BacktestStatus>> {
        self.backtest.start(request).await?;
        Ok(watch(&self.backtest, self.config.polling.backtest().interval, on_update).await)
    }

    /// Stop every live poller and pending hold.
    pub fn shutdown(&self) {
        self.analysis.shutdown();
        self.backtest.shutdown();
        info!("Application shut down");
    }
}

/// Report views every `every` until the run has settled.
///
/// Returns the first settled terminal view, or the current view once the
/// orchestrator is idle again.
pub async fn watch<D: JobDriver>(
    orchestrator: &JobOrchestrator<D>,
    every: Duration,
    mut on_update: impl FnMut(&JobView<D::Status>),
) -> JobView<D::Status> {
    loop {
        let view = orchestrator.view();
        on_update(&view);
        if view.state == ProcessingState::Idle || (view.state.is_terminal() && view.settled) {
            return view;
        }
        tokio::time::sleep(every).await;
    }
}
