//! Client-side job state machine.
//!
//! ```text
//! Idle ──start──▶ Triggering ──started──▶ Running ──terminal tick──▶ Completed
//!                     │                      │                          │
//!                     ├─error / already_running                         │
//!                     ▼                      ▼                          │
//!                   Failed ◀──job error── Running                       │
//!                     │                                                 │
//!                     └──────────── settle hold ──▶ Idle ◀──────────────┘
//! ```
//!
//! The orchestrator is `Running` exactly while its poller holds a live
//! handle: the terminal tick stops the poller and writes the terminal state
//! under the same lock.

use crate::driver::{JobDriver, TickOutcome};
use crate::error::{JobError, JobResult};
use crate::poller::StatusPoller;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use stockwatch_core::{ProcessingState, StartStatus};
use stockwatch_telemetry::Metrics;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Message shown when the backend refuses a start because a run is active.
pub const ALREADY_RUNNING_MESSAGE: &str = "a job is already in progress";

/// Invoked once per completed run, before the run is marked settled.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_job_completed(&self, job: &'static str);
}

/// Timing of one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Status poll cadence.
    pub interval: Duration,
    /// How long `Completed`/`Failed` stays visible before returning to `Idle`.
    pub settle_hold: Duration,
}

impl JobSettings {
    pub fn analysis() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            settle_hold: Duration::from_secs(3),
        }
    }

    pub fn backtest() -> Self {
        Self {
            interval: Duration::from_millis(200),
            settle_hold: Duration::from_secs(3),
        }
    }
}

/// Snapshot of one orchestrator for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView<S> {
    pub job: &'static str,
    pub state: ProcessingState,
    pub stage: String,
    pub progress: u8,
    pub message: String,
    /// Latest raw status of the current run.
    pub last_status: Option<S>,
    /// Whether a poller handle is live.
    pub polling: bool,
    /// Set once a terminal run finished its completion work.
    pub settled: bool,
}

struct Inner<S> {
    state: ProcessingState,
    /// Bumped on every start and on shutdown; stale ticks and holds compare
    /// against it and become inert.
    generation: u64,
    stage: String,
    progress: u8,
    message: String,
    last_status: Option<S>,
    settled: bool,
    hold: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl<S> Inner<S> {
    fn new() -> Self {
        Self {
            state: ProcessingState::Idle,
            generation: 0,
            stage: String::new(),
            progress: 0,
            message: String::new(),
            last_status: None,
            settled: false,
            hold: None,
            shut_down: false,
        }
    }

    fn cancel_hold(&mut self) {
        if let Some(hold) = self.hold.take() {
            hold.abort();
        }
    }
}

struct Shared<D: JobDriver> {
    driver: Arc<D>,
    settings: JobSettings,
    poller: StatusPoller,
    inner: Mutex<Inner<D::Status>>,
    hook: Option<Arc<dyn CompletionHook>>,
}

impl<D: JobDriver> Shared<D> {
    fn transition(&self, inner: &mut Inner<D::Status>, to: ProcessingState) {
        if inner.state != to {
            debug!(job = self.driver.name(), from = %inner.state, to = %to, "Job state transition");
        }
        inner.state = to;
        Metrics::job_state_set(self.driver.name(), to.as_str());
    }

    fn view(&self, inner: &Inner<D::Status>) -> JobView<D::Status> {
        JobView {
            job: self.driver.name(),
            state: inner.state,
            stage: inner.stage.clone(),
            progress: inner.progress,
            message: inner.message.clone(),
            last_status: inner.last_status.clone(),
            polling: self.poller.is_active(),
            settled: inner.settled,
        }
    }

    fn on_tick(self: &Arc<Self>, generation: u64, status: &D::Status) {
        let mut inner = self.inner.lock();
        if inner.shut_down
            || inner.generation != generation
            || inner.state != ProcessingState::Running
        {
            return;
        }

        let line = self.driver.describe(status);
        inner.stage = line.stage;
        inner.progress = inner.progress.max(line.progress);
        inner.message = line.message;
        inner.last_status = Some(status.clone());

        match self.driver.classify(status) {
            TickOutcome::Progress => {}
            TickOutcome::Completed => {
                self.poller.stop();
                self.transition(&mut inner, ProcessingState::Completed);
                info!(job = self.driver.name(), "Job completed");
                self.spawn_settle(&mut inner, true);
            }
            TickOutcome::Failed(err) => {
                self.poller.stop();
                warn!(job = self.driver.name(), error = %err, "Job reported failure");
                inner.message = err;
                self.transition(&mut inner, ProcessingState::Failed);
                self.spawn_settle(&mut inner, false);
            }
        }
    }

    /// Run completion work, mark the run settled, then hold the terminal
    /// state before returning to `Idle`.
    ///
    /// The completion hook runs in its own task: a restart cancels the hold
    /// but never the refresh of a run that already completed.
    fn spawn_settle(self: &Arc<Self>, inner: &mut Inner<D::Status>, completed: bool) {
        inner.cancel_hold();
        let hook = if completed { self.hook.clone() } else { None };
        let Some(hook) = hook else {
            inner.settled = true;
            self.spawn_hold(inner);
            return;
        };

        let generation = inner.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let job = self.driver.name();
        tokio::spawn(async move {
            hook.on_job_completed(job).await;
            let Some(shared) = weak.upgrade() else { return };
            let mut inner = shared.inner.lock();
            if inner.shut_down || inner.generation != generation {
                return;
            }
            inner.settled = true;
            shared.spawn_hold(&mut inner);
        });
    }

    /// Return to `Idle` after the settle hold unless a newer run took over.
    fn spawn_hold(self: &Arc<Self>, inner: &mut Inner<D::Status>) {
        let generation = inner.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let hold = self.settings.settle_hold;

        inner.hold = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;

            let Some(shared) = weak.upgrade() else { return };
            let mut inner = shared.inner.lock();
            if inner.generation == generation && inner.state.is_terminal() {
                inner.hold = None;
                shared.transition(&mut inner, ProcessingState::Idle);
            }
        }));
    }
}

/// Drives one backend job class from trigger to settled result.
pub struct JobOrchestrator<D: JobDriver> {
    shared: Arc<Shared<D>>,
}

impl<D: JobDriver> JobOrchestrator<D> {
    pub fn new(driver: D, settings: JobSettings) -> Self {
        let poller = StatusPoller::new(driver.name(), settings.interval);
        Self {
            shared: Arc::new(Shared {
                driver: Arc::new(driver),
                settings,
                poller,
                inner: Mutex::new(Inner::new()),
                hook: None,
            }),
        }
    }

    /// Attach the completion hook. Only effective before the orchestrator is
    /// shared.
    pub fn with_completion_hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.hook = Some(hook);
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.shared.driver.name()
    }

    /// Trigger a run.
    ///
    /// A no-op returning the current view while a run is triggering or
    /// running. From `Completed`/`Failed` the pending hold is cancelled and a
    /// new run starts.
    pub async fn start(&self, request: D::Request) -> JobResult<JobView<D::Status>> {
        let shared = &self.shared;
        shared.driver.validate(&request)?;

        let generation = {
            let mut inner = shared.inner.lock();
            if inner.shut_down {
                return Err(JobError::ShutDown);
            }
            if inner.state.is_busy() {
                debug!(
                    job = shared.driver.name(),
                    state = %inner.state,
                    "Start ignored, run in progress"
                );
                return Ok(shared.view(&inner));
            }
            inner.cancel_hold();
            inner.generation += 1;
            inner.stage.clear();
            inner.progress = 0;
            inner.message.clear();
            inner.last_status = None;
            inner.settled = false;
            shared.transition(&mut inner, ProcessingState::Triggering);
            inner.generation
        };

        let answer = shared.driver.start(&request).await;

        let mut inner = shared.inner.lock();
        if inner.shut_down || inner.generation != generation {
            return Ok(shared.view(&inner));
        }
        match answer {
            Ok(StartStatus::Started) => {
                let driver = Arc::clone(&shared.driver);
                let classify = Arc::clone(&shared.driver);
                let weak = Arc::downgrade(shared);
                shared.poller.start(
                    move || {
                        let driver = Arc::clone(&driver);
                        async move { driver.fetch_status().await }
                    },
                    move |status| classify.classify(status).is_terminal(),
                    move |status| {
                        if let Some(shared) = weak.upgrade() {
                            shared.on_tick(generation, status);
                        }
                    },
                );
                shared.transition(&mut inner, ProcessingState::Running);
                info!(job = shared.driver.name(), "Job started, polling status");
            }
            Ok(StartStatus::AlreadyRunning) => {
                info!(job = shared.driver.name(), "Backend reports a run already in progress");
                inner.message = ALREADY_RUNNING_MESSAGE.to_string();
                shared.transition(&mut inner, ProcessingState::Failed);
                shared.spawn_settle(&mut inner, false);
            }
            Ok(StartStatus::Unknown) => {
                warn!(job = shared.driver.name(), "Unrecognized start answer");
                inner.message = "unexpected start answer from backend".to_string();
                shared.transition(&mut inner, ProcessingState::Failed);
                shared.spawn_settle(&mut inner, false);
            }
            Err(e) => {
                warn!(job = shared.driver.name(), error = %e, "Job start request failed");
                inner.message = e.to_string();
                shared.transition(&mut inner, ProcessingState::Failed);
                shared.spawn_settle(&mut inner, false);
            }
        }
        Ok(shared.view(&inner))
    }

    pub fn view(&self) -> JobView<D::Status> {
        let inner = self.shared.inner.lock();
        self.shared.view(&inner)
    }

    pub fn state(&self) -> ProcessingState {
        self.shared.inner.lock().state
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.shared.poller
    }

    /// Stop polling and cancel pending holds; later ticks are inert.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;
        inner.generation += 1;
        self.shared.poller.stop();
        inner.cancel_hold();
        if inner.state.is_busy() {
            self.shared.transition(&mut inner, ProcessingState::Idle);
        }
        debug!(job = self.shared.driver.name(), "Orchestrator shut down");
    }
}

impl<D: JobDriver> Drop for JobOrchestrator<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AnalysisJob, BacktestJob};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stockwatch_api::testing::FakeBackend;
    use stockwatch_api::ApiError;
    use stockwatch_core::{BacktestRequest, BacktestStatus, JobStatus, ANALYSIS_DONE_STAGE};

    #[derive(Default)]
    struct CountingHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionHook for CountingHook {
        async fn on_job_completed(&self, _job: &'static str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Takes a while to refresh, like a real read-model reload.
    #[derive(Default)]
    struct SlowHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionHook for SlowHook {
        async fn on_job_completed(&self, _job: &'static str) {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn running(stage: &str, progress: u8) -> JobStatus {
        JobStatus {
            is_running: true,
            current_stage: stage.to_string(),
            progress,
            ..Default::default()
        }
    }

    fn done() -> JobStatus {
        JobStatus {
            current_stage: ANALYSIS_DONE_STAGE.to_string(),
            progress: 100,
            result: Some(serde_json::json!({"analyzed": 12})),
            ..Default::default()
        }
    }

    fn analysis(
        backend: &Arc<FakeBackend>,
        hook: &Arc<CountingHook>,
    ) -> JobOrchestrator<AnalysisJob> {
        JobOrchestrator::new(AnalysisJob::new(backend.clone()), JobSettings::analysis())
            .with_completion_hook(hook.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_run_completes_and_settles() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.analysis_statuses = [
                Ok(running("抓取資料", 10)),
                Ok(running("分析中", 60)),
                Ok(done()),
            ]
            .into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Running);
        assert!(view.polling);

        tokio::time::sleep(Duration::from_millis(4100)).await;
        let view = orch.view();
        assert_eq!(view.state, ProcessingState::Completed);
        assert!(view.settled);
        assert!(!view.polling);
        assert_eq!(view.progress, 100);
        assert_eq!(backend.calls("analysis_status"), 3);
        assert_eq!(orch.poller().stop_count(), 1);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(orch.state(), ProcessingState::Idle);
        assert_eq!(backend.calls("analysis_status"), 3);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_run_with_result_completes() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.analysis_statuses = [
                Ok(running("分析中", 50)),
                Ok(JobStatus {
                    is_running: false,
                    current_stage: "done".to_string(),
                    progress: 100,
                    result: Some(serde_json::json!({"analyzed": 40})),
                    ..Default::default()
                }),
            ]
            .into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        orch.start(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let view = orch.view();
        assert_eq!(view.state, ProcessingState::Completed);
        assert!(!view.polling);
        assert_eq!(backend.calls("analysis_status"), 2);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(backend.calls("analysis_status"), 2);
        assert_eq!(orch.state(), ProcessingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_does_not_abort_completion_refresh() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| s.analysis_statuses = [Ok(done())].into());
        let hook = Arc::new(SlowHook::default());
        let orch = JobOrchestrator::new(AnalysisJob::new(backend.clone()), JobSettings::analysis())
            .with_completion_hook(hook.clone());

        orch.start(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let view = orch.view();
        assert_eq!(view.state, ProcessingState::Completed);
        assert!(!view.settled);

        backend.with_state(|s| s.analysis_statuses = [Ok(running("分析中", 5))].into());
        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Running);

        tokio::time::sleep(Duration::from_millis(6000)).await;
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
        let view = orch.view();
        assert_eq!(view.state, ProcessingState::Running);
        assert!(!view.settled);
        orch.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_running_is_soft_failure() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| s.analysis_starts = [Ok(StartStatus::AlreadyRunning)].into());
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Failed);
        assert_eq!(view.message, ALREADY_RUNNING_MESSAGE);
        assert!(!view.polling);

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(orch.state(), ProcessingState::Idle);
        assert_eq!(backend.calls("analysis_status"), 0);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_error_keeps_raw_message() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.analysis_starts = [Err(ApiError::Transport("connection refused".to_string()))].into()
        });
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Failed);
        assert_eq!(view.message, "HTTP request failed: connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_noop() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| s.analysis_statuses = [Ok(running("分析中", 20))].into());
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        orch.start(()).await.unwrap();
        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Running);
        assert_eq!(backend.calls("run_analysis"), 1);

        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(orch.state(), ProcessingState::Running);
        assert_eq!(backend.calls("analysis_status"), 3);
        assert_eq!(orch.poller().stop_count(), 0);
        orch.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_triggering_is_noop() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.start_delay = Some(Duration::from_millis(500));
            s.analysis_statuses = [Ok(running("分析中", 20))].into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = Arc::new(analysis(&backend, &hook));

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.start(()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(orch.state(), ProcessingState::Triggering);

        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Triggering);

        let view = first.await.unwrap().unwrap();
        assert_eq!(view.state, ProcessingState::Running);
        assert_eq!(backend.calls("run_analysis"), 1);
        orch.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_keeps_polling() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.analysis_statuses = [
                Ok(running("抓取資料", 10)),
                Err(ApiError::Transport("connection reset".to_string())),
                Ok(done()),
            ]
            .into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        orch.start(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(orch.state(), ProcessingState::Running);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(orch.state(), ProcessingState::Completed);
        assert_eq!(backend.calls("analysis_status"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_non_decreasing() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.analysis_statuses =
                [Ok(running("分析中", 50)), Ok(running("分析中", 30))].into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        orch.start(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(orch.view().progress, 50);
        assert_eq!(orch.view().last_status.map(|s| s.progress), Some(30));
        orch.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_error_is_verbatim_failure() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.backtest_statuses = [
                Ok(BacktestStatus {
                    is_running: true,
                    progress: 40,
                    logs: vec!["loading TSLA".to_string()],
                    ..Default::default()
                }),
                Ok(BacktestStatus {
                    is_running: false,
                    logs: vec!["loading TSLA".to_string(), "no data".to_string()],
                    error: Some("No price data for TSLA".to_string()),
                    ..Default::default()
                }),
            ]
            .into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = JobOrchestrator::new(BacktestJob::new(backend.clone()), JobSettings::backtest())
            .with_completion_hook(hook.clone());

        let request = BacktestRequest::parse("tsla", "2024-01-01", "2024-03-01").unwrap();
        orch.start(request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let view = orch.view();
        assert_eq!(view.state, ProcessingState::Failed);
        assert_eq!(view.message, "No price data for TSLA");
        assert_eq!(view.last_status.map(|s| s.logs.len()), Some(2));
        assert_eq!(orch.poller().stop_count(), 1);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_backtest_makes_no_calls() {
        let backend = Arc::new(FakeBackend::new());
        let orch = JobOrchestrator::new(BacktestJob::new(backend.clone()), JobSettings::backtest());

        let request = BacktestRequest::new(" ", Default::default(), Default::default());
        let err = orch.start(request).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(orch.state(), ProcessingState::Idle);
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_settle_hold() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| {
            s.analysis_starts = [Ok(StartStatus::AlreadyRunning)].into();
            s.analysis_statuses = [Ok(running("分析中", 20))].into();
        });
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        orch.start(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(orch.state(), ProcessingState::Failed);

        let view = orch.start(()).await.unwrap();
        assert_eq!(view.state, ProcessingState::Running);
        assert!(view.message.is_empty());

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(orch.state(), ProcessingState::Running);
        orch.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling() {
        let backend = Arc::new(FakeBackend::new());
        backend.with_state(|s| s.analysis_statuses = [Ok(running("分析中", 20))].into());
        let hook = Arc::new(CountingHook::default());
        let orch = analysis(&backend, &hook);

        orch.start(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orch.shutdown();
        orch.shutdown();

        let calls = backend.calls("analysis_status");
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(backend.calls("analysis_status"), calls);
        assert!(!orch.view().polling);
        assert_eq!(orch.poller().stop_count(), 1);
        assert!(matches!(orch.start(()).await, Err(JobError::ShutDown)));
    }
}
