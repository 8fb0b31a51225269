//! In-memory backend for tests.
//!
//! Scripted status sequences, injectable failures and delays, and per-method
//! call counters. Delays use `tokio::time::sleep`, so tests running with a
//! paused clock stay deterministic.

use crate::backend::BackendApi;
use crate::error::{ApiError, ApiResult};
use crate::wire::ExportPayload;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use stockwatch_core::{
    AnalysisSnapshot, BacktestRequest, BacktestStatus, BulkDataset, BulkKind, JobStatus, Price,
    StartStatus, Watchlist,
};

/// Mutable state behind [`FakeBackend`].
#[derive(Default)]
pub struct FakeState {
    pub analysis: Option<AnalysisSnapshot>,
    pub collections: HashMap<BulkKind, BulkDataset>,
    pub watchlist: Option<Watchlist>,
    pub fear_greed: Option<serde_json::Value>,

    /// Answers to `run_analysis`, consumed in order; `Started` when empty.
    pub analysis_starts: VecDeque<ApiResult<StartStatus>>,
    /// Analysis status sequence; the last `Ok` repeats once exhausted.
    pub analysis_statuses: VecDeque<ApiResult<JobStatus>>,
    pub backtest_starts: VecDeque<ApiResult<StartStatus>>,
    pub backtest_statuses: VecDeque<ApiResult<BacktestStatus>>,
    /// Delay applied to every start request.
    pub start_delay: Option<Duration>,

    pub prices: HashMap<String, Option<Price>>,
    /// When set, the batch price request fails with this transport error.
    pub batch_failure: Option<String>,
    pub batch_delay: Option<Duration>,
    /// Symbols whose single-price request fails.
    pub item_failures: HashSet<String>,
    pub item_delays: HashMap<String, Duration>,

    /// Read endpoints (`"analysis"`, `"monitored-stocks"`, ...) that fail.
    pub read_failures: HashSet<String>,
    pub export_disposition: Option<String>,
    /// When set, imports are rejected with this server error text.
    pub import_error: Option<String>,

    last_analysis_status: Option<JobStatus>,
    last_backtest_status: Option<BacktestStatus>,
}

/// In-memory [`BackendApi`] implementation.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the scripted state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    /// Total number of backend calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn collection(&self, kind: BulkKind) -> BulkDataset {
        self.state
            .lock()
            .collections
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_insert(0) += 1;
    }

    fn read_guard(&self, endpoint: &str) -> ApiResult<()> {
        if self.state.lock().read_failures.contains(endpoint) {
            return Err(ApiError::Transport(format!("{endpoint}: connection refused")));
        }
        Ok(())
    }

    async fn start_delay(&self) {
        let delay = self.state.lock().start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn fetch_analysis(&self) -> ApiResult<AnalysisSnapshot> {
        self.record("fetch_analysis");
        self.read_guard("analysis")?;
        Ok(self.state.lock().analysis.clone().unwrap_or_default())
    }

    async fn fetch_collection(&self, kind: BulkKind) -> ApiResult<BulkDataset> {
        self.record("fetch_collection");
        self.read_guard(kind.slug())?;
        Ok(self.collection(kind))
    }

    async fn fetch_watchlist(&self) -> ApiResult<Watchlist> {
        self.record("fetch_watchlist");
        self.read_guard("watchlist")?;
        Ok(self.state.lock().watchlist.clone().unwrap_or_default())
    }

    async fn fetch_fear_greed(&self) -> ApiResult<serde_json::Value> {
        self.record("fetch_fear_greed");
        self.read_guard("fear-greed-index")?;
        Ok(self
            .state
            .lock()
            .fear_greed
            .clone()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn run_analysis(&self) -> ApiResult<StartStatus> {
        self.record("run_analysis");
        self.start_delay().await;
        self.state
            .lock()
            .analysis_starts
            .pop_front()
            .unwrap_or(Ok(StartStatus::Started))
    }

    async fn analysis_status(&self) -> ApiResult<JobStatus> {
        self.record("analysis_status");
        let mut state = self.state.lock();
        match state.analysis_statuses.pop_front() {
            Some(Ok(status)) => {
                state.last_analysis_status = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => state
                .last_analysis_status
                .clone()
                .ok_or_else(|| ApiError::Transport("no analysis status scripted".to_string())),
        }
    }

    async fn run_backtest(&self, _request: &BacktestRequest) -> ApiResult<StartStatus> {
        self.record("run_backtest");
        self.start_delay().await;
        self.state
            .lock()
            .backtest_starts
            .pop_front()
            .unwrap_or(Ok(StartStatus::Started))
    }

    async fn backtest_status(&self) -> ApiResult<BacktestStatus> {
        self.record("backtest_status");
        let mut state = self.state.lock();
        match state.backtest_statuses.pop_front() {
            Some(Ok(status)) => {
                state.last_backtest_status = Some(status.clone());
                Ok(status)
            }
            Some(Err(e)) => Err(e),
            None => state
                .last_backtest_status
                .clone()
                .ok_or_else(|| ApiError::Transport("no backtest status scripted".to_string())),
        }
    }

    async fn fetch_prices(
        &self,
        symbols: &[String],
    ) -> ApiResult<HashMap<String, Option<Price>>> {
        self.record("fetch_prices");
        let (delay, failure) = {
            let state = self.state.lock();
            (state.batch_delay, state.batch_failure.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = failure {
            return Err(ApiError::Transport(msg));
        }
        let state = self.state.lock();
        Ok(symbols
            .iter()
            .filter_map(|s| state.prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }

    async fn fetch_price(&self, symbol: &str) -> ApiResult<Option<Price>> {
        self.record("fetch_price");
        let delay = self.state.lock().item_delays.get(symbol).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        if state.item_failures.contains(symbol) {
            return Err(ApiError::Status {
                status: 500,
                body: format!("price lookup failed for {symbol}"),
            });
        }
        Ok(state.prices.get(symbol).copied().flatten())
    }

    async fn export_collection(&self, kind: BulkKind) -> ApiResult<ExportPayload> {
        self.record("export_collection");
        self.read_guard(&format!("export-{}", kind.slug()))?;
        let dataset = self.collection(kind);
        let bytes = serde_json::to_vec_pretty(&dataset)?;
        Ok(ExportPayload {
            bytes,
            content_disposition: self.state.lock().export_disposition.clone(),
        })
    }

    async fn import_collection(
        &self,
        kind: BulkKind,
        _filename: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<u64> {
        self.record("import_collection");
        if let Some(msg) = self.state.lock().import_error.clone() {
            return Err(ApiError::Server(msg));
        }
        let dataset = BulkDataset::from_slice(&bytes).map_err(|e| ApiError::Server(e.to_string()))?;
        let count = dataset.len() as u64;
        self.state.lock().collections.insert(kind, dataset);
        Ok(count)
    }
}
