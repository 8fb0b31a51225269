//! The backend seam.
//!
//! Every network interaction of the client goes through [`BackendApi`], so
//! orchestration and reconciliation logic can be exercised against an
//! in-memory backend.

use crate::error::ApiResult;
use crate::wire::ExportPayload;
use async_trait::async_trait;
use std::collections::HashMap;
use stockwatch_core::{
    AnalysisSnapshot, BacktestRequest, BacktestStatus, BulkDataset, BulkKind, JobStatus, Price,
    StartStatus, Watchlist,
};

/// Backend HTTP surface consumed by the client.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `GET /api/analysis`
    async fn fetch_analysis(&self) -> ApiResult<AnalysisSnapshot>;

    /// `GET /api/monitored-stocks` or `GET /api/trade-history`
    async fn fetch_collection(&self, kind: BulkKind) -> ApiResult<BulkDataset>;

    /// `GET /api/watchlist`
    async fn fetch_watchlist(&self) -> ApiResult<Watchlist>;

    /// `GET /api/fear-greed-index`
    async fn fetch_fear_greed(&self) -> ApiResult<serde_json::Value>;

    /// `POST /api/run-now`
    async fn run_analysis(&self) -> ApiResult<StartStatus>;

    /// `GET /api/analysis-status`
    async fn analysis_status(&self) -> ApiResult<JobStatus>;

    /// `POST /api/run-backtest`
    async fn run_backtest(&self, request: &BacktestRequest) -> ApiResult<StartStatus>;

    /// `GET /api/backtest-status`
    async fn backtest_status(&self) -> ApiResult<BacktestStatus>;

    /// `GET /api/stock-prices` for all `symbols` in one request.
    async fn fetch_prices(&self, symbols: &[String])
        -> ApiResult<HashMap<String, Option<Price>>>;

    /// `GET /api/stock-price/:symbol`
    async fn fetch_price(&self, symbol: &str) -> ApiResult<Option<Price>>;

    /// `GET /api/export-*`
    async fn export_collection(&self, kind: BulkKind) -> ApiResult<ExportPayload>;

    /// `POST /api/import-*` (multipart); returns the imported record count.
    async fn import_collection(
        &self,
        kind: BulkKind,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<u64>;
}
