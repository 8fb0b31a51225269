//! Read-model ownership and refresh.
//!
//! All read models live behind one lock and are only replaced slice by
//! slice by a refresh. A refresh fetches every slice concurrently and
//! applies the successful ones in a single write; a failed slice keeps its
//! previous value.

use crate::error::{SyncError, SyncResult};
use crate::prices::{BatchFetcher, PriceFetchConfig};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use stockwatch_api::{ApiResult, BackendApi};
use stockwatch_core::{AnalysisSnapshot, BulkDataset, BulkKind, PriceEntry, Watchlist};
use stockwatch_jobs::CompletionHook;
use stockwatch_telemetry::Metrics;
use tracing::{debug, info, warn};

/// Everything the presentation layer renders from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadModels {
    pub analysis: Option<AnalysisSnapshot>,
    pub monitored: Option<BulkDataset>,
    pub trades: Option<BulkDataset>,
    pub prices: BTreeMap<String, PriceEntry>,
    pub watchlist: Option<Watchlist>,
    pub fear_greed: Option<Value>,
    /// Display timestamp of the analysis snapshot.
    pub last_update: Option<String>,
    /// When the last successful refresh was applied.
    pub refreshed_at: Option<DateTime<Local>>,
}

impl ReadModels {
    pub fn collection(&self, kind: BulkKind) -> Option<&BulkDataset> {
        match kind {
            BulkKind::MonitoredStocks => self.monitored.as_ref(),
            BulkKind::TradeHistory => self.trades.as_ref(),
        }
    }

    /// Symbols to price: the monitored list, else the watchlist.
    pub fn price_symbols(&self) -> Vec<String> {
        match (&self.monitored, &self.watchlist) {
            (Some(monitored), _) => monitored.symbols(),
            (None, Some(watchlist)) => watchlist.stocks.clone(),
            (None, None) => Vec::new(),
        }
    }
}

/// Outcome of one full refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: Vec<&'static str>,
    /// Slices that kept their previous value, with the error.
    pub failed: Vec<(&'static str, String)>,
    /// Number of symbols priced.
    pub priced: usize,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record<T>(&mut self, slice: &'static str, result: ApiResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.refreshed.push(slice);
                Some(value)
            }
            Err(e) => {
                warn!(slice, error = %e, "Read-model slice refresh failed, keeping previous value");
                self.failed.push((slice, e.to_string()));
                None
            }
        }
    }
}

/// Owns the read models and keeps them in sync with the backend.
pub struct DataSyncCoordinator {
    backend: Arc<dyn BackendApi>,
    prices: BatchFetcher,
    models: RwLock<ReadModels>,
}

impl DataSyncCoordinator {
    pub fn new(backend: Arc<dyn BackendApi>, price_config: PriceFetchConfig) -> Self {
        Self {
            prices: BatchFetcher::new(backend.clone(), price_config),
            backend,
            models: RwLock::new(ReadModels::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.backend
    }

    /// Clone of the current read models.
    pub fn snapshot(&self) -> ReadModels {
        self.models.read().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadModels) -> R) -> R {
        f(&self.models.read())
    }

    /// Refetch every slice and apply the successful ones in one write.
    pub async fn refresh_all(&self) -> SyncResult<RefreshReport> {
        let (analysis, monitored, trades, watchlist, fear_greed) = tokio::join!(
            self.backend.fetch_analysis(),
            self.backend.fetch_collection(BulkKind::MonitoredStocks),
            self.backend.fetch_collection(BulkKind::TradeHistory),
            self.backend.fetch_watchlist(),
            self.backend.fetch_fear_greed(),
        );

        let mut report = RefreshReport::default();
        let analysis = report.record("analysis", analysis);
        let monitored = report.record("monitored-stocks", monitored);
        let trades = report.record("trade-history", trades);
        let watchlist = report.record("watchlist", watchlist);
        let fear_greed = report.record("fear-greed-index", fear_greed);

        if report.refreshed.is_empty() {
            Metrics::refresh("failed");
            let reasons: Vec<String> = report
                .failed
                .iter()
                .map(|(slice, e)| format!("{slice}: {e}"))
                .collect();
            return Err(SyncError::RefreshFailed(reasons.join("; ")));
        }

        let symbols = {
            let models = self.models.read();
            match (&monitored, &watchlist) {
                (Some(m), _) => m.symbols(),
                (None, Some(w)) => w.stocks.clone(),
                (None, None) => models.price_symbols(),
            }
        };
        let prices = if symbols.is_empty() {
            BTreeMap::new()
        } else {
            self.prices.fetch(&symbols).await
        };
        report.priced = prices.len();

        let now = Local::now();
        {
            let mut models = self.models.write();
            if let Some(analysis) = analysis {
                if let Some(ts) = analysis.display_timestamp(now) {
                    models.last_update = Some(ts);
                }
                models.analysis = Some(analysis);
            }
            if let Some(monitored) = monitored {
                models.monitored = Some(monitored);
            }
            if let Some(trades) = trades {
                models.trades = Some(trades);
            }
            if let Some(watchlist) = watchlist {
                models.watchlist = Some(watchlist);
            }
            if let Some(fear_greed) = fear_greed {
                models.fear_greed = Some(fear_greed);
            }
            models.prices = prices;
            models.refreshed_at = Some(now);
        }

        Metrics::refresh(if report.is_complete() { "ok" } else { "partial" });
        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            priced = report.priced,
            "Read models refreshed"
        );
        Ok(report)
    }

    /// Re-price the current symbols without touching other slices.
    pub async fn refresh_prices(&self) -> BTreeMap<String, PriceEntry> {
        let symbols = self.models.read().price_symbols();
        let prices = self.prices.fetch(&symbols).await;
        self.models.write().prices = prices.clone();
        debug!(symbols = prices.len(), "Prices refreshed");
        prices
    }

    /// Current collection, loading it from the backend when no refresh has
    /// populated it yet.
    pub async fn collection(&self, kind: BulkKind) -> SyncResult<BulkDataset> {
        if let Some(dataset) = self.read(|m| m.collection(kind).cloned()) {
            return Ok(dataset);
        }
        Ok(self.backend.fetch_collection(kind).await?)
    }
}

#[async_trait]
impl CompletionHook for DataSyncCoordinator {
    async fn on_job_completed(&self, job: &'static str) {
        match self.refresh_all().await {
            Ok(report) => debug!(
                job,
                refreshed = report.refreshed.len(),
                "Refreshed after job completion"
            ),
            Err(e) => warn!(job, error = %e, "Refresh after job completion failed"),
        }
    }
}
