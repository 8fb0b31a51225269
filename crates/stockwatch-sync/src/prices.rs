//! Two-tier price lookup.
//!
//! One batch request covers every symbol. If it fails for any reason the
//! fetcher degrades to one request per symbol, all in flight at once, so a
//! single bad symbol cannot blank out the rest. Every requested symbol ends
//! up with a settled [`PriceEntry`].

use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use stockwatch_api::{ApiError, ApiResult, BackendApi};
use stockwatch_core::{Price, PriceEntry};
use stockwatch_telemetry::Metrics;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Timeouts of the two lookup tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceFetchConfig {
    /// Bound on the single batch request.
    pub batch_timeout: Duration,
    /// Bound on each per-symbol request.
    pub item_timeout: Duration,
    /// Bound on the whole per-symbol fan-out. Longer than `batch_timeout`.
    pub fallback_timeout: Duration,
}

impl Default for PriceFetchConfig {
    fn default() -> Self {
        Self {
            batch_timeout: Duration::from_secs(8),
            item_timeout: Duration::from_secs(10),
            fallback_timeout: Duration::from_secs(12),
        }
    }
}

/// Resolves prices for a set of symbols.
pub struct BatchFetcher {
    backend: Arc<dyn BackendApi>,
    config: PriceFetchConfig,
}

impl BatchFetcher {
    pub fn new(backend: Arc<dyn BackendApi>, config: PriceFetchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PriceFetchConfig {
        &self.config
    }

    /// Loading entries for `symbols`, shown while a fetch is in flight.
    pub fn pending(symbols: &[String]) -> BTreeMap<String, PriceEntry> {
        normalize(symbols)
            .into_iter()
            .map(|s| (s.clone(), PriceEntry::pending(s)))
            .collect()
    }

    /// Resolve every symbol. Never fails: unresolvable symbols come back as
    /// unavailable entries.
    pub async fn fetch(&self, symbols: &[String]) -> BTreeMap<String, PriceEntry> {
        let symbols = normalize(symbols);
        if symbols.is_empty() {
            return BTreeMap::new();
        }

        match self.fetch_batch(&symbols).await {
            Ok(mut prices) => {
                let entries: BTreeMap<String, PriceEntry> = symbols
                    .iter()
                    .map(|s| {
                        let price = prices.remove(s).flatten();
                        (s.clone(), PriceEntry::from_lookup(s, price))
                    })
                    .collect();
                let missing = entries.values().filter(|e| e.price.is_none()).count();
                if missing > 0 {
                    Metrics::price_unavailable("batch", missing);
                }
                debug!(symbols = symbols.len(), missing, "Batch prices resolved");
                entries
            }
            Err(e) => {
                let reason = match &e {
                    ApiError::Timeout(_) => "timeout",
                    e if e.is_transport() => "transport",
                    _ => "error",
                };
                Metrics::price_fallback(reason);
                warn!(
                    error = %e,
                    symbols = symbols.len(),
                    "Batch price request failed, fetching individually"
                );
                self.fetch_each(&symbols).await
            }
        }
    }

    async fn fetch_batch(&self, symbols: &[String]) -> ApiResult<HashMap<String, Option<Price>>> {
        let limit = self.config.batch_timeout;
        timeout(limit, self.backend.fetch_prices(symbols))
            .await
            .map_err(|_| ApiError::Timeout(limit))?
    }

    async fn fetch_each(&self, symbols: &[String]) -> BTreeMap<String, PriceEntry> {
        let deadline = Instant::now() + self.config.fallback_timeout;
        let item_timeout = self.config.item_timeout;

        let lookups = symbols.iter().map(|symbol| async move {
            let item_deadline = deadline.min(Instant::now() + item_timeout);
            let entry = match timeout_at(item_deadline, self.backend.fetch_price(symbol)).await {
                Ok(Ok(price)) => PriceEntry::from_lookup(symbol, price),
                Ok(Err(e)) => {
                    debug!(symbol = %symbol, error = %e, "Single price lookup failed");
                    PriceEntry::unavailable(symbol)
                }
                Err(_) => {
                    debug!(symbol = %symbol, "Single price lookup timed out");
                    PriceEntry::unavailable(symbol)
                }
            };
            (symbol.clone(), entry)
        });

        let entries: BTreeMap<String, PriceEntry> = join_all(lookups).await.into_iter().collect();
        let missing = entries.values().filter(|e| e.price.is_none()).count();
        if missing > 0 {
            Metrics::price_unavailable("fallback", missing);
        }
        info!(
            symbols = symbols.len(),
            resolved = symbols.len() - missing,
            "Per-symbol price fallback finished"
        );
        entries
    }
}

/// Trim, drop blanks and collapse duplicates, keeping first-seen order.
fn normalize(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol.trim();
        if !symbol.is_empty() && !out.iter().any(|s| s == symbol) {
            out.push(symbol.to_string());
        }
    }
    out
}
